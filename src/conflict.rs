//! Conflict resolution
//!
//! When a path changed on both sides of a bidirectional sync the planner
//! emits a `Conflict` action; this module decides what to do with it.
//! Resolution is a pure function of the two manifest entries and the
//! configured policy, except for `AskUser`, which consults a caller
//! supplied callback and downgrades to skipping when there is none.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::manifest::ManifestEntry;
use crate::modes::ConflictPolicy;
use crate::relpath::RelPath;

/// What to do with a conflicting pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// The local version overwrites the remote one
	UseLocal,

	/// The remote version overwrites the local one
	UseRemote,

	/// Keep the local version at the original path and save the remote
	/// version under the stamped name
	KeepBoth { rename_to: RelPath },

	/// Leave both sides untouched
	Skip,
}

/// Callback consulted for `ConflictPolicy::AskUser`.
///
/// Returning None means the user declined to choose; the conflict is
/// skipped.
pub type AskUserFn = dyn Fn(&ManifestEntry, &ManifestEntry) -> Option<Resolution> + Send + Sync;

/// Applies a conflict policy to conflicting entry pairs
#[derive(Clone)]
pub struct ConflictResolver {
	policy: ConflictPolicy,
	ask: Option<Arc<AskUserFn>>,
}

impl ConflictResolver {
	pub fn new(policy: ConflictPolicy) -> Self {
		ConflictResolver { policy, ask: None }
	}

	/// Attach the callback used by `AskUser`.
	pub fn with_callback<F>(policy: ConflictPolicy, ask: F) -> Self
	where
		F: Fn(&ManifestEntry, &ManifestEntry) -> Option<Resolution> + Send + Sync + 'static,
	{
		ConflictResolver { policy, ask: Some(Arc::new(ask)) }
	}

	pub fn policy(&self) -> ConflictPolicy {
		self.policy
	}

	/// Resolve a conflicting pair.
	pub fn resolve(&self, local: &ManifestEntry, remote: &ManifestEntry) -> Resolution {
		match self.policy {
			ConflictPolicy::LocalWins => Resolution::UseLocal,
			ConflictPolicy::RemoteWins => Resolution::UseRemote,
			ConflictPolicy::NewerWins => {
				// Strictly newer remote wins; ties keep the local version
				if remote.modified_ms > local.modified_ms {
					Resolution::UseRemote
				} else {
					Resolution::UseLocal
				}
			}
			ConflictPolicy::KeepBoth => Resolution::KeepBoth {
				rename_to: conflict_rename(&local.relative_path, Utc::now()),
			},
			ConflictPolicy::Skip => {
				info!(path = %local.relative_path, "conflict skipped by policy");
				Resolution::Skip
			}
			ConflictPolicy::AskUser => match &self.ask {
				Some(ask) => ask(local, remote).unwrap_or(Resolution::Skip),
				None => {
					info!(
						path = %local.relative_path,
						"no conflict callback registered, skipping"
					);
					Resolution::Skip
				}
			},
		}
	}
}

/// The stamped name a kept remote copy is saved under:
/// `{stem}_conflict_{yyyymmddHHMMSS}{ext}` in the same directory.
pub fn conflict_rename(path: &RelPath, at: DateTime<Utc>) -> RelPath {
	let stamp = at.format("%Y%m%d%H%M%S");
	let renamed = format!(
		"{}_conflict_{}{}",
		path.stem(),
		stamp,
		path.extension().unwrap_or_default()
	);
	match path.parent() {
		Some(parent) => parent.join(&renamed).expect("renamed segment is valid"),
		None => RelPath::new(&renamed).expect("renamed segment is valid"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn rel(s: &str) -> RelPath {
		RelPath::new(s).unwrap()
	}

	fn entry(path: &str, mtime: i64) -> ManifestEntry {
		let path = rel(path);
		ManifestEntry {
			name: path.name().to_string(),
			relative_path: path,
			size: 10,
			modified_ms: mtime,
			checksum: None,
			remote_id: None,
		}
	}

	#[test]
	fn test_local_and_remote_wins() {
		let local = entry("a.txt", 100);
		let remote = entry("a.txt", 200);

		assert_eq!(
			ConflictResolver::new(ConflictPolicy::LocalWins).resolve(&local, &remote),
			Resolution::UseLocal
		);
		assert_eq!(
			ConflictResolver::new(ConflictPolicy::RemoteWins).resolve(&local, &remote),
			Resolution::UseRemote
		);
	}

	#[test]
	fn test_newer_wins() {
		let resolver = ConflictResolver::new(ConflictPolicy::NewerWins);

		assert_eq!(resolver.resolve(&entry("a", 100), &entry("a", 200)), Resolution::UseRemote);
		assert_eq!(resolver.resolve(&entry("a", 300), &entry("a", 200)), Resolution::UseLocal);
		// Tie goes to local
		assert_eq!(resolver.resolve(&entry("a", 200), &entry("a", 200)), Resolution::UseLocal);
	}

	#[test]
	fn test_keep_both_produces_stamped_rename() {
		let resolver = ConflictResolver::new(ConflictPolicy::KeepBoth);
		match resolver.resolve(&entry("docs/report.txt", 1), &entry("docs/report.txt", 2)) {
			Resolution::KeepBoth { rename_to } => {
				let name = rename_to.name().to_string();
				assert!(name.starts_with("report_conflict_"), "got {}", name);
				assert!(name.ends_with(".txt"));
				assert_eq!(rename_to.parent().unwrap().as_str(), "docs");
			}
			other => panic!("expected KeepBoth, got {:?}", other),
		}
	}

	#[test]
	fn test_conflict_rename_format() {
		let at = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 45).unwrap();
		assert_eq!(
			conflict_rename(&rel("docs/report.txt"), at).as_str(),
			"docs/report_conflict_20240315103045.txt"
		);
		assert_eq!(
			conflict_rename(&rel("Makefile"), at).as_str(),
			"Makefile_conflict_20240315103045"
		);
	}

	#[test]
	fn test_skip_policy() {
		let resolver = ConflictResolver::new(ConflictPolicy::Skip);
		assert_eq!(resolver.resolve(&entry("a", 1), &entry("a", 2)), Resolution::Skip);
	}

	#[test]
	fn test_ask_user_without_callback_skips() {
		let resolver = ConflictResolver::new(ConflictPolicy::AskUser);
		assert_eq!(resolver.resolve(&entry("a", 1), &entry("a", 2)), Resolution::Skip);
	}

	#[test]
	fn test_ask_user_callback() {
		let resolver = ConflictResolver::with_callback(ConflictPolicy::AskUser, |_, _| {
			Some(Resolution::UseRemote)
		});
		assert_eq!(resolver.resolve(&entry("a", 1), &entry("a", 2)), Resolution::UseRemote);

		let declining = ConflictResolver::with_callback(ConflictPolicy::AskUser, |_, _| None);
		assert_eq!(declining.resolve(&entry("a", 1), &entry("a", 2)), Resolution::Skip);
	}
}

// vim: ts=4
