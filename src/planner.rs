//! Diff planning
//!
//! Turns a pair of manifests and a sync mode into an ordered action plan.
//! Planning is pure and deterministic: identical inputs always produce
//! the identical action sequence. Deletions come first (a keep-both
//! rename must never collide with a file about to disappear), then
//! everything else, lexicographic by path inside each bucket.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manifest::{Manifest, ManifestEntry};
use crate::modes::SyncMode;
use crate::relpath::RelPath;

/// Modification times closer than this count as equal
const MTIME_TOLERANCE_MS: i64 = 2000;

/// One planned operation on one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SyncAction {
	/// Push the local file to the cloud
	Upload { path: RelPath },

	/// Pull the remote file to the local tree
	Download { path: RelPath },

	/// Remove the local file
	DeleteLocal { path: RelPath },

	/// Remove the remote file
	DeleteRemote { path: RelPath },

	/// Both sides changed; resolution is deferred to the conflict policy
	Conflict { path: RelPath },

	/// Deliberately not transferred
	Skip { path: RelPath, reason: String },

	/// Nothing to do for this path
	None { path: RelPath },
}

impl SyncAction {
	pub fn path(&self) -> &RelPath {
		match self {
			SyncAction::Upload { path }
			| SyncAction::Download { path }
			| SyncAction::DeleteLocal { path }
			| SyncAction::DeleteRemote { path }
			| SyncAction::Conflict { path }
			| SyncAction::Skip { path, .. }
			| SyncAction::None { path } => path,
		}
	}

	/// Whether executing this action touches either side.
	pub fn is_effective(&self) -> bool {
		!matches!(self, SyncAction::None { .. } | SyncAction::Skip { .. })
	}

	pub fn is_deletion(&self) -> bool {
		matches!(self, SyncAction::DeleteLocal { .. } | SyncAction::DeleteRemote { .. })
	}
}

/// Computes action plans from manifest pairs
pub struct DiffPlanner;

impl DiffPlanner {
	/// Map every path in the union of both manifests to an action.
	pub fn plan(local: &Manifest, remote: &Manifest, mode: SyncMode) -> Vec<SyncAction> {
		let mut deletions = Vec::new();
		let mut rest = Vec::new();

		// BTreeMap keys come out sorted; a sorted merge keeps the union
		// in lexicographic order without collecting it first.
		let mut local_iter = local.files.iter().peekable();
		let mut remote_iter = remote.files.iter().peekable();

		loop {
			let action = match (local_iter.peek(), remote_iter.peek()) {
				(Some((lp, le)), Some((rp, re))) => match lp.cmp(rp) {
					std::cmp::Ordering::Less => {
						let action = Self::local_only(lp, mode);
						local_iter.next();
						action
					}
					std::cmp::Ordering::Greater => {
						let action = Self::remote_only(rp, mode);
						remote_iter.next();
						action
					}
					std::cmp::Ordering::Equal => {
						let action = Self::both(lp, le, re, mode);
						local_iter.next();
						remote_iter.next();
						action
					}
				},
				(Some((lp, _)), None) => {
					let action = Self::local_only(lp, mode);
					local_iter.next();
					action
				}
				(None, Some((rp, _))) => {
					let action = Self::remote_only(rp, mode);
					remote_iter.next();
					action
				}
				(None, None) => break,
			};
			if action.is_deletion() {
				deletions.push(action);
			} else {
				rest.push(action);
			}
		}

		deletions.extend(rest);
		debug!(
			mode = %mode,
			actions = deletions.len(),
			effective = deletions.iter().filter(|a| a.is_effective()).count(),
			"computed sync plan"
		);
		deletions
	}

	fn both(path: &RelPath, local: &ManifestEntry, remote: &ManifestEntry, mode: SyncMode) -> SyncAction {
		if Self::entries_equal(local, remote) {
			return SyncAction::None { path: path.clone() };
		}
		match mode {
			// The designated source overwrites; mirrors never conflict
			SyncMode::MirrorToCloud => SyncAction::Upload { path: path.clone() },
			SyncMode::MirrorFromCloud => SyncAction::Download { path: path.clone() },
			_ => SyncAction::Conflict { path: path.clone() },
		}
	}

	fn local_only(path: &RelPath, mode: SyncMode) -> SyncAction {
		match mode {
			SyncMode::Bidirectional | SyncMode::UploadOnly | SyncMode::MirrorToCloud => {
				SyncAction::Upload { path: path.clone() }
			}
			SyncMode::MirrorFromCloud => SyncAction::DeleteLocal { path: path.clone() },
			SyncMode::DownloadOnly => SyncAction::None { path: path.clone() },
		}
	}

	fn remote_only(path: &RelPath, mode: SyncMode) -> SyncAction {
		match mode {
			SyncMode::Bidirectional | SyncMode::DownloadOnly | SyncMode::MirrorFromCloud => {
				SyncAction::Download { path: path.clone() }
			}
			SyncMode::MirrorToCloud => SyncAction::DeleteRemote { path: path.clone() },
			SyncMode::UploadOnly => SyncAction::None { path: path.clone() },
		}
	}

	/// Content equality: checksums when both sides have one, otherwise
	/// size plus modification time within tolerance.
	fn entries_equal(local: &ManifestEntry, remote: &ManifestEntry) -> bool {
		if let (Some(lc), Some(rc)) = (&local.checksum, &remote.checksum) {
			return lc == rc;
		}
		local.size == remote.size
			&& (local.modified_ms - remote.modified_ms).abs() <= MTIME_TOLERANCE_MS
	}
}


// vim: ts=4
