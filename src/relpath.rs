//! Normalized relative paths
//!
//! Every path handled by the sync core is a forward-slash separated path
//! relative to the sync root. Normalization happens once, at construction;
//! the rest of the crate can rely on the invariants and use plain byte-wise
//! ordering for deterministic iteration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LocalError;

/// A normalized relative path.
///
/// Invariants:
/// - forward-slash separated, no leading or trailing slash
/// - no empty segments, no `.` or `..` segments
/// - never empty
///
/// Comparison is case-sensitive, ordering is lexicographic by bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

impl RelPath {
	/// Normalize and validate a raw path string.
	///
	/// Backslashes are accepted as separators and converted. Redundant
	/// slashes are collapsed. Anything that would escape the root
	/// (`..`), or an empty result, is rejected.
	pub fn new(raw: &str) -> Result<Self, LocalError> {
		let mut segments = Vec::new();
		for segment in raw.split(['/', '\\']) {
			match segment {
				"" | "." => continue,
				".." => {
					return Err(LocalError::PathInvalid { path: raw.to_string() });
				}
				s => segments.push(s),
			}
		}
		if segments.is_empty() {
			return Err(LocalError::PathInvalid { path: raw.to_string() });
		}
		Ok(RelPath(segments.join("/")))
	}

	/// The normalized path string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Last path segment (the file or directory name).
	pub fn name(&self) -> &str {
		self.0.rsplit('/').next().unwrap_or(&self.0)
	}

	/// Parent path, or None for a top-level entry.
	pub fn parent(&self) -> Option<RelPath> {
		self.0.rfind('/').map(|idx| RelPath(self.0[..idx].to_string()))
	}

	/// Path segments in order.
	pub fn segments(&self) -> impl Iterator<Item = &str> {
		self.0.split('/')
	}

	/// Append a single segment.
	pub fn join(&self, segment: &str) -> Result<RelPath, LocalError> {
		RelPath::new(&format!("{}/{}", self.0, segment))
	}

	/// File name without the final extension.
	pub fn stem(&self) -> &str {
		let name = self.name();
		match name.rfind('.') {
			Some(idx) if idx > 0 => &name[..idx],
			_ => name,
		}
	}

	/// Final extension including the leading dot, if any.
	pub fn extension(&self) -> Option<&str> {
		let name = self.name();
		match name.rfind('.') {
			Some(idx) if idx > 0 => Some(&name[idx..]),
			_ => None,
		}
	}

	/// Whether this path is under the given prefix (segment-aligned).
	pub fn starts_with(&self, prefix: &str) -> bool {
		let prefix = prefix.trim_end_matches('/');
		if prefix.is_empty() {
			return true;
		}
		self.0 == prefix
			|| (self.0.starts_with(prefix) && self.0.as_bytes().get(prefix.len()) == Some(&b'/'))
	}

	/// Resolve against a filesystem root.
	pub fn to_fs_path(&self, root: &Path) -> PathBuf {
		let mut path = root.to_path_buf();
		for segment in self.segments() {
			path.push(segment);
		}
		path
	}
}

impl fmt::Display for RelPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Debug for RelPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RelPath({:?})", self.0)
	}
}

impl TryFrom<String> for RelPath {
	type Error = LocalError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		RelPath::new(&s)
	}
}

impl From<RelPath> for String {
	fn from(p: RelPath) -> String {
		p.0
	}
}


// vim: ts=4
