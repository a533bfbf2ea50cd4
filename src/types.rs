//! Sync result types

use std::time::Duration;

use crate::relpath::RelPath;

/// A single file's failure, reported in partial results
#[derive(Debug, Clone)]
pub struct FileError {
	pub path: RelPath,
	pub message: String,
}

/// Outcome of a sync run
#[derive(Debug, Clone)]
pub enum SyncResult {
	/// Every action completed
	Success {
		uploaded: usize,
		downloaded: usize,
		deleted: usize,
		skipped: usize,
		bytes: u64,
		duration: Duration,
	},

	/// Some actions failed but progress was made
	PartialSuccess {
		succeeded: usize,
		failed: usize,
		errors: Vec<FileError>,
		duration: Duration,
	},

	/// No progress was possible
	Error { message: String },

	/// No signed-in account
	NotSignedIn,

	/// No connectivity
	NetworkUnavailable,

	/// Cancelled cooperatively; resume state was saved
	Cancelled,
}

impl SyncResult {
	pub fn is_success(&self) -> bool {
		matches!(self, SyncResult::Success { .. })
	}

	/// Effective transfers performed (uploads + downloads + deletes).
	pub fn transfer_count(&self) -> usize {
		match self {
			SyncResult::Success { uploaded, downloaded, deleted, .. } => {
				uploaded + downloaded + deleted
			}
			SyncResult::PartialSuccess { succeeded, .. } => *succeeded,
			_ => 0,
		}
	}
}

impl std::fmt::Display for SyncResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SyncResult::Success { uploaded, downloaded, deleted, skipped, bytes, duration } => {
				write!(
					f,
					"ok: {} up, {} down, {} deleted, {} skipped, {} bytes in {:.1}s",
					uploaded,
					downloaded,
					deleted,
					skipped,
					bytes,
					duration.as_secs_f64()
				)
			}
			SyncResult::PartialSuccess { succeeded, failed, duration, .. } => {
				write!(f, "partial: {} ok, {} failed in {:.1}s", succeeded, failed, duration.as_secs_f64())
			}
			SyncResult::Error { message } => write!(f, "error: {}", message),
			SyncResult::NotSignedIn => write!(f, "not signed in"),
			SyncResult::NetworkUnavailable => write!(f, "network unavailable"),
			SyncResult::Cancelled => write!(f, "cancelled"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transfer_count() {
		let ok = SyncResult::Success {
			uploaded: 2,
			downloaded: 3,
			deleted: 1,
			skipped: 5,
			bytes: 100,
			duration: Duration::from_secs(1),
		};
		assert_eq!(ok.transfer_count(), 6);
		assert!(ok.is_success());

		assert_eq!(SyncResult::Cancelled.transfer_count(), 0);
		assert!(!SyncResult::NotSignedIn.is_success());
	}
}

// vim: ts=4
