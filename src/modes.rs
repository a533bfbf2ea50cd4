//! Consolidated mode and policy enums
//!
//! Central location for the direction, conflict and network policy enums
//! used across planning and execution. Each enum carries a `FromStr`
//! implementation for config parsing and a matching `Display`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// SYNC MODE
// ============================================================================

/// Direction of synchronization between the local tree and the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
	/// Changes flow both ways; conflicts are resolved by policy
	#[default]
	Bidirectional,

	/// Local changes are pushed; the cloud never modifies local files
	UploadOnly,

	/// Cloud changes are pulled; local files are never pushed
	DownloadOnly,

	/// The cloud becomes an exact copy of the local tree
	MirrorToCloud,

	/// The local tree becomes an exact copy of the cloud
	MirrorFromCloud,
}

impl FromStr for SyncMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"bidirectional" | "bi" | "two-way" => Ok(Self::Bidirectional),
			"upload-only" | "upload" => Ok(Self::UploadOnly),
			"download-only" | "download" => Ok(Self::DownloadOnly),
			"mirror-to-cloud" | "mirror-up" => Ok(Self::MirrorToCloud),
			"mirror-from-cloud" | "mirror-down" => Ok(Self::MirrorFromCloud),
			_ => Err(format!(
				"Unknown sync mode: {}. Valid options: bidirectional, upload-only, download-only, mirror-to-cloud, mirror-from-cloud",
				s
			)),
		}
	}
}

impl std::fmt::Display for SyncMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Bidirectional => write!(f, "bidirectional"),
			Self::UploadOnly => write!(f, "upload-only"),
			Self::DownloadOnly => write!(f, "download-only"),
			Self::MirrorToCloud => write!(f, "mirror-to-cloud"),
			Self::MirrorFromCloud => write!(f, "mirror-from-cloud"),
		}
	}
}

impl SyncMode {
	/// Whether this mode may push local content to the cloud.
	pub fn allows_upload(&self) -> bool {
		matches!(self, Self::Bidirectional | Self::UploadOnly | Self::MirrorToCloud)
	}

	/// Whether this mode may pull cloud content to the local tree.
	pub fn allows_download(&self) -> bool {
		matches!(self, Self::Bidirectional | Self::DownloadOnly | Self::MirrorFromCloud)
	}

	/// Mirror modes overwrite the non-authoritative side and never conflict.
	pub fn is_mirror(&self) -> bool {
		matches!(self, Self::MirrorToCloud | Self::MirrorFromCloud)
	}
}

// ============================================================================
// CONFLICT POLICY
// ============================================================================

/// Policy applied when a path was modified on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
	/// The local version always wins
	LocalWins,

	/// The remote version always wins
	RemoteWins,

	/// The version with the strictly newer modification time wins;
	/// ties go to the local version
	#[default]
	NewerWins,

	/// Keep the local version and save the remote one under a
	/// conflict-stamped name
	KeepBoth,

	/// Leave the path unchanged on both sides
	Skip,

	/// Ask a user-supplied callback; without one, behaves like Skip
	AskUser,
}

impl FromStr for ConflictPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"local-wins" | "local" => Ok(Self::LocalWins),
			"remote-wins" | "remote" => Ok(Self::RemoteWins),
			"newer-wins" | "newest" => Ok(Self::NewerWins),
			"keep-both" | "both" => Ok(Self::KeepBoth),
			"skip" => Ok(Self::Skip),
			"ask-user" | "ask" | "interactive" => Ok(Self::AskUser),
			_ => Err(format!(
				"Unknown conflict policy: {}. Valid options: local-wins, remote-wins, newer-wins, keep-both, skip, ask-user",
				s
			)),
		}
	}
}

impl std::fmt::Display for ConflictPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::LocalWins => write!(f, "local-wins"),
			Self::RemoteWins => write!(f, "remote-wins"),
			Self::NewerWins => write!(f, "newer-wins"),
			Self::KeepBoth => write!(f, "keep-both"),
			Self::Skip => write!(f, "skip"),
			Self::AskUser => write!(f, "ask-user"),
		}
	}
}

// ============================================================================
// NETWORK POLICY
// ============================================================================

/// Which network conditions permit transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPolicy {
	/// Any connection
	#[default]
	Any,

	/// Only unmetered connections
	UnmeteredOnly,

	/// Only Wi-Fi
	WifiOnly,

	/// Any connection except roaming
	NotRoaming,
}

impl FromStr for NetworkPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"any" => Ok(Self::Any),
			"unmetered-only" | "unmetered" => Ok(Self::UnmeteredOnly),
			"wifi-only" | "wifi" => Ok(Self::WifiOnly),
			"not-roaming" => Ok(Self::NotRoaming),
			_ => Err(format!(
				"Unknown network policy: {}. Valid options: any, unmetered-only, wifi-only, not-roaming",
				s
			)),
		}
	}
}

impl std::fmt::Display for NetworkPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Any => write!(f, "any"),
			Self::UnmeteredOnly => write!(f, "unmetered-only"),
			Self::WifiOnly => write!(f, "wifi-only"),
			Self::NotRoaming => write!(f, "not-roaming"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sync_mode_from_str() {
		assert_eq!(SyncMode::from_str("bidirectional").unwrap(), SyncMode::Bidirectional);
		assert_eq!(SyncMode::from_str("upload-only").unwrap(), SyncMode::UploadOnly);
		assert_eq!(SyncMode::from_str("mirror-down").unwrap(), SyncMode::MirrorFromCloud);
		assert!(SyncMode::from_str("sideways").is_err());
	}

	#[test]
	fn test_sync_mode_direction() {
		assert!(SyncMode::Bidirectional.allows_upload());
		assert!(SyncMode::Bidirectional.allows_download());
		assert!(SyncMode::UploadOnly.allows_upload());
		assert!(!SyncMode::UploadOnly.allows_download());
		assert!(!SyncMode::DownloadOnly.allows_upload());
		assert!(SyncMode::MirrorToCloud.is_mirror());
		assert!(!SyncMode::Bidirectional.is_mirror());
	}

	#[test]
	fn test_conflict_policy_from_str() {
		assert_eq!(ConflictPolicy::from_str("newer-wins").unwrap(), ConflictPolicy::NewerWins);
		assert_eq!(ConflictPolicy::from_str("keep-both").unwrap(), ConflictPolicy::KeepBoth);
		assert_eq!(ConflictPolicy::from_str("ask").unwrap(), ConflictPolicy::AskUser);
		assert!(ConflictPolicy::from_str("flip-coin").is_err());
	}

	#[test]
	fn test_network_policy_round_trip() {
		for policy in
			[NetworkPolicy::Any, NetworkPolicy::UnmeteredOnly, NetworkPolicy::WifiOnly, NetworkPolicy::NotRoaming]
		{
			assert_eq!(NetworkPolicy::from_str(&policy.to_string()).unwrap(), policy);
		}
	}
}

// vim: ts=4
