//! Unified configuration
//!
//! One `SyncConfig` struct is the source of truth for an engine instance.
//! Values follow a priority chain: built-in defaults, then an optional
//! config file (TOML or JSON), then explicit builder calls. Only
//! `app_folder_name` is required.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::envelope::EncryptionMode;
use crate::error::SyncError;
use crate::filter::{default_sync_filter, FileFilter};
use crate::hasher::ChecksumAlgorithm;
use crate::modes::{ConflictPolicy, NetworkPolicy, SyncMode};
use crate::retry::RetryPolicy;

/// One directory enrolled in synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDirectory {
	pub path: PathBuf,

	#[serde(default)]
	pub mode: SyncMode,

	#[serde(default = "default_true")]
	pub recursive: bool,
}

fn default_true() -> bool {
	true
}

/// Background scheduling hints, consumed by the host's job scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScheduleConfig {
	/// Periodic sync interval
	pub interval_secs: u64,

	/// Allowed flex window around the interval
	pub flex_secs: u64,

	/// Only run while charging
	pub requires_charging: bool,

	/// Skip runs on low battery
	pub requires_battery_not_low: bool,
}

impl Default for ScheduleConfig {
	fn default() -> Self {
		ScheduleConfig {
			interval_secs: 12 * 3600,
			flex_secs: 2 * 3600,
			requires_charging: false,
			requires_battery_not_low: true,
		}
	}
}

/// Engine-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
	/// Name of the application folder on the drive (required)
	pub app_folder_name: String,

	/// Directories enrolled for scheduled syncs
	pub sync_directories: Vec<SyncDirectory>,

	/// File filters; every filter must accept a file for it to sync.
	/// Not serialized: filters may carry arbitrary closures.
	#[serde(skip, default = "default_sync_filter")]
	pub file_filters: Vec<FileFilter>,

	pub conflict_policy: ConflictPolicy,

	pub checksum_algorithm: ChecksumAlgorithm,

	pub network_policy: NetworkPolicy,

	pub retry_policy: RetryPolicy,

	pub cache_policy: CachePolicy,

	/// At-rest encryption. Not serialized: holds key material.
	#[serde(skip)]
	pub encryption: EncryptionMode,

	pub schedule: ScheduleConfig,

	/// Concurrent transfers during the transfer phase
	pub max_parallel_transfers: u32,

	/// Per-call timeout for remote operations, seconds
	pub remote_timeout_secs: u64,

	/// Where resume state lives; defaults to the current directory
	pub state_dir: Option<PathBuf>,

	/// Where the manifest cache lives; defaults to `state_dir`
	pub cache_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			app_folder_name: String::new(),
			sync_directories: vec![],
			file_filters: default_sync_filter(),
			conflict_policy: ConflictPolicy::NewerWins,
			checksum_algorithm: ChecksumAlgorithm::Md5,
			network_policy: NetworkPolicy::Any,
			retry_policy: RetryPolicy::default(),
			cache_policy: CachePolicy::default(),
			encryption: EncryptionMode::None,
			schedule: ScheduleConfig::default(),
			max_parallel_transfers: 1,
			remote_timeout_secs: 60,
			state_dir: None,
			cache_dir: None,
		}
	}
}

impl SyncConfig {
	/// Start building a configuration.
	pub fn builder(app_folder_name: &str) -> SyncConfigBuilder {
		SyncConfigBuilder {
			config: SyncConfig { app_folder_name: app_folder_name.to_string(), ..Default::default() },
		}
	}

	/// Load a config file (`.toml` or `.json`) and validate it.
	pub async fn from_file(path: &Path) -> Result<Self, SyncError> {
		let contents = tokio::fs::read_to_string(path).await.map_err(|e| SyncError::InvalidConfig {
			message: format!("failed to read {}: {}", path.display(), e),
		})?;
		let config: SyncConfig = match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("failed to parse {}: {}", path.display(), e),
			})?,
			Some("json") => serde_json::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
				message: format!("failed to parse {}: {}", path.display(), e),
			})?,
			_ => {
				return Err(SyncError::InvalidConfig {
					message: format!("unsupported config format: {}", path.display()),
				})
			}
		};
		config.validate()?;
		Ok(config)
	}

	/// Check the invariants the engine relies on.
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.app_folder_name.trim().is_empty() {
			return Err(SyncError::InvalidConfig {
				message: "app_folder_name is required".to_string(),
			});
		}
		if self.app_folder_name.contains('/') {
			return Err(SyncError::InvalidConfig {
				message: "app_folder_name must be a single path segment".to_string(),
			});
		}
		if self.max_parallel_transfers == 0 {
			return Err(SyncError::InvalidConfig {
				message: "max_parallel_transfers must be at least 1".to_string(),
			});
		}
		if let EncryptionMode::Passphrase(passphrase) = &self.encryption {
			crate::envelope::validate_passphrase(passphrase)?;
		}
		Ok(())
	}

	pub fn remote_timeout(&self) -> Duration {
		Duration::from_secs(self.remote_timeout_secs)
	}

	/// The effective per-run option bundle for a given mode.
	pub fn options(&self, mode: SyncMode) -> SyncOptions {
		SyncOptions {
			mode,
			conflict_policy: self.conflict_policy,
			checksum_algorithm: self.checksum_algorithm,
			filters: self.file_filters.clone(),
			encryption: self.encryption.clone(),
			retry: self.retry_policy.clone(),
			network_policy: self.network_policy,
			max_parallel_transfers: self.max_parallel_transfers,
		}
	}
}

/// Everything one sync run needs to know
#[derive(Debug, Clone)]
pub struct SyncOptions {
	pub mode: SyncMode,
	pub conflict_policy: ConflictPolicy,
	pub checksum_algorithm: ChecksumAlgorithm,
	pub filters: Vec<FileFilter>,
	pub encryption: EncryptionMode,
	pub retry: RetryPolicy,
	pub network_policy: NetworkPolicy,
	pub max_parallel_transfers: u32,
}

/// Fluent builder over `SyncConfig`
pub struct SyncConfigBuilder {
	config: SyncConfig,
}

impl SyncConfigBuilder {
	pub fn sync_directory(mut self, path: impl Into<PathBuf>, mode: SyncMode, recursive: bool) -> Self {
		self.config.sync_directories.push(SyncDirectory { path: path.into(), mode, recursive });
		self
	}

	pub fn file_filters(mut self, filters: Vec<FileFilter>) -> Self {
		self.config.file_filters = filters;
		self
	}

	pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
		self.config.conflict_policy = policy;
		self
	}

	pub fn checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
		self.config.checksum_algorithm = algorithm;
		self
	}

	pub fn network_policy(mut self, policy: NetworkPolicy) -> Self {
		self.config.network_policy = policy;
		self
	}

	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.config.retry_policy = policy;
		self
	}

	pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
		self.config.cache_policy = policy;
		self
	}

	pub fn encryption(mut self, mode: EncryptionMode) -> Self {
		self.config.encryption = mode;
		self
	}

	pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
		self.config.schedule = schedule;
		self
	}

	pub fn max_parallel_transfers(mut self, n: u32) -> Self {
		self.config.max_parallel_transfers = n;
		self
	}

	pub fn remote_timeout(mut self, timeout: Duration) -> Self {
		self.config.remote_timeout_secs = timeout.as_secs();
		self
	}

	pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.state_dir = Some(dir.into());
		self
	}

	pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.cache_dir = Some(dir.into());
		self
	}

	/// Validate and produce the final configuration.
	pub fn build(self) -> Result<SyncConfig, SyncError> {
		self.config.validate()?;
		Ok(self.config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_defaults() {
		let config = SyncConfig::builder("MyApp").build().unwrap();
		assert_eq!(config.app_folder_name, "MyApp");
		assert_eq!(config.conflict_policy, ConflictPolicy::NewerWins);
		assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Md5);
		assert_eq!(config.network_policy, NetworkPolicy::Any);
		assert_eq!(config.max_parallel_transfers, 1);
		assert_eq!(config.remote_timeout_secs, 60);
		assert_eq!(config.retry_policy.max_attempts, 3);
		assert!(config.cache_policy.enabled);
		assert_eq!(config.schedule.interval_secs, 12 * 3600);
		assert!(!config.file_filters.is_empty());
	}

	#[test]
	fn test_app_folder_name_required() {
		assert!(matches!(
			SyncConfig::builder("").build(),
			Err(SyncError::InvalidConfig { .. })
		));
		assert!(matches!(
			SyncConfig::builder("a/b").build(),
			Err(SyncError::InvalidConfig { .. })
		));
	}

	#[test]
	fn test_parallel_transfers_validation() {
		let result = SyncConfig::builder("App").max_parallel_transfers(0).build();
		assert!(matches!(result, Err(SyncError::InvalidConfig { .. })));
	}

	#[test]
	fn test_weak_passphrase_rejected_at_build() {
		let result = SyncConfig::builder("App")
			.encryption(EncryptionMode::Passphrase("short".to_string()))
			.build();
		assert!(matches!(result, Err(SyncError::Crypto(_))));
	}

	#[test]
	fn test_builder_round_trip() {
		let config = SyncConfig::builder("App")
			.sync_directory("/data/docs", SyncMode::MirrorToCloud, true)
			.conflict_policy(ConflictPolicy::KeepBoth)
			.checksum_algorithm(ChecksumAlgorithm::Sha256)
			.max_parallel_transfers(4)
			.remote_timeout(Duration::from_secs(30))
			.build()
			.unwrap();

		assert_eq!(config.sync_directories.len(), 1);
		assert_eq!(config.sync_directories[0].mode, SyncMode::MirrorToCloud);
		assert_eq!(config.conflict_policy, ConflictPolicy::KeepBoth);
		assert_eq!(config.remote_timeout(), Duration::from_secs(30));

		let options = config.options(SyncMode::Bidirectional);
		assert_eq!(options.mode, SyncMode::Bidirectional);
		assert_eq!(options.checksum_algorithm, ChecksumAlgorithm::Sha256);
		assert_eq!(options.max_parallel_transfers, 4);
	}

	#[tokio::test]
	async fn test_load_toml() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.toml");
		std::fs::write(
			&path,
			r#"
appFolderName = "MyApp"
conflictPolicy = "keep-both"
checksumAlgorithm = "sha256"
maxParallelTransfers = 2

[[syncDirectories]]
path = "/data/photos"
mode = "upload-only"
"#,
		)
		.unwrap();

		let config = SyncConfig::from_file(&path).await.unwrap();
		assert_eq!(config.app_folder_name, "MyApp");
		assert_eq!(config.conflict_policy, ConflictPolicy::KeepBoth);
		assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Sha256);
		assert_eq!(config.max_parallel_transfers, 2);
		assert_eq!(config.sync_directories.len(), 1);
		assert_eq!(config.sync_directories[0].mode, SyncMode::UploadOnly);
		assert!(config.sync_directories[0].recursive);
	}

	#[tokio::test]
	async fn test_load_json() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		std::fs::write(&path, r#"{ "appFolderName": "App", "networkPolicy": "wifi-only" }"#)
			.unwrap();

		let config = SyncConfig::from_file(&path).await.unwrap();
		assert_eq!(config.network_policy, NetworkPolicy::WifiOnly);
	}

	#[tokio::test]
	async fn test_load_rejects_missing_folder_name() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		std::fs::write(&path, r#"{ "networkPolicy": "any" }"#).unwrap();
		assert!(SyncConfig::from_file(&path).await.is_err());
	}
}

// vim: ts=4
