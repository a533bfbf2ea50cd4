//! Manifest metadata cache
//!
//! Two slots (local / remote manifest) held in memory behind one RwLock
//! and mirrored to JSON files under `<cache_root>/sync_cache/`. Entries
//! expire after `max_age`; expired entries are treated as absent both in
//! memory and when rehydrating from disk.
//!
//! The lock is never held across I/O: persistence serializes a snapshot
//! under the read lock and performs the file write after releasing it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::manifest::Manifest;

/// Which side of the sync a cached manifest describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSide {
	Local,
	Remote,
}

impl std::fmt::Display for CacheSide {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CacheSide::Local => write!(f, "local"),
			CacheSide::Remote => write!(f, "remote"),
		}
	}
}

/// Cache behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachePolicy {
	pub enabled: bool,

	/// Maximum age before a cached manifest is stale, in seconds
	pub max_age_secs: u64,

	/// Manifests with more entries than this are not cached
	pub max_entries: usize,
}

impl Default for CachePolicy {
	fn default() -> Self {
		CachePolicy { enabled: true, max_age_secs: 3600, max_entries: 10_000 }
	}
}

impl CachePolicy {
	pub fn max_age(&self) -> Duration {
		Duration::from_secs(self.max_age_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
	manifest: Manifest,
	stored_at_ms: i64,
}

/// Thread-safe manifest cache with JSON persistence
pub struct MetadataCache {
	dir: PathBuf,
	policy: CachePolicy,
	slots: RwLock<[Option<Slot>; 2]>,
}

impl MetadataCache {
	/// Create a cache rooted at `<cache_root>/sync_cache`.
	pub fn new(cache_root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
		MetadataCache {
			dir: cache_root.into().join("sync_cache"),
			policy,
			slots: RwLock::new([None, None]),
		}
	}

	fn index(side: CacheSide) -> usize {
		match side {
			CacheSide::Local => 0,
			CacheSide::Remote => 1,
		}
	}

	fn file_path(&self, side: CacheSide) -> PathBuf {
		self.dir.join(format!("{}_manifest.json", side))
	}

	fn is_fresh(&self, slot: &Slot) -> bool {
		let age_ms = Utc::now().timestamp_millis().saturating_sub(slot.stored_at_ms);
		age_ms >= 0 && (age_ms as u64) <= self.policy.max_age_secs.saturating_mul(1000)
	}

	/// The cached manifest for a side, if present and fresh.
	pub fn get(&self, side: CacheSide) -> Option<Manifest> {
		if !self.policy.enabled {
			return None;
		}
		let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
		let slot = slots[Self::index(side)].as_ref()?;
		if self.is_fresh(slot) {
			Some(slot.manifest.clone())
		} else {
			None
		}
	}

	/// Store a manifest in memory.
	pub fn put(&self, side: CacheSide, manifest: Manifest) {
		if !self.policy.enabled {
			return;
		}
		if manifest.len() > self.policy.max_entries {
			warn!(
				side = %side,
				entries = manifest.len(),
				limit = self.policy.max_entries,
				"manifest exceeds cache entry limit, not caching"
			);
			return;
		}
		let slot = Slot { manifest, stored_at_ms: Utc::now().timestamp_millis() };
		let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
		slots[Self::index(side)] = Some(slot);
	}

	/// Write a side's slot to its JSON file.
	pub async fn persist(&self, side: CacheSide) -> Result<(), StateError> {
		// Snapshot under the lock, write after releasing it
		let json = {
			let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
			match &slots[Self::index(side)] {
				Some(slot) => serde_json::to_string(slot)
					.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?,
				None => return Ok(()),
			}
		};
		tokio::fs::create_dir_all(&self.dir)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		tokio::fs::write(self.file_path(side), json)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		debug!(side = %side, "persisted manifest cache");
		Ok(())
	}

	/// Load a side's slot from disk; expired or missing files yield None.
	pub async fn load(&self, side: CacheSide) -> Result<Option<Manifest>, StateError> {
		if !self.policy.enabled {
			return Ok(None);
		}
		let path = self.file_path(side);
		if !path.exists() {
			return Ok(None);
		}
		let contents = tokio::fs::read_to_string(&path)
			.await
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let slot: Slot = serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
			message: format!("failed to parse cached manifest: {}", e),
		})?;
		if !self.is_fresh(&slot) {
			return Ok(None);
		}
		let manifest = slot.manifest.clone();
		let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
		slots[Self::index(side)] = Some(slot);
		Ok(Some(manifest))
	}

	/// Drop both slots and remove the on-disk files.
	pub async fn invalidate_all(&self) -> Result<(), StateError> {
		{
			let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
			slots[0] = None;
			slots[1] = None;
		}
		for side in [CacheSide::Local, CacheSide::Remote] {
			let path = self.file_path(side);
			if path.exists() {
				tokio::fs::remove_file(&path)
					.await
					.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hasher::ChecksumAlgorithm;
	use crate::manifest::ManifestEntry;
	use crate::relpath::RelPath;
	use tempfile::TempDir;

	fn sample_manifest(n: usize) -> Manifest {
		let mut manifest = Manifest::new(ChecksumAlgorithm::Md5);
		for i in 0..n {
			let path = RelPath::new(&format!("file{}.txt", i)).unwrap();
			manifest.insert(ManifestEntry {
				name: path.name().to_string(),
				relative_path: path,
				size: 1,
				modified_ms: 0,
				checksum: None,
				remote_id: None,
			});
		}
		manifest
	}

	#[test]
	fn test_put_get() {
		let tmp = TempDir::new().unwrap();
		let cache = MetadataCache::new(tmp.path(), CachePolicy::default());

		assert!(cache.get(CacheSide::Local).is_none());
		cache.put(CacheSide::Local, sample_manifest(3));
		assert_eq!(cache.get(CacheSide::Local).unwrap().len(), 3);
		assert!(cache.get(CacheSide::Remote).is_none());
	}

	#[test]
	fn test_disabled_cache_stores_nothing() {
		let tmp = TempDir::new().unwrap();
		let policy = CachePolicy { enabled: false, ..CachePolicy::default() };
		let cache = MetadataCache::new(tmp.path(), policy);

		cache.put(CacheSide::Local, sample_manifest(1));
		assert!(cache.get(CacheSide::Local).is_none());
	}

	#[test]
	fn test_entry_limit() {
		let tmp = TempDir::new().unwrap();
		let policy = CachePolicy { max_entries: 2, ..CachePolicy::default() };
		let cache = MetadataCache::new(tmp.path(), policy);

		cache.put(CacheSide::Local, sample_manifest(3));
		assert!(cache.get(CacheSide::Local).is_none());
		cache.put(CacheSide::Local, sample_manifest(2));
		assert!(cache.get(CacheSide::Local).is_some());
	}

	#[test]
	fn test_expiry() {
		let tmp = TempDir::new().unwrap();
		let policy = CachePolicy { max_age_secs: 0, ..CachePolicy::default() };
		let cache = MetadataCache::new(tmp.path(), policy);

		cache.put(CacheSide::Local, sample_manifest(1));
		// max_age of zero: anything stored in the past is stale; a
		// just-stored entry may still be within the same millisecond
		std::thread::sleep(std::time::Duration::from_millis(5));
		assert!(cache.get(CacheSide::Local).is_none());
	}

	#[tokio::test]
	async fn test_persist_and_load() {
		let tmp = TempDir::new().unwrap();
		let cache = MetadataCache::new(tmp.path(), CachePolicy::default());

		cache.put(CacheSide::Remote, sample_manifest(2));
		cache.persist(CacheSide::Remote).await.unwrap();
		assert!(tmp.path().join("sync_cache/remote_manifest.json").exists());

		let fresh = MetadataCache::new(tmp.path(), CachePolicy::default());
		let loaded = fresh.load(CacheSide::Remote).await.unwrap().unwrap();
		assert_eq!(loaded.len(), 2);
		// Now also available from memory
		assert!(fresh.get(CacheSide::Remote).is_some());
	}

	#[tokio::test]
	async fn test_invalidate_all() {
		let tmp = TempDir::new().unwrap();
		let cache = MetadataCache::new(tmp.path(), CachePolicy::default());

		cache.put(CacheSide::Local, sample_manifest(1));
		cache.put(CacheSide::Remote, sample_manifest(1));
		cache.persist(CacheSide::Local).await.unwrap();
		cache.persist(CacheSide::Remote).await.unwrap();

		cache.invalidate_all().await.unwrap();
		assert!(cache.get(CacheSide::Local).is_none());
		assert!(cache.get(CacheSide::Remote).is_none());
		assert!(!tmp.path().join("sync_cache/local_manifest.json").exists());
		assert!(!tmp.path().join("sync_cache/remote_manifest.json").exists());
	}

	#[tokio::test]
	async fn test_load_corrupted_file() {
		let tmp = TempDir::new().unwrap();
		let dir = tmp.path().join("sync_cache");
		std::fs::create_dir_all(&dir).unwrap();
		std::fs::write(dir.join("local_manifest.json"), b"{ not json").unwrap();

		let cache = MetadataCache::new(tmp.path(), CachePolicy::default());
		assert!(matches!(
			cache.load(CacheSide::Local).await,
			Err(StateError::Corrupted { .. })
		));
	}
}

// vim: ts=4
