//! Content-addressed tree manifests
//!
//! A `Manifest` is a snapshot of one side of the sync: every visible file
//! keyed by normalized relative path, with size, modification time and
//! (where available) a content checksum. Both sides produce the same
//! shape so the planner can diff them directly.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::envelope::EncryptionMode;
use crate::error::SyncError;
use crate::filter::{accept_all, FileFilter, FilterEntry};
use crate::hasher::{self, ChecksumAlgorithm};
use crate::local::LocalStore;
use crate::relpath::RelPath;
use crate::remote::RemoteStore;

/// One file in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
	pub relative_path: RelPath,

	/// Last path segment
	pub name: String,

	/// Content size in bytes
	pub size: u64,

	/// Modification time, milliseconds since the epoch, UTC
	#[serde(rename = "modified_time_ms")]
	pub modified_ms: i64,

	/// Lowercase hex digest of the content, absent if not computed
	#[serde(skip_serializing_if = "Option::is_none")]
	pub checksum: Option<String>,

	/// Identifier assigned by the remote store; local entries have none
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remote_id: Option<String>,
}

/// Snapshot of a tree at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
	/// Files keyed by relative path; iteration is lexicographic
	#[serde(rename = "entries")]
	pub files: BTreeMap<RelPath, ManifestEntry>,

	pub created_at_ms: i64,

	#[serde(default)]
	pub algorithm: ChecksumAlgorithm,
}

impl Manifest {
	pub fn new(algorithm: ChecksumAlgorithm) -> Self {
		Manifest { files: BTreeMap::new(), created_at_ms: Utc::now().timestamp_millis(), algorithm }
	}

	pub fn insert(&mut self, entry: ManifestEntry) {
		self.files.insert(entry.relative_path.clone(), entry);
	}

	pub fn get(&self, path: &RelPath) -> Option<&ManifestEntry> {
		self.files.get(path)
	}

	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	/// Paths in lexicographic order.
	pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
		self.files.keys()
	}
}

/// Builds manifests from either side of the sync
pub struct ManifestBuilder;

impl ManifestBuilder {
	/// Walk the local tree, apply filters, and checksum every visible file.
	pub async fn build_local(
		store: &LocalStore,
		filters: &[FileFilter],
		algorithm: ChecksumAlgorithm,
	) -> Result<Manifest, SyncError> {
		let mut manifest = Manifest::new(algorithm);
		let entries = store.list(None, filters, true).await?;
		for entry in entries {
			if entry.is_dir {
				continue;
			}
			let mut file = store.read(&entry.path).await?;
			let checksum = hasher::hash_reader(algorithm, &mut file).await?;
			manifest.insert(ManifestEntry {
				name: entry.name,
				size: entry.size,
				modified_ms: entry.modified_ms,
				checksum: Some(checksum),
				remote_id: None,
				relative_path: entry.path,
			});
		}
		debug!(files = manifest.len(), "built local manifest");
		Ok(manifest)
	}

	/// Build the remote manifest from a recursive listing.
	///
	/// Remote checksums are only trusted when the configured algorithm is
	/// MD5 and the store supplied one, and never when content is stored
	/// encrypted (the service hashes ciphertext, the diff needs plaintext
	/// identity). With encryption active, sizes are reduced by the fixed
	/// envelope overhead so they are comparable with plaintext sizes.
	pub async fn build_remote(
		remote: &dyn RemoteStore,
		folder_id: &str,
		filters: &[FileFilter],
		algorithm: ChecksumAlgorithm,
		encryption: &EncryptionMode,
	) -> Result<Manifest, SyncError> {
		let mut manifest = Manifest::new(algorithm);
		let overhead = encryption.overhead() as u64;
		for entry in remote.list_recursive(folder_id).await? {
			let size = entry.size.saturating_sub(overhead);
			let filter_entry = FilterEntry::new(&entry.path, size);
			if !accept_all(filters, &filter_entry) {
				continue;
			}
			let checksum = if algorithm == ChecksumAlgorithm::Md5 && !encryption.is_active() {
				entry.md5
			} else {
				None
			};
			manifest.insert(ManifestEntry {
				name: entry.name,
				size,
				modified_ms: entry.modified_ms,
				checksum,
				remote_id: Some(entry.id),
				relative_path: entry.path,
			});
		}
		debug!(files = manifest.len(), "built remote manifest");
		Ok(manifest)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::filter::default_sync_filter;
	use crate::remote::MemoryRemoteStore;
	use tempfile::TempDir;

	fn rel(s: &str) -> RelPath {
		RelPath::new(s).unwrap()
	}

	#[tokio::test]
	async fn test_build_local() {
		let tmp = TempDir::new().unwrap();
		let store = LocalStore::new(tmp.path());
		store.write_atomic_bytes(&rel("a.txt"), b"alpha").await.unwrap();
		store.write_atomic_bytes(&rel("sub/b.txt"), b"beta").await.unwrap();

		let manifest = ManifestBuilder::build_local(&store, &[], ChecksumAlgorithm::Md5)
			.await
			.unwrap();

		assert_eq!(manifest.len(), 2);
		let a = manifest.get(&rel("a.txt")).unwrap();
		assert_eq!(a.name, "a.txt");
		assert_eq!(a.size, 5);
		assert_eq!(a.checksum.as_deref(), Some(hasher::hash_bytes(ChecksumAlgorithm::Md5, b"alpha").as_str()));
		assert!(a.remote_id.is_none());
	}

	#[tokio::test]
	async fn test_build_local_applies_filters() {
		let tmp = TempDir::new().unwrap();
		let store = LocalStore::new(tmp.path());
		store.write_atomic_bytes(&rel("keep.txt"), b"x").await.unwrap();
		store.write_atomic_bytes(&rel("drop.tmp"), b"y").await.unwrap();
		store.write_atomic_bytes(&rel(".hidden"), b"z").await.unwrap();

		let manifest =
			ManifestBuilder::build_local(&store, &default_sync_filter(), ChecksumAlgorithm::Md5)
				.await
				.unwrap();

		let paths: Vec<&str> = manifest.paths().map(|p| p.as_str()).collect();
		assert_eq!(paths, vec!["keep.txt"]);
	}

	#[tokio::test]
	async fn test_build_remote_inherits_md5() {
		let remote = MemoryRemoteStore::new();
		let ids = remote.ensure_folder_structure("App").await.unwrap();
		remote.put_file(&ids.sync, "doc.txt", b"content", 42);

		let manifest = ManifestBuilder::build_remote(
			&remote,
			&ids.sync,
			&[],
			ChecksumAlgorithm::Md5,
			&EncryptionMode::None,
		)
		.await
		.unwrap();

		let entry = manifest.get(&rel("doc.txt")).unwrap();
		assert_eq!(entry.checksum.as_deref(), Some(hasher::hash_bytes(ChecksumAlgorithm::Md5, b"content").as_str()));
		assert!(entry.remote_id.is_some());
		assert_eq!(entry.modified_ms, 42);
	}

	#[tokio::test]
	async fn test_build_remote_sha256_leaves_checksum_absent() {
		let remote = MemoryRemoteStore::new();
		let ids = remote.ensure_folder_structure("App").await.unwrap();
		remote.put_file(&ids.sync, "doc.txt", b"content", 42);

		let manifest = ManifestBuilder::build_remote(
			&remote,
			&ids.sync,
			&[],
			ChecksumAlgorithm::Sha256,
			&EncryptionMode::None,
		)
		.await
		.unwrap();

		assert!(manifest.get(&rel("doc.txt")).unwrap().checksum.is_none());
	}

	#[tokio::test]
	async fn test_build_remote_encrypted_adjusts_size_and_drops_md5() {
		let remote = MemoryRemoteStore::new();
		let ids = remote.ensure_folder_structure("App").await.unwrap();
		// A 100-byte plaintext stored as a passphrase envelope
		let ciphertext_len = 100 + crate::envelope::PASSPHRASE_OVERHEAD;
		remote.put_file(&ids.sync, "enc.bin", &vec![0u8; ciphertext_len], 42);

		let mode = EncryptionMode::Passphrase("a perfectly fine secret".to_string());
		let manifest = ManifestBuilder::build_remote(
			&remote,
			&ids.sync,
			&[],
			ChecksumAlgorithm::Md5,
			&mode,
		)
		.await
		.unwrap();

		let entry = manifest.get(&rel("enc.bin")).unwrap();
		assert_eq!(entry.size, 100);
		assert!(entry.checksum.is_none());
	}

	#[test]
	fn test_manifest_json_schema() {
		let mut manifest = Manifest::new(ChecksumAlgorithm::Md5);
		manifest.created_at_ms = 1000;
		manifest.insert(ManifestEntry {
			relative_path: rel("dir/a.txt"),
			name: "a.txt".into(),
			size: 3,
			modified_ms: 99,
			checksum: Some("abc".into()),
			remote_id: None,
		});

		let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&manifest).unwrap()).unwrap();
		assert_eq!(json["created_at_ms"], 1000);
		assert_eq!(json["entries"]["dir/a.txt"]["modified_time_ms"], 99);
		assert_eq!(json["entries"]["dir/a.txt"]["checksum"], "abc");
		assert!(json["entries"]["dir/a.txt"].get("remote_id").is_none());

		let back: Manifest = serde_json::from_value(json).unwrap();
		assert_eq!(back.files, manifest.files);
	}

	#[test]
	fn test_manifest_keys_are_sorted() {
		let mut manifest = Manifest::new(ChecksumAlgorithm::Md5);
		for p in ["z.txt", "a.txt", "m/x.txt"] {
			manifest.insert(ManifestEntry {
				relative_path: rel(p),
				name: rel(p).name().to_string(),
				size: 0,
				modified_ms: 0,
				checksum: None,
				remote_id: None,
			});
		}
		let paths: Vec<&str> = manifest.paths().map(|p| p.as_str()).collect();
		assert_eq!(paths, vec!["a.txt", "m/x.txt", "z.txt"]);
	}
}

// vim: ts=4
