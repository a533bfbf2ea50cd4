//! Remote store interface
//!
//! `RemoteStore` is the capability surface the engine consumes for the
//! cloud drive: a folder hierarchy with file CRUD and recursive listing.
//! The production implementation wraps the drive HTTP client (with the
//! auth provider injected into it, never the other way around); the
//! in-memory implementation below serves tests and doubles as executable
//! documentation of the contract.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RemoteError;
use crate::hasher::{hash_bytes, ChecksumAlgorithm};
use crate::relpath::RelPath;

/// Ids of the well-known application folders
#[derive(Debug, Clone)]
pub struct FolderIds {
	/// `/<app_folder_name>`
	pub root: String,
	/// `/<app_folder_name>/sync` - the user-visible synced tree
	pub sync: String,
	/// `/<app_folder_name>/backups` - opaque backup archives
	pub backups: String,
}

/// A file in the remote tree
#[derive(Debug, Clone)]
pub struct RemoteEntry {
	/// Opaque identifier assigned by the store
	pub id: String,
	/// Path relative to the listed folder
	pub path: RelPath,
	pub name: String,
	pub size: u64,
	pub modified_ms: i64,
	/// Content MD5 when the service supplies one
	pub md5: Option<String>,
}

/// Outcome of an upload
#[derive(Debug, Clone)]
pub struct UploadResult {
	pub id: String,
	pub size: u64,
}

/// Capability interface over the cloud drive
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Create (or find) the application folder layout, returning its ids.
	async fn ensure_folder_structure(&self, root_name: &str) -> Result<FolderIds, RemoteError>;

	/// Create (or find) a folder named `name` under `parent_id`.
	async fn ensure_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError>;

	/// List every file below `folder_id`, with paths relative to it.
	async fn list_recursive(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

	/// Upload a file. `existing_id` replaces that file's content in
	/// place; otherwise a file named `name` is created under `parent_id`
	/// (replacing a previous file of the same name). `modified_ms` is
	/// preserved as the entry's modification time.
	async fn upload(
		&self,
		content: &mut (dyn AsyncRead + Send + Unpin),
		parent_id: &str,
		name: &str,
		modified_ms: i64,
		existing_id: Option<&str>,
	) -> Result<UploadResult, RemoteError>;

	/// Stream a file's content into `sink`. Returns the byte count.
	async fn download(
		&self,
		remote_id: &str,
		sink: &mut (dyn AsyncWrite + Send + Unpin),
	) -> Result<u64, RemoteError>;

	/// Delete a file or folder (folders recursively).
	async fn delete(&self, remote_id: &str) -> Result<(), RemoteError>;

	/// Find a direct child of `parent_id` by exact name.
	async fn find_by_name(
		&self,
		name: &str,
		parent_id: &str,
	) -> Result<Option<RemoteEntry>, RemoteError>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
	id: String,
	parent_id: String,
	name: String,
	/// None for folders
	data: Option<FileData>,
}

#[derive(Debug, Clone)]
struct FileData {
	bytes: Vec<u8>,
	modified_ms: i64,
	md5: String,
}

/// Which operation a scripted fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
	Any,
	Folder,
	List,
	Upload,
	Download,
	Delete,
}

#[derive(Debug, Default)]
struct Inner {
	nodes: BTreeMap<String, Node>,
	next_id: u64,
	faults: VecDeque<(FaultOp, RemoteError)>,
	uploads: usize,
	downloads: usize,
	deletes: usize,
}

/// `RemoteStore` backed by an in-memory tree.
///
/// Supports scripted fault injection: queued errors are returned by the
/// next operations, in order, before any real work happens. Used by the
/// engine's test suite to exercise retry and partial-failure paths.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
	inner: Mutex<Inner>,
}

impl MemoryRemoteStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue an error to be returned by the next remote operation.
	pub fn inject_fault(&self, error: RemoteError) {
		self.lock().faults.push_back((FaultOp::Any, error));
	}

	/// Queue an error to be returned by the next operation of one kind.
	pub fn inject_fault_on(&self, op: FaultOp, error: RemoteError) {
		self.lock().faults.push_back((op, error));
	}

	/// Number of completed (non-faulted) uploads.
	pub fn upload_count(&self) -> usize {
		self.lock().uploads
	}

	/// Number of completed (non-faulted) downloads.
	pub fn download_count(&self) -> usize {
		self.lock().downloads
	}

	/// Number of completed (non-faulted) deletes.
	pub fn delete_count(&self) -> usize {
		self.lock().deletes
	}

	/// Test helper: create a file (and intermediate folders) under a folder.
	pub fn put_file(&self, folder_id: &str, path: &str, data: &[u8], modified_ms: i64) -> String {
		let rel = RelPath::new(path).expect("valid path");
		let mut inner = self.lock();
		let mut parent = folder_id.to_string();
		let segments: Vec<&str> = rel.segments().collect();
		for dir in &segments[..segments.len() - 1] {
			parent = inner.folder_under(&parent, dir);
		}
		inner.put_file_node(&parent, segments[segments.len() - 1], data, modified_ms)
	}

	/// Test helper: a file's content by path, if present.
	pub fn file_bytes(&self, folder_id: &str, path: &str) -> Option<Vec<u8>> {
		let rel = RelPath::new(path).ok()?;
		let inner = self.lock();
		let node = inner.resolve_path(folder_id, &rel)?;
		node.data.as_ref().map(|d| d.bytes.clone())
	}

	/// Test helper: paths of every file under a folder.
	pub fn file_paths(&self, folder_id: &str) -> Vec<String> {
		let inner = self.lock();
		let mut out: Vec<String> =
			inner.files_below(folder_id).into_iter().map(|(p, _)| p.as_str().to_string()).collect();
		out.sort();
		out
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn take_fault(&self, op: FaultOp) -> Result<(), RemoteError> {
		let mut inner = self.lock();
		let idx = inner
			.faults
			.iter()
			.position(|(fault_op, _)| *fault_op == FaultOp::Any || *fault_op == op);
		match idx.and_then(|i| inner.faults.remove(i)) {
			Some((_, err)) => Err(err),
			None => Ok(()),
		}
	}
}

impl Inner {
	fn alloc_id(&mut self) -> String {
		self.next_id += 1;
		format!("n{}", self.next_id)
	}

	fn child_by_name(&self, parent_id: &str, name: &str) -> Option<&Node> {
		self.nodes.values().find(|n| n.parent_id == parent_id && n.name == name)
	}

	fn folder_under(&mut self, parent_id: &str, name: &str) -> String {
		if let Some(node) = self.child_by_name(parent_id, name) {
			if node.data.is_none() {
				return node.id.clone();
			}
		}
		let id = self.alloc_id();
		self.nodes.insert(
			id.clone(),
			Node { id: id.clone(), parent_id: parent_id.to_string(), name: name.to_string(), data: None },
		);
		id
	}

	fn put_file_node(&mut self, parent_id: &str, name: &str, data: &[u8], modified_ms: i64) -> String {
		let md5 = hash_bytes(ChecksumAlgorithm::Md5, data);
		let file_data = FileData { bytes: data.to_vec(), modified_ms, md5 };
		if let Some(existing) = self
			.nodes
			.values()
			.find(|n| n.parent_id == parent_id && n.name == name && n.data.is_some())
			.map(|n| n.id.clone())
		{
			if let Some(node) = self.nodes.get_mut(&existing) {
				node.data = Some(file_data);
			}
			return existing;
		}
		let id = self.alloc_id();
		self.nodes.insert(
			id.clone(),
			Node {
				id: id.clone(),
				parent_id: parent_id.to_string(),
				name: name.to_string(),
				data: Some(file_data),
			},
		);
		id
	}

	fn resolve_path(&self, folder_id: &str, rel: &RelPath) -> Option<&Node> {
		let mut current = folder_id.to_string();
		let segments: Vec<&str> = rel.segments().collect();
		for (idx, segment) in segments.iter().enumerate() {
			let node = self.child_by_name(&current, segment)?;
			if idx == segments.len() - 1 {
				return self.nodes.get(&node.id);
			}
			if node.data.is_some() {
				return None;
			}
			current = node.id.clone();
		}
		None
	}

	/// Every file below a folder, with relative paths.
	fn files_below(&self, folder_id: &str) -> Vec<(RelPath, &Node)> {
		let mut out = Vec::new();
		let mut pending: Vec<(String, String)> = vec![(folder_id.to_string(), String::new())];
		while let Some((id, prefix)) = pending.pop() {
			for node in self.nodes.values().filter(|n| n.parent_id == id) {
				let path = if prefix.is_empty() {
					node.name.clone()
				} else {
					format!("{}/{}", prefix, node.name)
				};
				if node.data.is_some() {
					if let Ok(rel) = RelPath::new(&path) {
						out.push((rel, node));
					}
				} else {
					pending.push((node.id.clone(), path));
				}
			}
		}
		out.sort_by(|a, b| a.0.cmp(&b.0));
		out
	}

	fn remove_recursive(&mut self, id: &str) {
		let children: Vec<String> =
			self.nodes.values().filter(|n| n.parent_id == id).map(|n| n.id.clone()).collect();
		for child in children {
			self.remove_recursive(&child);
		}
		self.nodes.remove(id);
	}
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
	async fn ensure_folder_structure(&self, root_name: &str) -> Result<FolderIds, RemoteError> {
		self.take_fault(FaultOp::Folder)?;
		let mut inner = self.lock();
		let root = inner.folder_under("", root_name);
		let sync = inner.folder_under(&root, "sync");
		let backups = inner.folder_under(&root, "backups");
		Ok(FolderIds { root, sync, backups })
	}

	async fn ensure_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError> {
		self.take_fault(FaultOp::Folder)?;
		let mut inner = self.lock();
		if !inner.nodes.contains_key(parent_id) && !parent_id.is_empty() {
			return Err(RemoteError::NotFound { what: format!("folder {}", parent_id) });
		}
		Ok(inner.folder_under(parent_id, name))
	}

	async fn list_recursive(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
		self.take_fault(FaultOp::List)?;
		let inner = self.lock();
		Ok(inner
			.files_below(folder_id)
			.into_iter()
			.map(|(path, node)| {
				let data = node.data.as_ref().expect("files_below yields files");
				RemoteEntry {
					id: node.id.clone(),
					name: node.name.clone(),
					size: data.bytes.len() as u64,
					modified_ms: data.modified_ms,
					md5: Some(data.md5.clone()),
					path,
				}
			})
			.collect())
	}

	async fn upload(
		&self,
		content: &mut (dyn AsyncRead + Send + Unpin),
		parent_id: &str,
		name: &str,
		modified_ms: i64,
		existing_id: Option<&str>,
	) -> Result<UploadResult, RemoteError> {
		self.take_fault(FaultOp::Upload)?;
		let mut bytes = Vec::new();
		content
			.read_to_end(&mut bytes)
			.await
			.map_err(|e| RemoteError::Transport { message: e.to_string() })?;

		let mut inner = self.lock();
		let size = bytes.len() as u64;
		let id = match existing_id {
			Some(id) => {
				let node = inner
					.nodes
					.get_mut(id)
					.ok_or_else(|| RemoteError::NotFound { what: format!("file {}", id) })?;
				let md5 = hash_bytes(ChecksumAlgorithm::Md5, &bytes);
				node.data = Some(FileData { bytes, modified_ms, md5 });
				id.to_string()
			}
			None => inner.put_file_node(parent_id, name, &bytes, modified_ms),
		};
		inner.uploads += 1;
		Ok(UploadResult { id, size })
	}

	async fn download(
		&self,
		remote_id: &str,
		sink: &mut (dyn AsyncWrite + Send + Unpin),
	) -> Result<u64, RemoteError> {
		self.take_fault(FaultOp::Download)?;
		let bytes = {
			let mut inner = self.lock();
			let node = inner
				.nodes
				.get(remote_id)
				.ok_or_else(|| RemoteError::NotFound { what: format!("file {}", remote_id) })?;
			let data = node
				.data
				.as_ref()
				.ok_or_else(|| RemoteError::Other { message: "cannot download a folder".into() })?;
			let bytes = data.bytes.clone();
			inner.downloads += 1;
			bytes
		};
		sink.write_all(&bytes)
			.await
			.map_err(|e| RemoteError::Transport { message: e.to_string() })?;
		Ok(bytes.len() as u64)
	}

	async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
		self.take_fault(FaultOp::Delete)?;
		let mut inner = self.lock();
		if !inner.nodes.contains_key(remote_id) {
			return Err(RemoteError::NotFound { what: format!("file {}", remote_id) });
		}
		inner.remove_recursive(remote_id);
		inner.deletes += 1;
		Ok(())
	}

	async fn find_by_name(
		&self,
		name: &str,
		parent_id: &str,
	) -> Result<Option<RemoteEntry>, RemoteError> {
		self.take_fault(FaultOp::List)?;
		let inner = self.lock();
		Ok(inner.child_by_name(parent_id, name).map(|node| {
			let (size, modified_ms, md5) = match &node.data {
				Some(d) => (d.bytes.len() as u64, d.modified_ms, Some(d.md5.clone())),
				None => (0, 0, None),
			};
			RemoteEntry {
				id: node.id.clone(),
				path: RelPath::new(&node.name).expect("node names are valid"),
				name: node.name.clone(),
				size,
				modified_ms,
				md5,
			}
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_folder_structure_is_idempotent() {
		let store = MemoryRemoteStore::new();
		let a = store.ensure_folder_structure("MyApp").await.unwrap();
		let b = store.ensure_folder_structure("MyApp").await.unwrap();
		assert_eq!(a.root, b.root);
		assert_eq!(a.sync, b.sync);
		assert_eq!(a.backups, b.backups);
	}

	#[tokio::test]
	async fn test_upload_download_round_trip() {
		let store = MemoryRemoteStore::new();
		let ids = store.ensure_folder_structure("App").await.unwrap();

		let mut content = std::io::Cursor::new(b"hello".to_vec());
		let result = store.upload(&mut content, &ids.sync, "a.txt", 1000, None).await.unwrap();
		assert_eq!(result.size, 5);

		let mut sink = Vec::new();
		let n = store.download(&result.id, &mut sink).await.unwrap();
		assert_eq!(n, 5);
		assert_eq!(sink, b"hello");
	}

	#[tokio::test]
	async fn test_upload_replaces_by_name() {
		let store = MemoryRemoteStore::new();
		let ids = store.ensure_folder_structure("App").await.unwrap();

		let mut c1 = std::io::Cursor::new(b"v1".to_vec());
		let r1 = store.upload(&mut c1, &ids.sync, "a.txt", 1, None).await.unwrap();
		let mut c2 = std::io::Cursor::new(b"v2".to_vec());
		let r2 = store.upload(&mut c2, &ids.sync, "a.txt", 2, None).await.unwrap();

		assert_eq!(r1.id, r2.id);
		let listing = store.list_recursive(&ids.sync).await.unwrap();
		assert_eq!(listing.len(), 1);
		assert_eq!(listing[0].size, 2);
	}

	#[tokio::test]
	async fn test_list_recursive_paths_and_md5() {
		let store = MemoryRemoteStore::new();
		let ids = store.ensure_folder_structure("App").await.unwrap();
		store.put_file(&ids.sync, "top.txt", b"1", 10);
		store.put_file(&ids.sync, "dir/nested.txt", b"22", 20);

		let listing = store.list_recursive(&ids.sync).await.unwrap();
		let paths: Vec<&str> = listing.iter().map(|e| e.path.as_str()).collect();
		assert_eq!(paths, vec!["dir/nested.txt", "top.txt"]);
		assert_eq!(listing[1].md5.as_deref(), Some(hash_bytes(ChecksumAlgorithm::Md5, b"1").as_str()));
	}

	#[tokio::test]
	async fn test_delete_folder_is_recursive() {
		let store = MemoryRemoteStore::new();
		let ids = store.ensure_folder_structure("App").await.unwrap();
		store.put_file(&ids.sync, "dir/a.txt", b"x", 1);
		let dir_id = {
			let entry = store.find_by_name("dir", &ids.sync).await.unwrap().unwrap();
			entry.id
		};
		store.delete(&dir_id).await.unwrap();
		assert!(store.list_recursive(&ids.sync).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_fault_injection_order() {
		let store = MemoryRemoteStore::new();
		store.inject_fault(RemoteError::ServiceUnavailable);
		store.inject_fault(RemoteError::RateLimited { retry_after_ms: Some(10) });

		assert!(matches!(
			store.ensure_folder_structure("App").await,
			Err(RemoteError::ServiceUnavailable)
		));
		assert!(matches!(
			store.ensure_folder_structure("App").await,
			Err(RemoteError::RateLimited { .. })
		));
		assert!(store.ensure_folder_structure("App").await.is_ok());
	}

	#[tokio::test]
	async fn test_download_missing_is_not_found() {
		let store = MemoryRemoteStore::new();
		let mut sink = Vec::new();
		assert!(matches!(
			store.download("nope", &mut sink).await,
			Err(RemoteError::NotFound { .. })
		));
	}
}

// vim: ts=4
