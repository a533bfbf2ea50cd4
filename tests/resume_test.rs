//! Cancellation and resume behaviour

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};

use skysync::auth::StaticAuthProvider;
use skysync::config::SyncConfig;
use skysync::engine::{CancelToken, SyncEngine};
use skysync::error::RemoteError;
use skysync::local::LocalStore;
use skysync::modes::SyncMode;
use skysync::remote::{FolderIds, MemoryRemoteStore, RemoteEntry, RemoteStore, UploadResult};
use skysync::retry::RetryPolicy;
use skysync::state::{ResumeInfo, ResumeStore};
use skysync::types::SyncResult;

/// Delegating store that fires a cancel token after N successful uploads
struct CancelAfterUploads {
	inner: Arc<MemoryRemoteStore>,
	cancel_after: usize,
	uploads: AtomicUsize,
	token: Mutex<Option<CancelToken>>,
}

impl CancelAfterUploads {
	fn new(inner: Arc<MemoryRemoteStore>, cancel_after: usize) -> Self {
		CancelAfterUploads {
			inner,
			cancel_after,
			uploads: AtomicUsize::new(0),
			token: Mutex::new(None),
		}
	}

	fn arm(&self, token: CancelToken) {
		*self.token.lock().unwrap() = Some(token);
	}
}

#[async_trait]
impl RemoteStore for CancelAfterUploads {
	async fn ensure_folder_structure(&self, root_name: &str) -> Result<FolderIds, RemoteError> {
		self.inner.ensure_folder_structure(root_name).await
	}

	async fn ensure_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError> {
		self.inner.ensure_folder(name, parent_id).await
	}

	async fn list_recursive(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
		self.inner.list_recursive(folder_id).await
	}

	async fn upload(
		&self,
		content: &mut (dyn AsyncRead + Send + Unpin),
		parent_id: &str,
		name: &str,
		modified_ms: i64,
		existing_id: Option<&str>,
	) -> Result<UploadResult, RemoteError> {
		let result = self.inner.upload(content, parent_id, name, modified_ms, existing_id).await?;
		let done = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
		if done == self.cancel_after {
			if let Some(token) = self.token.lock().unwrap().as_ref() {
				token.cancel();
			}
		}
		Ok(result)
	}

	async fn download(
		&self,
		remote_id: &str,
		sink: &mut (dyn AsyncWrite + Send + Unpin),
	) -> Result<u64, RemoteError> {
		self.inner.download(remote_id, sink).await
	}

	async fn delete(&self, remote_id: &str) -> Result<(), RemoteError> {
		self.inner.delete(remote_id).await
	}

	async fn find_by_name(
		&self,
		name: &str,
		parent_id: &str,
	) -> Result<Option<RemoteEntry>, RemoteError> {
		self.inner.find_by_name(name, parent_id).await
	}
}

fn fast_config(state_dir: PathBuf) -> SyncConfig {
	SyncConfig::builder("App")
		.state_dir(state_dir)
		.retry_policy(RetryPolicy { initial_delay_ms: 1, max_delay_ms: 5, ..RetryPolicy::default() })
		.build()
		.unwrap()
}

fn write_local(root: &std::path::Path, path: &str, content: &[u8]) {
	let abs = root.join(path);
	std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
	std::fs::write(abs, content).unwrap();
}

#[tokio::test]
async fn test_cancel_mid_sync_then_resume_completes_the_rest() {
	let tmp = TempDir::new().unwrap();
	let local_root = tmp.path().join("local");
	std::fs::create_dir_all(&local_root).unwrap();
	for i in 0..5 {
		write_local(&local_root, &format!("file{}.txt", i), format!("content{}", i).as_bytes());
	}

	let memory = Arc::new(MemoryRemoteStore::new());
	let ids = memory.ensure_folder_structure("App").await.unwrap();
	let cancelling = Arc::new(CancelAfterUploads::new(memory.clone(), 2));

	let config = fast_config(tmp.path().join("state"));
	let remote_dyn: Arc<dyn RemoteStore> = cancelling.clone();
	let engine = SyncEngine::new(
		config.clone(),
		LocalStore::new(&local_root),
		remote_dyn,
		Arc::new(StaticAuthProvider::signed_in("token")),
	)
	.unwrap();
	cancelling.arm(engine.cancel_token());

	let result = engine.sync(config.options(SyncMode::UploadOnly)).await;
	assert!(matches!(result, SyncResult::Cancelled), "got {}", result);

	// Two files made it before the cancel; resume state records them
	assert_eq!(memory.upload_count(), 2);
	let resume = ResumeStore::new(tmp.path().join("state")).load().await.unwrap().unwrap();
	assert_eq!(resume.mode, SyncMode::UploadOnly);
	assert_eq!(resume.completed_paths.len(), 2);

	// A fresh run finishes the remaining files, without re-uploading
	// the completed ones
	let result = engine.sync(config.options(SyncMode::UploadOnly)).await;
	assert!(result.is_success(), "got {}", result);

	assert_eq!(
		memory.file_paths(&ids.sync),
		vec!["file0.txt", "file1.txt", "file2.txt", "file3.txt", "file4.txt"]
	);
	assert_eq!(memory.upload_count(), 5);

	// Clean finish clears the resume file
	assert!(ResumeStore::new(tmp.path().join("state")).load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_skips_recorded_paths() {
	let tmp = TempDir::new().unwrap();
	let local_root = tmp.path().join("local");
	std::fs::create_dir_all(&local_root).unwrap();
	write_local(&local_root, "done.txt", b"already handled");
	write_local(&local_root, "todo.txt", b"new");

	// Pretend an interrupted run already processed done.txt
	let store = ResumeStore::new(tmp.path().join("state"));
	let mut info = ResumeInfo::new(SyncMode::UploadOnly, 0, vec![]);
	info.mark_completed(&skysync::relpath::RelPath::new("done.txt").unwrap());
	store.save(&info).await.unwrap();

	let memory = Arc::new(MemoryRemoteStore::new());
	let ids = memory.ensure_folder_structure("App").await.unwrap();
	let config = fast_config(tmp.path().join("state"));
	let remote_dyn: Arc<dyn RemoteStore> = memory.clone();
	let engine = SyncEngine::new(
		config.clone(),
		LocalStore::new(&local_root),
		remote_dyn,
		Arc::new(StaticAuthProvider::signed_in("token")),
	)
	.unwrap();

	let result = engine.sync(config.options(SyncMode::UploadOnly)).await;
	match result {
		SyncResult::Success { uploaded, skipped, .. } => {
			assert_eq!(uploaded, 1);
			assert_eq!(skipped, 1);
		}
		other => panic!("expected success, got {}", other),
	}
	assert_eq!(memory.file_paths(&ids.sync), vec!["todo.txt"]);
}

#[tokio::test]
async fn test_resume_for_other_mode_is_ignored() {
	let tmp = TempDir::new().unwrap();
	let local_root = tmp.path().join("local");
	std::fs::create_dir_all(&local_root).unwrap();
	write_local(&local_root, "a.txt", b"x");

	// Resume state from a download-only run must not mask uploads
	let store = ResumeStore::new(tmp.path().join("state"));
	let mut info = ResumeInfo::new(SyncMode::DownloadOnly, 0, vec![]);
	info.mark_completed(&skysync::relpath::RelPath::new("a.txt").unwrap());
	store.save(&info).await.unwrap();

	let memory = Arc::new(MemoryRemoteStore::new());
	let ids = memory.ensure_folder_structure("App").await.unwrap();
	let config = fast_config(tmp.path().join("state"));
	let remote_dyn: Arc<dyn RemoteStore> = memory.clone();
	let engine = SyncEngine::new(
		config.clone(),
		LocalStore::new(&local_root),
		remote_dyn,
		Arc::new(StaticAuthProvider::signed_in("token")),
	)
	.unwrap();

	let result = engine.sync(config.options(SyncMode::UploadOnly)).await;
	assert!(result.is_success());
	assert_eq!(memory.file_paths(&ids.sync), vec!["a.txt"]);
}

#[tokio::test]
async fn test_second_sync_on_busy_engine_fails_fast() {
	let tmp = TempDir::new().unwrap();
	let local_root = tmp.path().join("local");
	std::fs::create_dir_all(&local_root).unwrap();
	for i in 0..20 {
		write_local(&local_root, &format!("f{:02}.txt", i), b"data");
	}

	let memory = Arc::new(MemoryRemoteStore::new());
	memory.ensure_folder_structure("App").await.unwrap();
	let config = fast_config(tmp.path().join("state"));
	let remote_dyn: Arc<dyn RemoteStore> = memory.clone();
	let engine = Arc::new(
		SyncEngine::new(
			config.clone(),
			LocalStore::new(&local_root),
			remote_dyn,
			Arc::new(StaticAuthProvider::signed_in("token")),
		)
		.unwrap(),
	);

	let first = {
		let engine = Arc::clone(&engine);
		let options = config.options(SyncMode::UploadOnly);
		tokio::spawn(async move { engine.sync(options).await })
	};

	// The overlapping call either catches the engine mid-run and is
	// rejected, or (if the spawned run already finished) finds nothing
	// left to do
	let second = engine.sync(config.options(SyncMode::UploadOnly)).await;
	if let SyncResult::Error { message } = &second {
		assert!(message.contains("already in progress"), "got {}", message);
	}
	let first = first.await.unwrap();
	assert!(first.is_success(), "got {}", first);
}

// vim: ts=4
