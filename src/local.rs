//! Local file store
//!
//! All local filesystem access goes through a `LocalStore` rooted at the
//! sync directory. Writes are atomic: content lands in a temp sibling
//! first and is renamed into place, so an interrupted transfer can never
//! leave a half-written file for the next manifest scan to pick up.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::LocalError;
use crate::filter::{accept_all, FileFilter, FilterEntry};
use crate::relpath::RelPath;

/// Copy buffer for atomic writes
const WRITE_BUF_SIZE: usize = 64 * 1024;

/// A file or directory found under the store root
#[derive(Debug, Clone)]
pub struct LocalEntry {
	pub path: RelPath,
	pub name: String,
	pub size: u64,
	pub modified_ms: i64,
	pub is_dir: bool,
	pub is_hidden: bool,
}

/// Filesystem access rooted at a sync directory
#[derive(Debug, Clone)]
pub struct LocalStore {
	root: PathBuf,
}

impl LocalStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		LocalStore { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn resolve(&self, rel: &RelPath) -> PathBuf {
		rel.to_fs_path(&self.root)
	}

	/// List files under `rel_dir` (or the root when None) that pass
	/// every filter.
	///
	/// Only regular files are returned; directories are traversed when
	/// `recursive` is set and symlinks are skipped. The result is sorted
	/// by relative path.
	pub async fn list(
		&self,
		rel_dir: Option<&RelPath>,
		filters: &[FileFilter],
		recursive: bool,
	) -> Result<Vec<LocalEntry>, LocalError> {
		let start = match rel_dir {
			Some(rel) => self.resolve(rel),
			None => self.root.clone(),
		};
		if !start.exists() {
			return Ok(Vec::new());
		}

		let mut entries = Vec::new();
		let mut pending = vec![start];
		while let Some(dir) = pending.pop() {
			let mut read_dir = fs::read_dir(&dir).await?;
			while let Some(dirent) = read_dir.next_entry().await? {
				let file_type = dirent.file_type().await?;
				if file_type.is_symlink() {
					continue;
				}
				if file_type.is_dir() {
					if recursive {
						pending.push(dirent.path());
					}
					continue;
				}
				if let Some(entry) = self.entry_for(&dirent.path()).await? {
					if accept_all(filters, &FilterEntry::new(&entry.path, entry.size)) {
						entries.push(entry);
					}
				}
			}
		}
		entries.sort_by(|a, b| a.path.cmp(&b.path));
		Ok(entries)
	}

	/// Stat a single path; None when it does not exist.
	pub async fn stat(&self, rel: &RelPath) -> Result<Option<LocalEntry>, LocalError> {
		let abs = self.resolve(rel);
		if !abs.exists() {
			return Ok(None);
		}
		self.entry_for(&abs).await
	}

	async fn entry_for(&self, abs: &Path) -> Result<Option<LocalEntry>, LocalError> {
		let meta = fs::metadata(abs).await?;
		let rel = match abs.strip_prefix(&self.root) {
			Ok(stripped) => stripped.to_string_lossy().into_owned(),
			Err(_) => {
				return Err(LocalError::PathInvalid { path: abs.display().to_string() });
			}
		};
		let path = RelPath::new(&rel)?;
		let modified_ms = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
			.map(|d| d.as_millis() as i64)
			.unwrap_or(0);
		let is_hidden = path.segments().any(|s| s.starts_with('.'));
		Ok(Some(LocalEntry {
			name: path.name().to_string(),
			size: meta.len(),
			modified_ms,
			is_dir: meta.is_dir(),
			is_hidden,
			path,
		}))
	}

	/// Open a file for streaming reads.
	pub async fn read(&self, rel: &RelPath) -> Result<fs::File, LocalError> {
		Ok(fs::File::open(self.resolve(rel)).await?)
	}

	/// Read a whole file into memory.
	pub async fn read_bytes(&self, rel: &RelPath) -> Result<Vec<u8>, LocalError> {
		Ok(fs::read(self.resolve(rel)).await?)
	}

	/// Stream content into `rel`, atomically.
	///
	/// Bytes go to a `.skysync-tmp-*` sibling which is renamed over the
	/// target once fully written. Returns the number of bytes written.
	pub async fn write_atomic(
		&self,
		rel: &RelPath,
		reader: &mut (dyn AsyncRead + Unpin + Send),
	) -> Result<u64, LocalError> {
		let target = self.resolve(rel);
		if let Some(parent) = target.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
		}

		let tmp = match target.parent() {
			Some(parent) => parent.join(format!(".skysync-tmp-{}", Uuid::new_v4())),
			None => return Err(LocalError::PathInvalid { path: rel.as_str().to_string() }),
		};

		let result = self.copy_to_temp(&tmp, rel, reader).await;
		match result {
			Ok(written) => {
				fs::rename(&tmp, &target)
					.await
					.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
				debug!(path = %rel, bytes = written, "wrote file atomically");
				Ok(written)
			}
			Err(e) => {
				// Best effort temp cleanup; the real error wins
				let _ = fs::remove_file(&tmp).await;
				Err(e)
			}
		}
	}

	async fn copy_to_temp(
		&self,
		tmp: &Path,
		rel: &RelPath,
		reader: &mut (dyn AsyncRead + Unpin + Send),
	) -> Result<u64, LocalError> {
		use tokio::io::AsyncReadExt;

		let mut file =
			fs::File::create(tmp).await.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
		let mut buf = vec![0u8; WRITE_BUF_SIZE];
		let mut written: u64 = 0;
		loop {
			let n = reader.read(&mut buf).await?;
			if n == 0 {
				break;
			}
			file.write_all(&buf[..n])
				.await
				.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
			written += n as u64;
		}
		file.flush().await.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
		file.sync_all().await.map_err(|e| LocalError::write_error(rel.as_str(), e))?;
		Ok(written)
	}

	/// Write a byte buffer atomically.
	pub async fn write_atomic_bytes(&self, rel: &RelPath, bytes: &[u8]) -> Result<(), LocalError> {
		let mut cursor = std::io::Cursor::new(bytes);
		self.write_atomic(rel, &mut cursor).await?;
		Ok(())
	}

	/// Delete a file and prune any parent directories it leaves empty.
	pub async fn delete(&self, rel: &RelPath) -> Result<(), LocalError> {
		let abs = self.resolve(rel);
		fs::remove_file(&abs).await?;
		debug!(path = %rel, "deleted local file");

		let mut parent = rel.parent();
		while let Some(dir) = parent {
			let abs_dir = self.resolve(&dir);
			match fs::remove_dir(&abs_dir).await {
				Ok(()) => parent = dir.parent(),
				// Not empty (or already gone): stop pruning
				Err(_) => break,
			}
		}
		Ok(())
	}

	/// Rename within the store.
	pub async fn rename(&self, from: &RelPath, to: &RelPath) -> Result<(), LocalError> {
		let target = self.resolve(to);
		if let Some(parent) = target.parent() {
			fs::create_dir_all(parent).await?;
		}
		Ok(fs::rename(self.resolve(from), target).await?)
	}

	/// Create a directory (and parents) under the root.
	pub async fn mkdirs(&self, rel_dir: &RelPath) -> Result<(), LocalError> {
		Ok(fs::create_dir_all(self.resolve(rel_dir)).await?)
	}

	/// Remove stray temp files left behind by an interrupted run.
	pub async fn clean_temp_files(&self) -> Result<usize, LocalError> {
		let mut removed = 0;
		let mut pending = vec![self.root.clone()];
		while let Some(dir) = pending.pop() {
			let mut read_dir = match fs::read_dir(&dir).await {
				Ok(rd) => rd,
				Err(_) => continue,
			};
			while let Some(dirent) = read_dir.next_entry().await? {
				let file_type = dirent.file_type().await?;
				if file_type.is_dir() {
					pending.push(dirent.path());
				} else if dirent.file_name().to_string_lossy().starts_with(".skysync-tmp-") {
					fs::remove_file(dirent.path()).await?;
					removed += 1;
				}
			}
		}
		Ok(removed)
	}
}


// vim: ts=4
