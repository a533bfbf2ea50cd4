//! Resume state persistence
//!
//! An interrupted sync leaves a `sync_resume.json` behind; the next run
//! picks it up, skips the actions that already completed, and clears it
//! once the run finishes cleanly. Checkpoints are throttled: every 16
//! completed actions or every 2 seconds, whichever comes first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::error::StateError;
use crate::modes::SyncMode;
use crate::planner::SyncAction;
use crate::relpath::RelPath;

/// Resume file name under the state root
const RESUME_FILE: &str = "sync_resume.json";

/// Checkpoint at least this often while actions complete
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(2);

/// ... or after this many completed actions
const CHECKPOINT_EVERY: usize = 16;

/// Durable record of an in-flight sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeInfo {
	pub sync_id: Uuid,
	pub started_at_ms: i64,
	pub mode: SyncMode,
	pub completed_paths: BTreeSet<RelPath>,
	pub last_checkpoint_ms: i64,
	pub pending_plan: Vec<SyncAction>,
}

impl ResumeInfo {
	pub fn new(mode: SyncMode, started_at_ms: i64, pending_plan: Vec<SyncAction>) -> Self {
		ResumeInfo {
			sync_id: Uuid::new_v4(),
			started_at_ms,
			mode,
			completed_paths: BTreeSet::new(),
			last_checkpoint_ms: started_at_ms,
			pending_plan,
		}
	}

	/// Record an action as done.
	pub fn mark_completed(&mut self, path: &RelPath) {
		self.completed_paths.insert(path.clone());
	}

	pub fn is_completed(&self, path: &RelPath) -> bool {
		self.completed_paths.contains(path)
	}
}

/// Loads and saves the resume file
#[derive(Debug, Clone)]
pub struct ResumeStore {
	state_dir: PathBuf,
}

impl ResumeStore {
	pub fn new(state_root: impl Into<PathBuf>) -> Self {
		ResumeStore { state_dir: state_root.into() }
	}

	pub fn path(&self) -> PathBuf {
		self.state_dir.join(RESUME_FILE)
	}

	/// Load resume state if a file exists.
	pub async fn load(&self) -> Result<Option<ResumeInfo>, StateError> {
		let path = self.path();
		if !path.exists() {
			return Ok(None);
		}
		let contents = tokio::fs::read_to_string(&path)
			.await
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;
		let info = serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
			message: format!("failed to parse resume file: {}", e),
		})?;
		Ok(Some(info))
	}

	/// Write resume state, creating the state directory as needed.
	pub async fn save(&self, info: &ResumeInfo) -> Result<(), StateError> {
		if !self.state_dir.exists() {
			tokio::fs::create_dir_all(&self.state_dir)
				.await
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		let json = serde_json::to_string(info)
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		tokio::fs::write(self.path(), json)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		debug!(sync_id = %info.sync_id, completed = info.completed_paths.len(), "checkpointed resume state");
		Ok(())
	}

	/// Remove the resume file after a clean finish.
	pub async fn clear(&self) -> Result<(), StateError> {
		let path = self.path();
		if path.exists() {
			tokio::fs::remove_file(&path)
				.await
				.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		}
		Ok(())
	}

	pub fn state_dir(&self) -> &Path {
		&self.state_dir
	}
}

/// Decides when a checkpoint is due
#[derive(Debug)]
pub struct Checkpointer {
	last_flush: Instant,
	completed_since: usize,
}

impl Checkpointer {
	pub fn new() -> Self {
		Checkpointer { last_flush: Instant::now(), completed_since: 0 }
	}

	/// Note a completed action; returns true when state should be saved.
	pub fn note_completed(&mut self) -> bool {
		self.completed_since += 1;
		if self.completed_since >= CHECKPOINT_EVERY
			|| self.last_flush.elapsed() >= CHECKPOINT_INTERVAL
		{
			self.last_flush = Instant::now();
			self.completed_since = 0;
			true
		} else {
			false
		}
	}
}

impl Default for Checkpointer {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
