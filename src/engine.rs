//! Sync engine orchestration
//!
//! `SyncEngine` ties the subsystems together: it builds both manifests,
//! plans the diff, resolves conflicts, and executes the plan with retry,
//! timeouts, progress and resume checkpointing. One engine instance runs
//! at most one sync at a time; a second call while busy fails fast.
//!
//! The execution order is fixed: deletions first (serially), then
//! transfers, parallelised up to `max_parallel_transfers`. The plan holds
//! at most one action per path, so concurrent transfers never touch the
//! same file.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::auth::AuthProvider;
use crate::cache::{CacheSide, MetadataCache};
use crate::config::{SyncConfig, SyncOptions};
use crate::conflict::{AskUserFn, ConflictResolver, Resolution};
use crate::envelope;
use crate::error::{RemoteError, SyncError};
use crate::hasher;
use crate::local::LocalStore;
use crate::manifest::{Manifest, ManifestBuilder};
use crate::modes::ConflictPolicy;
use crate::network::{AlwaysOnline, NetworkMonitor};
use crate::planner::{DiffPlanner, SyncAction};
use crate::progress::{ProgressTracker, SyncPhase};
use crate::relpath::RelPath;
use crate::remote::{FolderIds, RemoteStore};
use crate::state::{Checkpointer, ResumeInfo, ResumeStore};
use crate::types::{FileError, SyncResult};

/// Cooperative cancellation handle.
///
/// Checked between actions and at every suspension point the engine
/// controls; cancelling mid-transfer aborts before the next one starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
	flag: Arc<AtomicBool>,
}

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.flag.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::SeqCst)
	}

	pub fn reset(&self) {
		self.flag.store(false, Ordering::SeqCst);
	}

	/// Err(Cancelled) when the token has fired.
	pub fn check(&self) -> Result<(), SyncError> {
		if self.is_cancelled() {
			Err(SyncError::Cancelled)
		} else {
			Ok(())
		}
	}
}

/// Per-action result used to aggregate run statistics
#[derive(Debug, Default, Clone, Copy)]
struct ActionOutcome {
	uploaded: usize,
	downloaded: usize,
	deleted: usize,
	skipped: usize,
	bytes: u64,
}

impl ActionOutcome {
	fn uploaded(bytes: u64) -> Self {
		ActionOutcome { uploaded: 1, bytes, ..Default::default() }
	}

	fn downloaded(bytes: u64) -> Self {
		ActionOutcome { downloaded: 1, bytes, ..Default::default() }
	}

	fn deleted() -> Self {
		ActionOutcome { deleted: 1, ..Default::default() }
	}

	fn skipped() -> Self {
		ActionOutcome { skipped: 1, ..Default::default() }
	}
}

#[derive(Debug, Default)]
struct Counters {
	uploaded: AtomicUsize,
	downloaded: AtomicUsize,
	deleted: AtomicUsize,
	skipped: AtomicUsize,
	bytes: AtomicU64,
}

impl Counters {
	fn add(&self, outcome: ActionOutcome) {
		self.uploaded.fetch_add(outcome.uploaded, Ordering::SeqCst);
		self.downloaded.fetch_add(outcome.downloaded, Ordering::SeqCst);
		self.deleted.fetch_add(outcome.deleted, Ordering::SeqCst);
		self.skipped.fetch_add(outcome.skipped, Ordering::SeqCst);
		self.bytes.fetch_add(outcome.bytes, Ordering::SeqCst);
	}
}

/// Shared state for one plan execution
struct PlanContext<'a> {
	options: &'a SyncOptions,
	folder_ids: &'a FolderIds,
	local_manifest: &'a Manifest,
	remote_manifest: &'a Manifest,
	resolver: ConflictResolver,
	/// Remote folder ids by directory path, filled lazily
	folder_cache: tokio::sync::Mutex<HashMap<String, String>>,
	resume: tokio::sync::Mutex<(ResumeInfo, Checkpointer)>,
	counters: Counters,
	errors: std::sync::Mutex<Vec<FileError>>,
	fatal: std::sync::Mutex<Option<SyncError>>,
}

impl PlanContext<'_> {
	fn record_fatal(&self, error: SyncError) {
		let mut fatal = self.fatal.lock().unwrap_or_else(|e| e.into_inner());
		if fatal.is_none() {
			*fatal = Some(error);
		}
	}

	fn has_fatal(&self) -> bool {
		self.fatal.lock().unwrap_or_else(|e| e.into_inner()).is_some()
	}
}

/// Orchestrates manifest building, planning and plan execution
pub struct SyncEngine {
	config: SyncConfig,
	local: LocalStore,
	remote: Arc<dyn RemoteStore>,
	auth: Arc<dyn AuthProvider>,
	network: Arc<dyn NetworkMonitor>,
	cache: Arc<MetadataCache>,
	resume_store: ResumeStore,
	progress: Arc<ProgressTracker>,
	conflict_callback: Option<Arc<AskUserFn>>,
	running: AtomicBool,
	cancel: CancelToken,
}

impl SyncEngine {
	/// Build an engine. Collaborators are plain constructor parameters;
	/// the engine owns no globals and holds no back-references.
	pub fn new(
		config: SyncConfig,
		local: LocalStore,
		remote: Arc<dyn RemoteStore>,
		auth: Arc<dyn AuthProvider>,
	) -> Result<Self, SyncError> {
		config.validate()?;
		let state_dir = config.state_dir.clone().unwrap_or_else(|| ".".into());
		let cache_dir = config.cache_dir.clone().unwrap_or_else(|| state_dir.clone());
		let cache = Arc::new(MetadataCache::new(cache_dir, config.cache_policy.clone()));
		Ok(SyncEngine {
			resume_store: ResumeStore::new(state_dir),
			local,
			remote,
			auth,
			network: Arc::new(AlwaysOnline),
			cache,
			progress: Arc::new(ProgressTracker::new()),
			conflict_callback: None,
			running: AtomicBool::new(false),
			cancel: CancelToken::new(),
			config,
		})
	}

	/// Replace the default (always-online) network monitor.
	pub fn with_network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
		self.network = monitor;
		self
	}

	/// Register the callback consulted for `ConflictPolicy::AskUser`.
	pub fn with_conflict_callback<F>(mut self, callback: F) -> Self
	where
		F: Fn(&crate::manifest::ManifestEntry, &crate::manifest::ManifestEntry) -> Option<Resolution>
			+ Send
			+ Sync
			+ 'static,
	{
		self.conflict_callback = Some(Arc::new(callback));
		self
	}

	pub fn progress(&self) -> Arc<ProgressTracker> {
		Arc::clone(&self.progress)
	}

	pub fn cache(&self) -> Arc<MetadataCache> {
		Arc::clone(&self.cache)
	}

	/// Handle for cancelling a running sync from another task.
	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Run a full sync. At most one sync runs per engine instance.
	pub async fn sync(&self, options: SyncOptions) -> SyncResult {
		if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
			return SyncResult::Error { message: SyncError::AlreadyRunning.to_string() };
		}
		// Reset a token left fired by a previous cancellation
		self.cancel.reset();

		let result = self.run_sync(&options).await;
		self.running.store(false, Ordering::SeqCst);

		match result {
			Ok(result) => {
				let phase = match &result {
					SyncResult::Success { .. } | SyncResult::PartialSuccess { .. } => SyncPhase::Done,
					SyncResult::Cancelled => SyncPhase::Cancelled,
					_ => SyncPhase::Failed,
				};
				self.progress.set_phase(phase);
				result
			}
			Err(SyncError::Cancelled) => {
				self.progress.set_phase(SyncPhase::Cancelled);
				SyncResult::Cancelled
			}
			Err(SyncError::Remote(RemoteError::NotSignedIn)) => {
				self.progress.set_phase(SyncPhase::Failed);
				SyncResult::NotSignedIn
			}
			Err(SyncError::NetworkUnavailable) => {
				self.progress.set_phase(SyncPhase::Failed);
				SyncResult::NetworkUnavailable
			}
			Err(e) => {
				self.progress.set_phase(SyncPhase::Failed);
				error!(error = %e, "sync failed");
				SyncResult::Error { message: e.to_string() }
			}
		}
	}

	async fn run_sync(&self, options: &SyncOptions) -> Result<SyncResult, SyncError> {
		let started = Instant::now();
		self.cancel.check()?;

		// Authenticate
		if !self.auth.is_signed_in().await {
			return Err(SyncError::Remote(RemoteError::NotSignedIn));
		}

		// Network policy gate
		let net = self.network.current();
		if !net.online {
			return Err(SyncError::NetworkUnavailable);
		}
		if !options.network_policy.permits(net) {
			return Err(SyncError::NetworkPolicyBlocked);
		}

		// Build both manifests
		self.progress.set_phase(SyncPhase::BuildingManifest);
		let folder_ids = options
			.retry
			.run(&self.cancel, || {
				self.with_timeout(self.remote.ensure_folder_structure(&self.config.app_folder_name))
			})
			.await?;

		let local_manifest =
			ManifestBuilder::build_local(&self.local, &options.filters, options.checksum_algorithm)
				.await?;
		self.cancel.check()?;
		let remote_manifest = {
			let sync_folder: &str = &folder_ids.sync;
			let filters = &options.filters;
			let encryption = &options.encryption;
			let algorithm = options.checksum_algorithm;
			options
				.retry
				.run(&self.cancel, || async move {
					ManifestBuilder::build_remote(
						self.remote.as_ref(),
						sync_folder,
						filters,
						algorithm,
						encryption,
					)
					.await
				})
				.await?
		};

		self.cache.put(CacheSide::Local, local_manifest.clone());
		self.cache.put(CacheSide::Remote, remote_manifest.clone());
		for side in [CacheSide::Local, CacheSide::Remote] {
			if let Err(e) = self.cache.persist(side).await {
				warn!(side = %side, error = %e, "failed to persist manifest cache");
			}
		}

		// Plan
		self.progress.set_phase(SyncPhase::Planning);
		let plan = DiffPlanner::plan(&local_manifest, &remote_manifest, options.mode);
		let effective: Vec<SyncAction> =
			plan.into_iter().filter(|a| a.is_effective()).collect();

		// Rehydrate resume state from a compatible interrupted run
		let resume = match self.resume_store.load().await {
			Ok(Some(prior)) if prior.mode == options.mode => {
				info!(
					sync_id = %prior.sync_id,
					completed = prior.completed_paths.len(),
					"resuming interrupted sync"
				);
				ResumeInfo { pending_plan: effective.clone(), ..prior }
			}
			Ok(_) => ResumeInfo::new(options.mode, Utc::now().timestamp_millis(), effective.clone()),
			Err(e) => {
				warn!(error = %e, "ignoring unreadable resume state");
				ResumeInfo::new(options.mode, Utc::now().timestamp_millis(), effective.clone())
			}
		};

		let bytes_total: u64 = effective
			.iter()
			.map(|action| match action {
				SyncAction::Upload { path } | SyncAction::Conflict { path } => {
					local_manifest.get(path).map(|e| e.size).unwrap_or(0)
				}
				SyncAction::Download { path } => {
					remote_manifest.get(path).map(|e| e.size).unwrap_or(0)
				}
				_ => 0,
			})
			.sum();
		self.progress.begin_run(effective.len(), bytes_total);

		if !effective.is_empty() {
			self.resume_store.save(&resume).await?;
		}

		// Execute
		self.progress.set_phase(SyncPhase::Transferring);
		let resolver = match (&options.conflict_policy, &self.conflict_callback) {
			(ConflictPolicy::AskUser, Some(callback)) => {
				let callback = Arc::clone(callback);
				ConflictResolver::with_callback(ConflictPolicy::AskUser, move |l, r| callback(l, r))
			}
			(policy, _) => ConflictResolver::new(*policy),
		};
		let ctx = PlanContext {
			options,
			folder_ids: &folder_ids,
			local_manifest: &local_manifest,
			remote_manifest: &remote_manifest,
			resolver,
			folder_cache: tokio::sync::Mutex::new(HashMap::new()),
			resume: tokio::sync::Mutex::new((resume, Checkpointer::new())),
			counters: Counters::default(),
			errors: std::sync::Mutex::new(Vec::new()),
			fatal: std::sync::Mutex::new(None),
		};

		let (deletions, transfers): (Vec<_>, Vec<_>) =
			effective.into_iter().partition(|a| a.is_deletion());

		// Deletions run serially, before anything is created
		for action in deletions {
			if ctx.has_fatal() {
				break;
			}
			self.run_action(action, &ctx).await;
		}

		// Transfers may run concurrently; paths are disjoint by construction
		if !ctx.has_fatal() {
			let limit = options.max_parallel_transfers.max(1) as usize;
			futures::stream::iter(transfers)
				.for_each_concurrent(limit, |action| async {
					if !ctx.has_fatal() {
						self.run_action(action, &ctx).await;
					}
				})
				.await;
		}

		// Finalize
		self.progress.set_phase(SyncPhase::Finalizing);
		let (resume, _) = ctx.resume.into_inner();
		let errors = ctx.errors.into_inner().unwrap_or_else(|e| e.into_inner());
		let fatal = ctx.fatal.into_inner().unwrap_or_else(|e| e.into_inner());

		if let Some(fatal) = fatal {
			// The run was interrupted, not finished: finalize resume
			// state so the next run can pick up where this one stopped
			self.resume_store.save(&resume).await?;
			if matches!(fatal, SyncError::Cancelled) {
				if let Err(e) = self.local.clean_temp_files().await {
					warn!(error = %e, "temp file cleanup after cancel failed");
				}
			}
			return Err(fatal);
		}

		let uploaded = ctx.counters.uploaded.load(Ordering::SeqCst);
		let downloaded = ctx.counters.downloaded.load(Ordering::SeqCst);
		let deleted = ctx.counters.deleted.load(Ordering::SeqCst);
		let skipped = ctx.counters.skipped.load(Ordering::SeqCst);
		let bytes = ctx.counters.bytes.load(Ordering::SeqCst);
		let succeeded = uploaded + downloaded + deleted;
		let duration = started.elapsed();

		if uploaded + downloaded + deleted > 0 {
			// The trees changed under the cached manifests
			if let Err(e) = self.cache.invalidate_all().await {
				warn!(error = %e, "failed to invalidate manifest cache");
			}
		}

		// The run finished (with or without per-file failures); failed
		// actions are re-planned next time, so the resume record is done
		self.resume_store.clear().await?;

		if errors.is_empty() {
			info!(uploaded, downloaded, deleted, skipped, bytes, "sync completed");
			Ok(SyncResult::Success { uploaded, downloaded, deleted, skipped, bytes, duration })
		} else if succeeded > 0 {
			warn!(succeeded, failed = errors.len(), "sync completed partially");
			Ok(SyncResult::PartialSuccess { succeeded, failed: errors.len(), errors, duration })
		} else {
			let message = match errors.first() {
				Some(first) => format!(
					"all {} actions failed; first error on {}: {}",
					errors.len(),
					first.path,
					first.message
				),
				None => "no actions executed".to_string(),
			};
			Ok(SyncResult::Error { message })
		}
	}

	/// Execute one action, routing its outcome into the shared context.
	async fn run_action(&self, action: SyncAction, ctx: &PlanContext<'_>) {
		if let Err(e) = self.cancel.check() {
			ctx.record_fatal(e);
			return;
		}
		let path = action.path().clone();

		// Already done by the interrupted run this one resumes
		{
			let resume = ctx.resume.lock().await;
			if resume.0.is_completed(&path) {
				ctx.counters.add(ActionOutcome::skipped());
				self.progress.file_completed(&path, 0);
				return;
			}
		}

		self.progress.file_started(&path);
		match self.execute_action(&action, ctx).await {
			Ok(outcome) => {
				ctx.counters.add(outcome);
				self.progress.file_completed(&path, outcome.bytes);
				let mut resume = ctx.resume.lock().await;
				resume.0.mark_completed(&path);
				if resume.1.note_completed() {
					resume.0.last_checkpoint_ms = Utc::now().timestamp_millis();
					let snapshot = resume.0.clone();
					drop(resume);
					if let Err(e) = self.resume_store.save(&snapshot).await {
						warn!(error = %e, "resume checkpoint failed");
					}
				}
			}
			Err(e) if e.is_fatal() => {
				self.progress.file_failed(&path, &e.to_string());
				ctx.record_fatal(e);
			}
			Err(e) => {
				warn!(path = %path, error = %e, "action failed");
				self.progress.file_failed(&path, &e.to_string());
				let mut errors = ctx.errors.lock().unwrap_or_else(|p| p.into_inner());
				errors.push(FileError { path: path.clone(), message: e.to_string() });
			}
		}
	}

	async fn execute_action(
		&self,
		action: &SyncAction,
		ctx: &PlanContext<'_>,
	) -> Result<ActionOutcome, SyncError> {
		match action {
			SyncAction::Upload { path } => self.do_upload(path, None, ctx).await,
			SyncAction::Download { path } => self.do_download(path, None, ctx).await,
			SyncAction::DeleteLocal { path } => {
				self.local.delete(path).await?;
				Ok(ActionOutcome::deleted())
			}
			SyncAction::DeleteRemote { path } => self.do_delete_remote(path, ctx).await,
			SyncAction::Conflict { path } => self.do_conflict(path, ctx).await,
			SyncAction::Skip { path, reason } => {
				info!(path = %path, reason = %reason, "skipping");
				Ok(ActionOutcome::skipped())
			}
			SyncAction::None { .. } => Ok(ActionOutcome::default()),
		}
	}

	/// Upload a local file, encrypting when configured.
	///
	/// `rename_to` uploads the file under a different remote path
	/// (keep-both conflict copies).
	async fn do_upload(
		&self,
		path: &RelPath,
		rename_to: Option<&RelPath>,
		ctx: &PlanContext<'_>,
	) -> Result<ActionOutcome, SyncError> {
		let entry = ctx
			.local_manifest
			.get(path)
			.ok_or_else(|| SyncError::Other { message: format!("{} vanished from local manifest", path) })?;
		let target = rename_to.unwrap_or(path);
		let parent_id = self.ensure_remote_parents(target, ctx).await?;
		let existing_id = match rename_to {
			// Conflict copies are always new files
			Some(_) => None,
			None => ctx.remote_manifest.get(path).and_then(|e| e.remote_id.clone()),
		};
		let parent_ref: &str = &parent_id;
		let existing_ref: Option<&str> = existing_id.as_deref();
		let name: &str = target.name();
		let modified_ms = entry.modified_ms;
		let encryption = &ctx.options.encryption;

		ctx.options
			.retry
			.run(&self.cancel, || async move {
				// Rebuild the content stream on every attempt
				if encryption.is_active() {
					let plain = self.local.read_bytes(path).await?;
					let blob = envelope::encrypt(&plain, encryption)?;
					let mut cursor = std::io::Cursor::new(blob);
					self.with_timeout(self.remote.upload(
						&mut cursor,
						parent_ref,
						name,
						modified_ms,
						existing_ref,
					))
					.await
				} else {
					let mut file = self.local.read(path).await?;
					self.with_timeout(self.remote.upload(
						&mut file,
						parent_ref,
						name,
						modified_ms,
						existing_ref,
					))
					.await
				}
			})
			.await?;

		info!(path = %path, target = %target, bytes = entry.size, "uploaded");
		Ok(ActionOutcome::uploaded(entry.size))
	}

	/// Download a remote file, decrypting and verifying before the write.
	///
	/// `write_to` saves the content under a different local path
	/// (keep-both conflict copies). Content is buffered, authenticated
	/// and checksum-verified first; a failed verification writes nothing.
	async fn do_download(
		&self,
		path: &RelPath,
		write_to: Option<&RelPath>,
		ctx: &PlanContext<'_>,
	) -> Result<ActionOutcome, SyncError> {
		let entry = ctx
			.remote_manifest
			.get(path)
			.ok_or_else(|| SyncError::Other { message: format!("{} vanished from remote manifest", path) })?;
		let remote_id = entry
			.remote_id
			.clone()
			.ok_or_else(|| SyncError::Other { message: format!("{} has no remote id", path) })?;
		let target = write_to.unwrap_or(path);
		let max_attempts = ctx.options.retry.max_attempts.max(1);

		// Integrity loop: a checksum mismatch discards the buffer and
		// re-downloads, up to the policy's attempt cap.
		let mut verify_attempt = 0;
		let plain = loop {
			verify_attempt += 1;
			let remote_ref: &str = &remote_id;
			let blob = ctx
				.options
				.retry
				.run(&self.cancel, || async move {
					let mut buf = Vec::new();
					self.with_timeout(self.remote.download(remote_ref, &mut buf)).await?;
					Ok(buf)
				})
				.await?;

			let plain = envelope::decrypt(&blob, &ctx.options.encryption)?;
			match &entry.checksum {
				Some(expected) => {
					let actual = hasher::hash_bytes(ctx.options.checksum_algorithm, &plain);
					if &actual == expected {
						break plain;
					}
					let mismatch = SyncError::ChecksumMismatch {
						path: path.as_str().to_string(),
						expected: expected.clone(),
						actual,
					};
					if verify_attempt >= max_attempts {
						return Err(mismatch);
					}
					warn!(path = %path, attempt = verify_attempt, "checksum mismatch, re-downloading");
				}
				// Nothing to verify against; the AEAD tag (when
				// encrypted) already authenticated the content
				None => break plain,
			}
		};

		let bytes = plain.len() as u64;
		self.local.write_atomic_bytes(target, &plain).await?;
		info!(path = %path, target = %target, bytes, "downloaded");
		Ok(ActionOutcome::downloaded(bytes))
	}

	async fn do_delete_remote(
		&self,
		path: &RelPath,
		ctx: &PlanContext<'_>,
	) -> Result<ActionOutcome, SyncError> {
		let remote_id = ctx
			.remote_manifest
			.get(path)
			.and_then(|e| e.remote_id.clone())
			.ok_or_else(|| SyncError::Other { message: format!("{} has no remote id", path) })?;

		let remote_ref: &str = &remote_id;
		let result = ctx
			.options
			.retry
			.run(&self.cancel, || async move {
				self.with_timeout(self.remote.delete(remote_ref)).await
			})
			.await;
		match result {
			Ok(()) => {}
			// Someone else already removed it; the goal state holds
			Err(SyncError::Remote(RemoteError::NotFound { .. })) => {}
			Err(e) => return Err(e),
		}
		info!(path = %path, "deleted remote file");
		Ok(ActionOutcome::deleted())
	}

	/// Resolve and carry out a conflict action.
	async fn do_conflict(
		&self,
		path: &RelPath,
		ctx: &PlanContext<'_>,
	) -> Result<ActionOutcome, SyncError> {
		let local = ctx
			.local_manifest
			.get(path)
			.ok_or_else(|| SyncError::Other { message: format!("{} vanished from local manifest", path) })?;
		let remote = ctx
			.remote_manifest
			.get(path)
			.ok_or_else(|| SyncError::Other { message: format!("{} vanished from remote manifest", path) })?;
		let mode = ctx.options.mode;

		match ctx.resolver.resolve(local, remote) {
			Resolution::UseLocal => {
				if mode.allows_upload() {
					self.do_upload(path, None, ctx).await
				} else {
					info!(path = %path, "conflict winner needs upload, blocked by {}", mode);
					Ok(ActionOutcome::skipped())
				}
			}
			Resolution::UseRemote => {
				if mode.allows_download() {
					self.do_download(path, None, ctx).await
				} else {
					info!(path = %path, "conflict winner needs download, blocked by {}", mode);
					Ok(ActionOutcome::skipped())
				}
			}
			Resolution::KeepBoth { rename_to } => {
				if !mode.allows_upload() || !mode.allows_download() {
					info!(path = %path, "keep-both needs both directions, blocked by {}", mode);
					return Ok(ActionOutcome::skipped());
				}
				// Save the remote version under the stamped name before
				// the local version overwrites it
				let down = self.do_download(path, Some(&rename_to), ctx).await?;
				let up = self.do_upload(path, None, ctx).await?;

				// The conflict copy also lives on the remote side; it is
				// not in the local manifest, so upload it directly
				let conflict_parent = self.ensure_remote_parents(&rename_to, ctx).await?;
				let parent_ref: &str = &conflict_parent;
				let rename_ref: &RelPath = &rename_to;
				let name: &str = rename_to.name();
				let encryption = &ctx.options.encryption;
				let modified_ms = remote.modified_ms;
				ctx.options
					.retry
					.run(&self.cancel, || async move {
						let plain = self.local.read_bytes(rename_ref).await?;
						let blob = envelope::encrypt(&plain, encryption)?;
						let mut cursor = std::io::Cursor::new(blob);
						self.with_timeout(self.remote.upload(
							&mut cursor,
							parent_ref,
							name,
							modified_ms,
							None,
						))
						.await
					})
					.await?;

				info!(path = %path, conflict_copy = %rename_to, "kept both versions");
				Ok(ActionOutcome {
					uploaded: up.uploaded + 1,
					downloaded: down.downloaded,
					deleted: 0,
					skipped: 0,
					bytes: up.bytes + down.bytes,
				})
			}
			Resolution::Skip => Ok(ActionOutcome::skipped()),
		}
	}

	/// Make sure the remote folder chain for `path` exists; returns the
	/// id of the immediate parent folder.
	async fn ensure_remote_parents(
		&self,
		path: &RelPath,
		ctx: &PlanContext<'_>,
	) -> Result<String, SyncError> {
		let parent = match path.parent() {
			Some(parent) => parent,
			None => return Ok(ctx.folder_ids.sync.clone()),
		};

		let mut cache = ctx.folder_cache.lock().await;
		if let Some(id) = cache.get(parent.as_str()) {
			return Ok(id.clone());
		}

		let mut current = ctx.folder_ids.sync.clone();
		let mut prefix = String::new();
		for segment in parent.segments() {
			if prefix.is_empty() {
				prefix.push_str(segment);
			} else {
				prefix.push('/');
				prefix.push_str(segment);
			}
			let next = match cache.get(&prefix) {
				Some(id) => id.clone(),
				None => {
					let parent_ref: &str = &current;
					let id = ctx
						.options
						.retry
						.run(&self.cancel, || async move {
							self.with_timeout(self.remote.ensure_folder(segment, parent_ref)).await
						})
						.await?;
					cache.insert(prefix.clone(), id.clone());
					id
				}
			};
			current = next;
		}
		Ok(current)
	}

	/// Apply the per-call timeout to a remote operation.
	async fn with_timeout<T>(
		&self,
		fut: impl Future<Output = Result<T, RemoteError>>,
	) -> Result<T, SyncError> {
		let timeout = self.config.remote_timeout();
		match tokio::time::timeout(timeout, fut).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(e)) => Err(SyncError::Remote(e)),
			Err(_) => Err(SyncError::Remote(RemoteError::Transport {
				message: format!("remote call timed out after {}s", timeout.as_secs()),
			})),
		}
	}
}


// vim: ts=4
