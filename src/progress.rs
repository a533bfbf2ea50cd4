//! Observable sync progress
//!
//! The tracker holds atomically updated counters plus the current phase,
//! and pushes events into a bounded broadcast channel. Consumers that
//! fall behind lose the oldest events, never the engine's time.
//! `files_done` and `bytes_done` only ever grow during a run.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::relpath::RelPath;

/// Default event channel capacity
const EVENT_CAPACITY: usize = 256;

/// Phases of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	Idle,
	BuildingManifest,
	Planning,
	Transferring,
	Finalizing,
	Done,
	Failed,
	Cancelled,
}

impl std::fmt::Display for SyncPhase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SyncPhase::Idle => write!(f, "Idle"),
			SyncPhase::BuildingManifest => write!(f, "Building manifest"),
			SyncPhase::Planning => write!(f, "Planning"),
			SyncPhase::Transferring => write!(f, "Transferring"),
			SyncPhase::Finalizing => write!(f, "Finalizing"),
			SyncPhase::Done => write!(f, "Done"),
			SyncPhase::Failed => write!(f, "Failed"),
			SyncPhase::Cancelled => write!(f, "Cancelled"),
		}
	}
}

/// Events pushed to subscribers
#[derive(Debug, Clone)]
pub enum ProgressEvent {
	PhaseChanged { phase: SyncPhase },
	FileStarted { path: RelPath },
	FileCompleted { path: RelPath, bytes: u64 },
	FileFailed { path: RelPath, message: String },
}

/// Point-in-time view of a run
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
	pub phase: SyncPhase,
	pub current_file: Option<RelPath>,
	pub files_total: usize,
	pub files_done: usize,
	pub bytes_total: u64,
	pub bytes_done: u64,
	pub started_at_ms: i64,
	pub updated_at_ms: i64,
}

/// Shared progress state for one engine instance
pub struct ProgressTracker {
	phase: Mutex<SyncPhase>,
	current_file: Mutex<Option<RelPath>>,
	files_total: AtomicUsize,
	files_done: AtomicUsize,
	bytes_total: AtomicU64,
	bytes_done: AtomicU64,
	started_at_ms: AtomicI64,
	updated_at_ms: AtomicI64,
	events: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
	pub fn new() -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		ProgressTracker {
			phase: Mutex::new(SyncPhase::Idle),
			current_file: Mutex::new(None),
			files_total: AtomicUsize::new(0),
			files_done: AtomicUsize::new(0),
			bytes_total: AtomicU64::new(0),
			bytes_done: AtomicU64::new(0),
			started_at_ms: AtomicI64::new(0),
			updated_at_ms: AtomicI64::new(0),
			events,
		}
	}

	/// Subscribe to the event stream. Slow receivers drop oldest events.
	pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
		self.events.subscribe()
	}

	/// Reset counters for a fresh run and record its start time.
	pub fn begin_run(&self, files_total: usize, bytes_total: u64) {
		let now = Utc::now().timestamp_millis();
		self.files_total.store(files_total, Ordering::SeqCst);
		self.files_done.store(0, Ordering::SeqCst);
		self.bytes_total.store(bytes_total, Ordering::SeqCst);
		self.bytes_done.store(0, Ordering::SeqCst);
		self.started_at_ms.store(now, Ordering::SeqCst);
		self.updated_at_ms.store(now, Ordering::SeqCst);
	}

	pub fn set_phase(&self, phase: SyncPhase) {
		*self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
		self.touch();
		let _ = self.events.send(ProgressEvent::PhaseChanged { phase });
	}

	pub fn phase(&self) -> SyncPhase {
		*self.phase.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn file_started(&self, path: &RelPath) {
		*self.current_file.lock().unwrap_or_else(|e| e.into_inner()) = Some(path.clone());
		self.touch();
		let _ = self.events.send(ProgressEvent::FileStarted { path: path.clone() });
	}

	pub fn file_completed(&self, path: &RelPath, bytes: u64) {
		self.files_done.fetch_add(1, Ordering::SeqCst);
		self.bytes_done.fetch_add(bytes, Ordering::SeqCst);
		self.touch();
		let _ = self.events.send(ProgressEvent::FileCompleted { path: path.clone(), bytes });
	}

	pub fn file_failed(&self, path: &RelPath, message: &str) {
		self.files_done.fetch_add(1, Ordering::SeqCst);
		self.touch();
		let _ = self.events.send(ProgressEvent::FileFailed {
			path: path.clone(),
			message: message.to_string(),
		});
	}

	fn touch(&self) {
		self.updated_at_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
	}

	pub fn snapshot(&self) -> ProgressSnapshot {
		ProgressSnapshot {
			phase: self.phase(),
			current_file: self.current_file.lock().unwrap_or_else(|e| e.into_inner()).clone(),
			files_total: self.files_total.load(Ordering::SeqCst),
			files_done: self.files_done.load(Ordering::SeqCst),
			bytes_total: self.bytes_total.load(Ordering::SeqCst),
			bytes_done: self.bytes_done.load(Ordering::SeqCst),
			started_at_ms: self.started_at_ms.load(Ordering::SeqCst),
			updated_at_ms: self.updated_at_ms.load(Ordering::SeqCst),
		}
	}
}

impl Default for ProgressTracker {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rel(s: &str) -> RelPath {
		RelPath::new(s).unwrap()
	}

	#[test]
	fn test_counters_accumulate() {
		let tracker = ProgressTracker::new();
		tracker.begin_run(3, 300);

		tracker.file_completed(&rel("a.txt"), 100);
		tracker.file_completed(&rel("b.txt"), 150);

		let snap = tracker.snapshot();
		assert_eq!(snap.files_total, 3);
		assert_eq!(snap.files_done, 2);
		assert_eq!(snap.bytes_done, 250);
	}

	#[test]
	fn test_monotonic_counters() {
		let tracker = ProgressTracker::new();
		tracker.begin_run(10, 1000);

		let mut last_files = 0;
		for i in 0..10 {
			tracker.file_completed(&rel(&format!("f{}.txt", i)), 10);
			let snap = tracker.snapshot();
			assert!(snap.files_done > last_files);
			last_files = snap.files_done;
		}
	}

	#[tokio::test]
	async fn test_event_stream() {
		let tracker = ProgressTracker::new();
		let mut rx = tracker.subscribe();

		tracker.set_phase(SyncPhase::Transferring);
		tracker.file_started(&rel("a.txt"));
		tracker.file_completed(&rel("a.txt"), 5);

		assert!(matches!(
			rx.recv().await.unwrap(),
			ProgressEvent::PhaseChanged { phase: SyncPhase::Transferring }
		));
		assert!(matches!(rx.recv().await.unwrap(), ProgressEvent::FileStarted { .. }));
		match rx.recv().await.unwrap() {
			ProgressEvent::FileCompleted { path, bytes } => {
				assert_eq!(path.as_str(), "a.txt");
				assert_eq!(bytes, 5);
			}
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_slow_consumer_drops_oldest() {
		let tracker = ProgressTracker::new();
		let mut rx = tracker.subscribe();

		for i in 0..(EVENT_CAPACITY + 50) {
			tracker.file_completed(&rel(&format!("f{}.txt", i)), 1);
		}

		// The receiver lagged; the first recv reports the loss
		match rx.recv().await {
			Err(broadcast::error::RecvError::Lagged(n)) => assert!(n >= 50),
			other => panic!("expected lag, got {:?}", other),
		}
		// And then resumes with the newest events
		assert!(rx.recv().await.is_ok());
	}

	#[test]
	fn test_events_without_subscribers_are_fine() {
		let tracker = ProgressTracker::new();
		tracker.set_phase(SyncPhase::Planning);
		tracker.file_completed(&rel("a.txt"), 1);
	}
}

// vim: ts=4
