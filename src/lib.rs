//! # SkySync - Cloud Drive Directory Synchronizer
//!
//! SkySync mirrors a local directory tree against a folder hierarchy in a
//! cloud drive. Both sides are snapshotted into content-addressed
//! manifests, diffed into a deterministic action plan, and executed with
//! retry, resume and optional authenticated encryption at rest.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skysync::config::SyncConfig;
//! use skysync::engine::SyncEngine;
//! use skysync::local::LocalStore;
//! use skysync::modes::SyncMode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder("MyApp")
//!         .state_dir("/var/lib/myapp")
//!         .build()?;
//!     let engine = SyncEngine::new(
//!         config.clone(),
//!         LocalStore::new("/home/user/Documents"),
//!         remote_store, // any RemoteStore implementation
//!         auth,         // any AuthProvider implementation
//!     )?;
//!     let result = engine.sync(config.options(SyncMode::Bidirectional)).await;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod local;
pub mod logging;
pub mod manifest;
pub mod modes; // Consolidated mode/policy enums - declared early to avoid circular deps
pub mod network;
pub mod planner;
pub mod progress;
pub mod relpath;
pub mod remote;
pub mod retry;
pub mod state;
pub mod types;

// Re-export commonly used types and functions
pub use cache::{CachePolicy, CacheSide, MetadataCache};
pub use config::{SyncConfig, SyncConfigBuilder, SyncOptions};
pub use conflict::{ConflictResolver, Resolution};
pub use engine::{CancelToken, SyncEngine};
pub use envelope::{DeviceKeystore, EncryptionMode, EnvelopeKind, MemoryKeystore};
pub use error::{LocalError, RemoteError, StateError, SyncError};
pub use filter::{FileFilter, FilterEntry};
pub use hasher::ChecksumAlgorithm;
pub use local::LocalStore;
pub use manifest::{Manifest, ManifestBuilder, ManifestEntry};
pub use modes::{ConflictPolicy, NetworkPolicy, SyncMode};
pub use planner::{DiffPlanner, SyncAction};
pub use progress::{ProgressEvent, ProgressTracker, SyncPhase};
pub use relpath::RelPath;
pub use remote::{FolderIds, MemoryRemoteStore, RemoteEntry, RemoteStore};
pub use retry::RetryPolicy;
pub use state::{ResumeInfo, ResumeStore};
pub use types::{FileError, SyncResult};

// vim: ts=4
