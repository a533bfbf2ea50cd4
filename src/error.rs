//! Error types for sync operations
//!
//! `SyncError` is the unified error type for the whole engine. Domain
//! errors (remote store, local filesystem, crypto, persisted state) are
//! nested variants with `From` conversions so `?` flows through the
//! call sites.

use std::error::Error;
use std::fmt;
use std::io;

use crate::envelope::CryptoError;

/// Retryable error classes, as configured on a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
	/// Network transport failures and per-call timeouts
	Transport,

	/// Explicit rate limiting by the remote service
	RateLimited,

	/// Remote service temporarily unavailable
	ServiceUnavailable,

	/// Post-download checksum verification failures
	Integrity,
}

/// Main error type for sync operations
#[derive(Debug)]
pub enum SyncError {
	/// Remote store error (auth, transport, service-side)
	Remote(RemoteError),

	/// Local filesystem error
	Local(LocalError),

	/// Encryption envelope error
	Crypto(CryptoError),

	/// Persisted state (resume / cache file) error
	State(StateError),

	/// Downloaded content did not match the expected checksum
	ChecksumMismatch { path: String, expected: String, actual: String },

	/// Path excluded by the active filters
	FilteredOut { path: String },

	/// The configured network policy forbids transferring right now
	NetworkPolicyBlocked,

	/// No network connectivity
	NetworkUnavailable,

	/// Operation cancelled cooperatively
	Cancelled,

	/// A sync is already running on this engine instance
	AlreadyRunning,

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Remote(e) => write!(f, "Remote store error: {}", e),
			SyncError::Local(e) => write!(f, "Local store error: {}", e),
			SyncError::Crypto(e) => write!(f, "Crypto error: {}", e),
			SyncError::State(e) => write!(f, "State error: {}", e),
			SyncError::ChecksumMismatch { path, expected, actual } => {
				write!(f, "Checksum mismatch for {}: expected {}, got {}", path, expected, actual)
			}
			SyncError::FilteredOut { path } => write!(f, "Path filtered out: {}", path),
			SyncError::NetworkPolicyBlocked => {
				write!(f, "Transfer blocked by network policy")
			}
			SyncError::NetworkUnavailable => write!(f, "Network unavailable"),
			SyncError::Cancelled => write!(f, "Operation cancelled"),
			SyncError::AlreadyRunning => write!(f, "sync already in progress"),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl SyncError {
	/// The retry class of this error, if it belongs to one.
	pub fn class(&self) -> Option<ErrorClass> {
		match self {
			SyncError::Remote(e) => e.class(),
			SyncError::ChecksumMismatch { .. } => Some(ErrorClass::Integrity),
			_ => None,
		}
	}

	/// Server-mandated retry delay, if the remote asked for one.
	pub fn retry_after_ms(&self) -> Option<u64> {
		match self {
			SyncError::Remote(RemoteError::RateLimited { retry_after_ms }) => *retry_after_ms,
			_ => None,
		}
	}

	/// Errors that abort the whole plan rather than a single action.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			SyncError::Remote(RemoteError::NotSignedIn)
				| SyncError::Remote(RemoteError::PermissionDenied)
				| SyncError::NetworkUnavailable
				| SyncError::Cancelled
				| SyncError::AlreadyRunning
		)
	}
}

impl From<RemoteError> for SyncError {
	fn from(e: RemoteError) -> Self {
		SyncError::Remote(e)
	}
}

impl From<LocalError> for SyncError {
	fn from(e: LocalError) -> Self {
		SyncError::Local(e)
	}
}

impl From<CryptoError> for SyncError {
	fn from(e: CryptoError) -> Self {
		SyncError::Crypto(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Local(LocalError::Io(e))
	}
}

/// Errors surfaced by a remote store implementation
#[derive(Debug)]
pub enum RemoteError {
	/// No valid credentials
	NotSignedIn,

	/// Credentials valid but access denied
	PermissionDenied,

	/// Referenced file or folder does not exist
	NotFound { what: String },

	/// Service asked us to back off
	RateLimited { retry_after_ms: Option<u64> },

	/// Service temporarily unavailable (5xx)
	ServiceUnavailable,

	/// Connection-level failure or per-call timeout
	Transport { message: String },

	/// Storage quota exhausted
	QuotaExceeded,

	/// Anything else the service reported
	Other { message: String },
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::NotSignedIn => write!(f, "Not signed in"),
			RemoteError::PermissionDenied => write!(f, "Permission denied"),
			RemoteError::NotFound { what } => write!(f, "Not found: {}", what),
			RemoteError::RateLimited { retry_after_ms: Some(ms) } => {
				write!(f, "Rate limited (retry after {} ms)", ms)
			}
			RemoteError::RateLimited { retry_after_ms: None } => write!(f, "Rate limited"),
			RemoteError::ServiceUnavailable => write!(f, "Service unavailable"),
			RemoteError::Transport { message } => write!(f, "Transport error: {}", message),
			RemoteError::QuotaExceeded => write!(f, "Storage quota exceeded"),
			RemoteError::Other { message } => write!(f, "Remote error: {}", message),
		}
	}
}

impl Error for RemoteError {}

impl RemoteError {
	/// The retry class of this error, if it belongs to one.
	pub fn class(&self) -> Option<ErrorClass> {
		match self {
			RemoteError::Transport { .. } => Some(ErrorClass::Transport),
			RemoteError::RateLimited { .. } => Some(ErrorClass::RateLimited),
			RemoteError::ServiceUnavailable => Some(ErrorClass::ServiceUnavailable),
			_ => None,
		}
	}
}

/// Local filesystem errors
#[derive(Debug)]
pub enum LocalError {
	/// I/O error
	Io(io::Error),

	/// Path is malformed or escapes the sync root
	PathInvalid { path: String },

	/// No space left on the local device
	DiskFull { path: String },
}

impl fmt::Display for LocalError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LocalError::Io(e) => write!(f, "I/O error: {}", e),
			LocalError::PathInvalid { path } => write!(f, "Invalid path: {}", path),
			LocalError::DiskFull { path } => write!(f, "Disk full while writing: {}", path),
		}
	}
}

impl Error for LocalError {}

impl From<io::Error> for LocalError {
	fn from(e: io::Error) -> Self {
		LocalError::Io(e)
	}
}

impl LocalError {
	/// Map an I/O error for `path`, promoting ENOSPC to `DiskFull`.
	pub fn write_error(path: &str, e: io::Error) -> Self {
		// 28 == ENOSPC
		if e.raw_os_error() == Some(28) {
			LocalError::DiskFull { path: path.to_string() }
		} else {
			LocalError::Io(e)
		}
	}
}

/// State persistence errors (resume file, manifest cache)
#[derive(Debug)]
pub enum StateError {
	/// Failed to load state
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save state
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// State file is corrupted
	Corrupted { message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save state: {}", source),
			StateError::Corrupted { message } => write!(f, "State corrupted: {}", message),
		}
	}
}

impl Error for StateError {}


// vim: ts=4
