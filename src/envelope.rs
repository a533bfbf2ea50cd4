//! Authenticated encryption envelopes
//!
//! Files at rest in the cloud can be wrapped in one of two AES-256-GCM
//! envelope formats, distinguished by a 4-byte magic:
//!
//! ```text
//! passphrase: "PBKE" | version=1 | salt (16) | iv (12) | ciphertext||tag
//! device key: "DKEY" | version=1 |           | iv (12) | ciphertext||tag
//! ```
//!
//! Passphrase keys are derived with PBKDF2-HMAC-SHA256 (100 000 rounds).
//! Device keys live in a platform keystore behind the `DeviceKeystore`
//! trait and never leave it, which makes DKEY blobs non-portable across
//! devices. Bytes that start with neither magic are treated as plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

const MAGIC_PASSPHRASE: &[u8; 4] = b"PBKE";
const MAGIC_DEVICE_KEY: &[u8; 4] = b"DKEY";
const ENVELOPE_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

const PBKDF2_ITERATIONS: u32 = 100_000;
const MIN_PASSPHRASE_LEN: usize = 12;

/// Passphrases that are long enough but still unacceptable
const WEAK_PASSPHRASES: &[&str] =
	&["password1234", "123456789012", "qwertyuiopas", "abcdefghijkl"];

/// Fixed byte overhead of the passphrase envelope
pub const PASSPHRASE_OVERHEAD: usize = 4 + 1 + SALT_LEN + IV_LEN + TAG_LEN;

/// Fixed byte overhead of the device-key envelope
pub const DEVICE_KEY_OVERHEAD: usize = 4 + 1 + IV_LEN + TAG_LEN;

/// Encryption envelope errors
#[derive(Debug)]
pub enum CryptoError {
	/// Passphrase too short or on the weak list
	WeakPassphrase { message: String },

	/// Authentication tag did not verify
	WrongPassphrase,

	/// Envelope header is truncated or malformed
	CorruptedEnvelope { message: String },

	/// Envelope version byte is not one we understand
	UnsupportedVersion { version: u8 },

	/// The platform keystore has no usable key
	DeviceKeyUnavailable { message: String },
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CryptoError::WeakPassphrase { message } => {
				write!(f, "Weak passphrase: {}", message)
			}
			CryptoError::WrongPassphrase => {
				write!(f, "Decryption failed: wrong passphrase or corrupted data")
			}
			CryptoError::CorruptedEnvelope { message } => {
				write!(f, "Corrupted envelope: {}", message)
			}
			CryptoError::UnsupportedVersion { version } => {
				write!(f, "Unsupported envelope version: {}", version)
			}
			CryptoError::DeviceKeyUnavailable { message } => {
				write!(f, "Device key unavailable: {}", message)
			}
		}
	}
}

impl Error for CryptoError {}

/// Envelope format detected from leading magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
	/// No known magic: plaintext
	None,
	DeviceKey,
	Passphrase,
}

/// Inspect the first 4 bytes of a blob.
pub fn detect(bytes: &[u8]) -> EnvelopeKind {
	if bytes.len() >= 4 {
		if &bytes[..4] == MAGIC_PASSPHRASE {
			return EnvelopeKind::Passphrase;
		}
		if &bytes[..4] == MAGIC_DEVICE_KEY {
			return EnvelopeKind::DeviceKey;
		}
	}
	EnvelopeKind::None
}

/// Access to a key held in a platform secure element.
///
/// Implementations hand out raw key bytes for the AEAD but the key
/// material itself is generated and stored by the platform; it is never
/// serialized by this crate.
pub trait DeviceKeystore: Send + Sync {
	fn obtain_key(&self) -> Result<[u8; KEY_LEN], CryptoError>;
}

/// In-memory keystore for tests and platforms without a secure element.
pub struct MemoryKeystore {
	key: [u8; KEY_LEN],
}

impl MemoryKeystore {
	/// Generate a fresh random key.
	pub fn generate() -> Self {
		let mut key = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut key);
		MemoryKeystore { key }
	}

	pub fn from_key(key: [u8; KEY_LEN]) -> Self {
		MemoryKeystore { key }
	}
}

impl DeviceKeystore for MemoryKeystore {
	fn obtain_key(&self) -> Result<[u8; KEY_LEN], CryptoError> {
		Ok(self.key)
	}
}

/// At-rest encryption configuration
#[derive(Clone, Default)]
pub enum EncryptionMode {
	/// Files are stored as-is
	#[default]
	None,

	/// AES-256-GCM with a key from the device keystore
	DeviceKeystore(Arc<dyn DeviceKeystore>),

	/// AES-256-GCM with a PBKDF2-derived key
	Passphrase(String),
}

impl fmt::Debug for EncryptionMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EncryptionMode::None => write!(f, "None"),
			EncryptionMode::DeviceKeystore(_) => write!(f, "DeviceKeystore"),
			EncryptionMode::Passphrase(_) => write!(f, "Passphrase([REDACTED])"),
		}
	}
}

impl EncryptionMode {
	pub fn is_active(&self) -> bool {
		!matches!(self, EncryptionMode::None)
	}

	/// Fixed size difference between ciphertext and plaintext.
	pub fn overhead(&self) -> usize {
		match self {
			EncryptionMode::None => 0,
			EncryptionMode::DeviceKeystore(_) => DEVICE_KEY_OVERHEAD,
			EncryptionMode::Passphrase(_) => PASSPHRASE_OVERHEAD,
		}
	}
}

/// Reject passphrases shorter than 12 code units or on the weak list.
pub fn validate_passphrase(passphrase: &str) -> Result<(), CryptoError> {
	if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
		return Err(CryptoError::WeakPassphrase {
			message: format!("must be at least {} characters", MIN_PASSPHRASE_LEN),
		});
	}
	let lower = passphrase.to_lowercase();
	if WEAK_PASSPHRASES.contains(&lower.as_str()) {
		return Err(CryptoError::WeakPassphrase {
			message: "passphrase is on the common-passwords list".to_string(),
		});
	}
	Ok(())
}

/// Wrap plaintext according to the configured mode.
///
/// `EncryptionMode::None` is the identity.
pub fn encrypt(plain: &[u8], mode: &EncryptionMode) -> Result<Vec<u8>, CryptoError> {
	match mode {
		EncryptionMode::None => Ok(plain.to_vec()),
		EncryptionMode::Passphrase(passphrase) => {
			validate_passphrase(passphrase)?;
			let mut salt = [0u8; SALT_LEN];
			OsRng.fill_bytes(&mut salt);
			let key = derive_key(passphrase, &salt);

			let mut blob = Vec::with_capacity(PASSPHRASE_OVERHEAD + plain.len());
			blob.extend_from_slice(MAGIC_PASSPHRASE);
			blob.push(ENVELOPE_VERSION);
			blob.extend_from_slice(&salt);
			seal(&key, plain, &mut blob)?;
			Ok(blob)
		}
		EncryptionMode::DeviceKeystore(keystore) => {
			let key = Zeroizing::new(keystore.obtain_key()?);

			let mut blob = Vec::with_capacity(DEVICE_KEY_OVERHEAD + plain.len());
			blob.extend_from_slice(MAGIC_DEVICE_KEY);
			blob.push(ENVELOPE_VERSION);
			seal(&key, plain, &mut blob)?;
			Ok(blob)
		}
	}
}

/// Unwrap a blob. Plaintext (no known magic) passes through untouched.
pub fn decrypt(blob: &[u8], mode: &EncryptionMode) -> Result<Vec<u8>, CryptoError> {
	match detect(blob) {
		EnvelopeKind::None => Ok(blob.to_vec()),
		EnvelopeKind::Passphrase => {
			let passphrase = match mode {
				EncryptionMode::Passphrase(p) => p,
				_ => return Err(CryptoError::WrongPassphrase),
			};
			let body = check_header(blob, PASSPHRASE_OVERHEAD)?;
			let (salt, rest) = body.split_at(SALT_LEN);
			let key = derive_key(passphrase, salt);
			open(&key, rest)
		}
		EnvelopeKind::DeviceKey => {
			let keystore = match mode {
				EncryptionMode::DeviceKeystore(k) => k,
				_ => {
					return Err(CryptoError::DeviceKeyUnavailable {
						message: "blob requires a device key".to_string(),
					})
				}
			};
			let key = Zeroizing::new(keystore.obtain_key()?);
			let body = check_header(blob, DEVICE_KEY_OVERHEAD)?;
			open(&key, body)
		}
	}
}

/// Validate magic/version/length; return the bytes after the version byte.
fn check_header(blob: &[u8], min_len: usize) -> Result<&[u8], CryptoError> {
	if blob.len() < min_len {
		return Err(CryptoError::CorruptedEnvelope {
			message: format!("envelope truncated: {} bytes, need at least {}", blob.len(), min_len),
		});
	}
	let version = blob[4];
	if version != ENVELOPE_VERSION {
		return Err(CryptoError::UnsupportedVersion { version });
	}
	Ok(&blob[5..])
}

/// Derive a 256-bit key from a passphrase and salt.
fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
	let mut key = Zeroizing::new([0u8; KEY_LEN]);
	pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key[..]);
	key
}

/// Encrypt with a fresh random IV, appending `iv | ciphertext||tag` to `out`.
fn seal(key: &[u8; KEY_LEN], plain: &[u8], out: &mut Vec<u8>) -> Result<(), CryptoError> {
	let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::CorruptedEnvelope {
		message: "invalid key length".to_string(),
	})?;
	let mut iv = [0u8; IV_LEN];
	OsRng.fill_bytes(&mut iv);
	let ciphertext =
		cipher.encrypt(Nonce::from_slice(&iv), plain).map_err(|_| CryptoError::WrongPassphrase)?;
	out.extend_from_slice(&iv);
	out.extend_from_slice(&ciphertext);
	Ok(())
}

/// Decrypt `iv | ciphertext||tag`.
fn open(key: &[u8; KEY_LEN], body: &[u8]) -> Result<Vec<u8>, CryptoError> {
	let (iv, ciphertext) = body.split_at(IV_LEN);
	let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::CorruptedEnvelope {
		message: "invalid key length".to_string(),
	})?;
	cipher.decrypt(Nonce::from_slice(iv), ciphertext).map_err(|_| CryptoError::WrongPassphrase)
}


// vim: ts=4
