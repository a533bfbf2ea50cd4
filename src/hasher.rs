//! Streaming content hashing
//!
//! MD5 and SHA-256 digests over byte buffers and async readers, producing
//! lowercase hex. Files are read through an 8 KiB buffer so large files
//! never land in memory at once.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::LocalError;

/// Read buffer size for streaming hashes
const HASH_BUF_SIZE: usize = 8 * 1024;

/// Content checksum algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumAlgorithm {
	#[default]
	Md5,
	Sha256,
}

impl FromStr for ChecksumAlgorithm {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"md5" => Ok(Self::Md5),
			"sha256" | "sha-256" => Ok(Self::Sha256),
			_ => Err(format!("Unknown checksum algorithm: {}. Valid options: md5, sha256", s)),
		}
	}
}

impl std::fmt::Display for ChecksumAlgorithm {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Md5 => write!(f, "md5"),
			Self::Sha256 => write!(f, "sha256"),
		}
	}
}

/// Incremental hasher over either algorithm
pub struct Hasher {
	inner: HasherInner,
}

enum HasherInner {
	Md5(Md5),
	Sha256(Sha256),
}

impl Hasher {
	pub fn new(algorithm: ChecksumAlgorithm) -> Self {
		let inner = match algorithm {
			ChecksumAlgorithm::Md5 => HasherInner::Md5(Md5::new()),
			ChecksumAlgorithm::Sha256 => HasherInner::Sha256(Sha256::new()),
		};
		Hasher { inner }
	}

	pub fn update(&mut self, data: &[u8]) {
		match &mut self.inner {
			HasherInner::Md5(h) => h.update(data),
			HasherInner::Sha256(h) => h.update(data),
		}
	}

	/// Finish and return the digest as lowercase hex.
	pub fn finalize(self) -> String {
		match self.inner {
			HasherInner::Md5(h) => hex::encode(h.finalize()),
			HasherInner::Sha256(h) => hex::encode(h.finalize()),
		}
	}
}

/// Hash a byte buffer.
pub fn hash_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
	let mut hasher = Hasher::new(algorithm);
	hasher.update(data);
	hasher.finalize()
}

/// Hash everything an async reader yields.
pub async fn hash_reader<R>(algorithm: ChecksumAlgorithm, reader: &mut R) -> Result<String, LocalError>
where
	R: AsyncRead + Unpin + ?Sized,
{
	let mut hasher = Hasher::new(algorithm);
	let mut buf = [0u8; HASH_BUF_SIZE];
	loop {
		let n = reader.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hasher.finalize())
}

/// Hash a file's content.
pub async fn hash_file(algorithm: ChecksumAlgorithm, path: &Path) -> Result<String, LocalError> {
	let mut file = tokio::fs::File::open(path).await?;
	hash_reader(algorithm, &mut file).await
}

#[cfg(test)]
mod tests {
	use super::*;

	// RFC 1321 test vectors
	#[test]
	fn test_md5_vectors() {
		assert_eq!(hash_bytes(ChecksumAlgorithm::Md5, b""), "d41d8cd98f00b204e9800998ecf8427e");
		assert_eq!(hash_bytes(ChecksumAlgorithm::Md5, b"abc"), "900150983cd24fb0d6963f7d28e17f72");
		assert_eq!(
			hash_bytes(ChecksumAlgorithm::Md5, b"message digest"),
			"f96b697d7cb7938d525a2f31aaf161d0"
		);
	}

	// FIPS 180-4 test vectors
	#[test]
	fn test_sha256_vectors() {
		assert_eq!(
			hash_bytes(ChecksumAlgorithm::Sha256, b""),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
		assert_eq!(
			hash_bytes(ChecksumAlgorithm::Sha256, b"abc"),
			"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[tokio::test]
	async fn test_hash_reader_matches_bytes() {
		let data = vec![7u8; 100_000];
		let mut cursor = std::io::Cursor::new(data.clone());
		let streamed = hash_reader(ChecksumAlgorithm::Sha256, &mut cursor).await.unwrap();
		assert_eq!(streamed, hash_bytes(ChecksumAlgorithm::Sha256, &data));
	}

	#[tokio::test]
	async fn test_hash_file() {
		let tmp = tempfile::TempDir::new().unwrap();
		let path = tmp.path().join("data.bin");
		std::fs::write(&path, b"hello world").unwrap();
		let digest = hash_file(ChecksumAlgorithm::Md5, &path).await.unwrap();
		assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
	}

	#[test]
	fn test_algorithm_from_str() {
		assert_eq!(ChecksumAlgorithm::from_str("md5").unwrap(), ChecksumAlgorithm::Md5);
		assert_eq!(ChecksumAlgorithm::from_str("SHA256").unwrap(), ChecksumAlgorithm::Sha256);
		assert_eq!(ChecksumAlgorithm::from_str("sha-256").unwrap(), ChecksumAlgorithm::Sha256);
		assert!(ChecksumAlgorithm::from_str("crc32").is_err());
	}
}

// vim: ts=4
