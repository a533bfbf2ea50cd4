//! Authentication seam
//!
//! Token acquisition is somebody else's problem; the engine only needs
//! the two calls below. The auth provider is injected into the remote
//! store (and into the engine for the pre-flight check), never the other
//! way around, which keeps the dependency graph acyclic.

use async_trait::async_trait;

use crate::error::RemoteError;

/// A bearer token for the cloud API
#[derive(Debug, Clone)]
pub struct AuthToken {
	pub access_token: String,
	pub expires_at_ms: Option<i64>,
}

/// Identity/token provider contract
#[async_trait]
pub trait AuthProvider: Send + Sync {
	/// Whether a usable account is currently signed in.
	async fn is_signed_in(&self) -> bool;

	/// A valid access token, refreshing if necessary.
	async fn get_token(&self) -> Result<AuthToken, RemoteError>;
}

/// Provider with a fixed token (tests, service accounts).
pub struct StaticAuthProvider {
	token: Option<String>,
}

impl StaticAuthProvider {
	pub fn signed_in(token: &str) -> Self {
		StaticAuthProvider { token: Some(token.to_string()) }
	}

	pub fn signed_out() -> Self {
		StaticAuthProvider { token: None }
	}
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
	async fn is_signed_in(&self) -> bool {
		self.token.is_some()
	}

	async fn get_token(&self) -> Result<AuthToken, RemoteError> {
		match &self.token {
			Some(token) => {
				Ok(AuthToken { access_token: token.clone(), expires_at_ms: None })
			}
			None => Err(RemoteError::NotSignedIn),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_static_provider() {
		let signed_in = StaticAuthProvider::signed_in("tok");
		assert!(signed_in.is_signed_in().await);
		assert_eq!(signed_in.get_token().await.unwrap().access_token, "tok");

		let signed_out = StaticAuthProvider::signed_out();
		assert!(!signed_out.is_signed_in().await);
		assert!(matches!(signed_out.get_token().await, Err(RemoteError::NotSignedIn)));
	}
}

// vim: ts=4
