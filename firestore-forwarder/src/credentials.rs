//! Service account credentials and OAuth2 access tokens.
//!
//! Signing the JWT bearer assertion, the exchange at the key's `token_uri` and
//! token caching are handled by `gcp_auth`.

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::Path;
use tracing::debug;

use crate::error::{ForwarderError, Result};

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Supplies bearer tokens for Firestore requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for emulators and tests.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Token source backed by a service account key file.
pub struct ServiceAccountAuth {
    account: CustomServiceAccount
}

impl ServiceAccountAuth {
    pub fn from_file(path: &Path) -> Result<Self> {
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            ForwarderError::Credentials(format!(
                "Invalid service account file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { account })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let account = CustomServiceAccount::from_json(raw).map_err(|e| {
            ForwarderError::Credentials(format!("Invalid service account file: {e}"))
        })?;
        Ok(Self { account })
    }

    /// The project named in the key file.
    pub async fn project_id(&self) -> Result<String> {
        TokenProvider::project_id(&self.account)
            .await
            .map(|id| id.to_string())
            .map_err(|e| ForwarderError::Credentials(format!("No project id in service account: {e}")))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String> {
        debug!("Requesting access token");
        let token = self
            .account
            .token(&[DATASTORE_SCOPE])
            .await
            .map_err(|e| ForwarderError::Authentication(format!("Token request failed: {e}")))?;
        Ok(token.as_str().to_string())
    }
}
