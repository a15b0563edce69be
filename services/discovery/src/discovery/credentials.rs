//! Credential Provider boundary
//!
//! Token acquisition and refresh live outside the discovery core. The core
//! only asks for a ready-to-use credential per user.

use anyhow::Result;
use async_trait::async_trait;

use super::types::Credential;

/// Supplies a valid credential for a user
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, user_id: &str) -> Result<Credential>;
}

/// Hands out one fixed token for every user
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            credential: Credential::bearer(access_token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, _user_id: &str) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}
