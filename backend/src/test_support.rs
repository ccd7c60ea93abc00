//! Helpers shared by the unit tests in this crate

use crate::auth::CredentialHasher;
use async_trait::async_trait;

/// Reversible stand-in for the password hasher so tests stay fast
#[derive(Debug, Clone, Copy, Default)]
pub struct FastHasher;

#[async_trait]
impl CredentialHasher for FastHasher {
    async fn hash(&self, password: String) -> anyhow::Result<String> {
        Ok(format!("fast${password}"))
    }

    async fn verify(&self, password: String, hash: String) -> anyhow::Result<bool> {
        match hash.strip_prefix("fast$") {
            Some(expected) => Ok(expected == password),
            None => anyhow::bail!("not a test hash"),
        }
    }
}
