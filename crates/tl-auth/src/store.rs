use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Credential record as the durable store hands it back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry, seconds since epoch
    pub expires_at_secs: i64,
}

/// Durable, authoritative credential storage keyed by provider
///
/// Note the asymmetric units: `get` reports seconds, `save` takes milliseconds.
#[async_trait::async_trait]
pub trait DurableTokenStore: Send + Sync {
    /// Load the stored credential for a provider
    async fn get(&self, provider: &str) -> Result<Option<StoredTokens>>;

    /// Save a credential for a provider
    async fn save(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<()>;

    /// Remove the stored credential for a provider
    async fn clear(&self, provider: &str) -> Result<()>;
}

/// In-memory durable store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, StoredTokens>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DurableTokenStore for MemoryTokenStore {
    async fn get(&self, provider: &str) -> Result<Option<StoredTokens>> {
        Ok(self.tokens.read().get(provider).cloned())
    }

    async fn save(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<()> {
        let record = StoredTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at_secs: expires_at_ms / 1000,
        };
        self.tokens.write().insert(provider.to_string(), record);
        Ok(())
    }

    async fn clear(&self, provider: &str) -> Result<()> {
        self.tokens.write().remove(provider);
        Ok(())
    }
}
