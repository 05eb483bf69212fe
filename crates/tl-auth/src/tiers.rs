//! Ordered storage tiers behind one load/save/clear contract.
//!
//! The first tier is authoritative; later tiers are consulted only when the
//! earlier ones yield nothing or fail, and every save is mirrored to all of
//! them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::credential::Credential;
use crate::errors::Result;
use crate::fallback::{keys, LocalFallbackStore};
use crate::store::DurableTokenStore;

/// One level of credential persistence
#[async_trait::async_trait]
pub trait CredentialTier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Option<Credential>>;

    async fn load_refresh_token(&self) -> Result<Option<String>>;

    async fn save(&self, credential: &Credential) -> Result<()>;

    async fn save_refresh_token(&self, refresh_token: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Adapter exposing a [`DurableTokenStore`] as a tier
pub struct DurableTier {
    store: Arc<dyn DurableTokenStore>,
    provider: String,
}

impl DurableTier {
    pub fn new(store: Arc<dyn DurableTokenStore>, provider: impl Into<String>) -> Self {
        Self {
            store,
            provider: provider.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialTier for DurableTier {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn load(&self) -> Result<Option<Credential>> {
        let Some(stored) = self.store.get(&self.provider).await? else {
            return Ok(None);
        };

        let expires_at_ms = stored.expires_at_secs.saturating_mul(1000);
        Ok(Credential::from_expiry_millis(
            stored.access_token,
            stored.refresh_token,
            expires_at_ms,
        ))
    }

    async fn load_refresh_token(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(&self.provider)
            .await?
            .and_then(|stored| stored.refresh_token))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        self.store
            .save(
                &self.provider,
                &credential.access_token,
                credential.refresh_token.as_deref(),
                credential.expires_at_millis(),
            )
            .await
    }

    async fn save_refresh_token(&self, refresh_token: &str) -> Result<()> {
        // The durable store only knows whole records.
        if let Some(mut credential) = self.load().await? {
            credential.refresh_token = Some(refresh_token.to_string());
            self.save(&credential).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.store.clear(&self.provider).await
    }
}

/// Adapter exposing a [`LocalFallbackStore`] as a tier
pub struct FallbackTier {
    store: Arc<dyn LocalFallbackStore>,
}

impl FallbackTier {
    pub fn new(store: Arc<dyn LocalFallbackStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl CredentialTier for FallbackTier {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn load(&self) -> Result<Option<Credential>> {
        let access_token = self.store.get(keys::ACCESS_TOKEN);
        let expiry = self
            .store
            .get(keys::TOKEN_EXPIRY)
            .and_then(|raw| raw.parse::<i64>().ok());

        // A token without an expiry (or the reverse) is not a credential.
        let (Some(access_token), Some(expires_at_ms)) = (access_token, expiry) else {
            return Ok(None);
        };

        Ok(Credential::from_expiry_millis(
            access_token,
            self.store.get(keys::REFRESH_TOKEN),
            expires_at_ms,
        ))
    }

    async fn load_refresh_token(&self) -> Result<Option<String>> {
        Ok(self.store.get(keys::REFRESH_TOKEN))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        self.store.set(keys::ACCESS_TOKEN, &credential.access_token)?;
        self.store
            .set(keys::TOKEN_EXPIRY, &credential.expires_at_millis().to_string())?;
        if let Some(refresh_token) = &credential.refresh_token {
            self.store.set(keys::REFRESH_TOKEN, refresh_token)?;
        }
        Ok(())
    }

    async fn save_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.store.set(keys::REFRESH_TOKEN, refresh_token)
    }

    async fn clear(&self) -> Result<()> {
        self.store.remove(keys::ACCESS_TOKEN)?;
        self.store.remove(keys::TOKEN_EXPIRY)?;
        self.store.remove(keys::REFRESH_TOKEN)
    }
}

/// Credential persistence across an ordered list of tiers
pub struct TieredStore {
    tiers: Vec<Box<dyn CredentialTier>>,
}

impl TieredStore {
    pub fn from_tiers(tiers: Vec<Box<dyn CredentialTier>>) -> Self {
        Self { tiers }
    }

    /// Durable store first, local fallback second
    pub fn new(
        durable: Arc<dyn DurableTokenStore>,
        fallback: Arc<dyn LocalFallbackStore>,
        provider: impl Into<String>,
    ) -> Self {
        Self::from_tiers(vec![
            Box::new(DurableTier::new(durable, provider)),
            Box::new(FallbackTier::new(fallback)),
        ])
    }

    /// Load from the first tier that has a credential
    ///
    /// The refresh token found is mirrored into the lower tiers. Errors fall
    /// through to the next tier; no tier having data is `None`.
    pub async fn load(&self) -> Option<Credential> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.load().await {
                Ok(Some(credential)) => {
                    debug!("Loaded credential from {} tier", tier.name());
                    if let Some(refresh_token) = &credential.refresh_token {
                        for lower in &self.tiers[index + 1..] {
                            if let Err(e) = lower.save_refresh_token(refresh_token).await {
                                warn!("Failed to mirror refresh token into {} tier: {}", lower.name(), e);
                            }
                        }
                    }
                    return Some(credential);
                }
                Ok(None) => debug!("No credential in {} tier", tier.name()),
                Err(e) => warn!("Failed to read {} tier: {}", tier.name(), e),
            }
        }
        None
    }

    /// First refresh token any tier knows about
    pub async fn load_refresh_token(&self) -> Option<String> {
        for tier in &self.tiers {
            match tier.load_refresh_token().await {
                Ok(Some(token)) => return Some(token),
                Ok(None) => {}
                Err(e) => warn!("Failed to read refresh token from {} tier: {}", tier.name(), e),
            }
        }
        None
    }

    /// Write to every tier regardless of earlier failures
    ///
    /// Returns how many tiers accepted the write.
    pub async fn save(&self, credential: &Credential) -> usize {
        let mut written = 0;
        for tier in &self.tiers {
            match tier.save(credential).await {
                Ok(()) => written += 1,
                Err(e) => warn!("Failed to write credential to {} tier: {}", tier.name(), e),
            }
        }
        written
    }

    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                warn!("Failed to clear {} tier: {}", tier.name(), e);
            }
        }
    }
}
