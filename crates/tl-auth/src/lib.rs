//! Playback credential lifecycle for the streaming provider
//!
//! This crate owns the OAuth-style access credential the playback device runs
//! on: it acquires it, persists it across restarts, tells whether it is still
//! usable, and refreshes it shortly before it expires.
//!
//! # Credential Lifecycle
//!
//! 1. Acquisition, either from a `#token=...` URL fragment or from storage
//! 2. Persistence to the durable store, mirrored into the local fallback store
//! 3. Validity tracking with a 5 minute safety buffer before literal expiry
//! 4. Refresh through the `refresh_token` grant while inside that buffer
//! 5. Clearing on logout, `invalid_grant`, or a 401/403 from the provider
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tl_auth::{
//!     AuthClient, AuthConfig, CredentialManager, CredentialView, FileFallbackStore,
//!     FileTokenStore, StaticSettings, TieredStore,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage_dir = FileTokenStore::default_storage_dir()?;
//! let durable = Arc::new(FileTokenStore::new(&storage_dir).await?);
//! let fallback = Arc::new(FileFallbackStore::open(storage_dir.join("fallback.json")));
//!
//! let config = AuthConfig::default();
//! let store = TieredStore::new(durable, fallback, config.provider.clone());
//! let settings = Arc::new(StaticSettings::new().with("spotify", "client_id", "my-client"));
//! let manager = CredentialManager::new(AuthClient::new(config)?, store, settings);
//!
//! if manager.acquire_from_storage().await.is_none() {
//!     manager.acquire_from_fragment("#token=abc%20def").await;
//! }
//!
//! if manager.is_valid() {
//!     println!("Token usable for {:?}", manager.expires_in());
//! }
//!
//! // Call periodically; does nothing until the token enters the buffer
//! let _outcome = manager.refresh_if_due().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens are never logged; `Credential`'s `Debug` output is redacted
//! - Storage failures are logged and fall through to the next tier
//! - Only `invalid_grant` and 401/403 probe answers destroy a credential

pub mod client;
pub mod config;
pub mod credential;
pub mod errors;
pub mod fallback;
pub mod file_store;
pub mod fragment;
pub mod manager;
pub mod models;
pub mod settings;
pub mod store;
pub mod tiers;

// Re-export main types
pub use client::{AuthClient, ProbeResult};
pub use config::{AuthConfig, DEFAULT_TOKEN_LIFETIME, TOKEN_EXPIRY_BUFFER};
pub use credential::Credential;
pub use errors::{AuthError, Result};
pub use fallback::{FileFallbackStore, LocalFallbackStore, MemoryFallbackStore};
pub use file_store::FileTokenStore;
pub use fragment::{AddressBar, NoAddressBar};
pub use manager::{
    ClearReason, Connectivity, CredentialChange, CredentialManager, CredentialView,
    RefreshFailure, RefreshOutcome, RefreshState,
};
pub use settings::{Settings, StaticSettings};
pub use store::{DurableTokenStore, MemoryTokenStore, StoredTokens};
pub use tiers::{CredentialTier, DurableTier, FallbackTier, TieredStore};
