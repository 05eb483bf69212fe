use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument};

use crate::errors::{AuthError, Result};
use crate::store::{DurableTokenStore, StoredTokens};

/// On-disk representation of one provider's credential
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    saved_at: DateTime<Utc>,
}

/// File-based durable token store
///
/// Stores one JSON document per provider.
///
/// # Directory Structure
/// ```text
/// ~/.config/tunelink/tokens/
/// ├── lock                   # Advisory lock file
/// └── providers/
///     └── spotify.json       # Credential for the provider
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    providers_dir: PathBuf,
    lock_file: PathBuf,
}

impl FileTokenStore {
    /// Create a new file-based token store rooted at `storage_dir`
    pub async fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let providers_dir = storage_dir.join("providers");
        let lock_file = storage_dir.join("lock");

        fs::create_dir_all(&providers_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&storage_dir, perms.clone())?;
            std::fs::set_permissions(&providers_dir, perms)?;
        }

        Ok(Self {
            providers_dir,
            lock_file,
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "tunelink").ok_or_else(|| {
            AuthError::Storage("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("tokens"))
    }

    fn provider_path(&self, provider: &str) -> PathBuf {
        self.providers_dir.join(format!("{}.json", provider))
    }

    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AuthError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn write_atomic(&self, path: &Path, contents: String) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, contents).await?;

        let file = std::fs::File::open(&temp_path)?;
        file.sync_all()?;

        fs::rename(&temp_path, path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl DurableTokenStore for FileTokenStore {
    #[instrument(skip(self))]
    async fn get(&self, provider: &str) -> Result<Option<StoredTokens>> {
        let path = self.provider_path(provider);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let file: TokenFile = serde_json::from_str(&content)
            .map_err(|e| AuthError::Storage(format!("Invalid token file: {}", e)))?;

        debug!("Loaded stored credential saved at {}", file.saved_at);
        Ok(Some(StoredTokens {
            access_token: file.access_token,
            refresh_token: file.refresh_token,
            expires_at_secs: file.expires_at.timestamp(),
        }))
    }

    #[instrument(skip(self, access_token, refresh_token))]
    async fn save(
        &self,
        provider: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at_ms: i64,
    ) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let expires_at = Utc
            .timestamp_millis_opt(expires_at_ms)
            .single()
            .ok_or_else(|| AuthError::Storage(format!("Expiry out of range: {}", expires_at_ms)))?;
        let file = TokenFile {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at,
            saved_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&file)?;
        self.write_atomic(&self.provider_path(provider), json).await
    }

    #[instrument(skip(self))]
    async fn clear(&self, provider: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let path = self.provider_path(provider);
        if path.exists() {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }
}
