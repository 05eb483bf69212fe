use thiserror::Error;

/// Playback credential error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("OAuth invalid_grant - refresh token is no longer accepted")]
    OAuthInvalidGrant,

    #[error("OAuth error {error}: {description}")]
    OAuth { error: String, description: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for the storage lock")]
    LockTimeout,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// The refresh token itself is dead; retrying cannot succeed.
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            Self::OAuthInvalidGrant => true,
            Self::OAuth { error, .. } => error == "invalid_grant",
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
