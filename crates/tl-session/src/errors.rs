use thiserror::Error;

/// Device session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Playback SDK error: {0}")]
    Sdk(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
