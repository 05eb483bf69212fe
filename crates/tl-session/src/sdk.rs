//! Interface to the remote playback SDK.
//!
//! The SDK reports back through an [`EventSink`]; every callback it has is one
//! [`SdkEvent`] variant, handled by a single dispatch function on the session.

use std::sync::{Arc, Weak};

use tl_auth::CredentialView;

use crate::device::DeviceSession;
use crate::errors::Result;

/// Playback state carried by `player_state_changed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    pub paused: bool,
    pub track_uri: Option<String>,
    pub position_ms: u64,
}

/// Everything the SDK can tell the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    InitializationError(String),
    AuthenticationError(String),
    AccountError(String),
    /// `None` when playback moved to another device
    PlayerStateChanged(Option<PlaybackState>),
}

/// Handle the SDK uses to deliver events to the session that created it
///
/// Bound to one player creation attempt; events from a player the session
/// has since dropped are ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: Weak<DeviceSession>,
    attempt: u64,
}

impl EventSink {
    pub(crate) fn new(session: Weak<DeviceSession>, attempt: u64) -> Self {
        Self { session, attempt }
    }

    /// Deliver an event; silently dropped once the session is gone
    pub fn emit(&self, event: SdkEvent) {
        if let Some(session) = self.session.upgrade() {
            session.dispatch(self.attempt, event);
        }
    }
}

/// Player instance created by the SDK
#[async_trait::async_trait]
pub trait Player: Send + Sync {
    /// Ask the SDK to connect; `false` means it refused
    async fn connect(&self) -> Result<bool>;

    async fn disconnect(&self);
}

/// The playback SDK runtime
#[async_trait::async_trait]
pub trait PlaybackSdk: Send + Sync {
    /// Construct a player announcing itself as `name`
    ///
    /// `tokens` must be read whenever the SDK needs a token so refreshed
    /// credentials are picked up without recreating the player.
    async fn create_player(
        &self,
        name: &str,
        tokens: Arc<dyn CredentialView>,
        events: EventSink,
    ) -> Result<Arc<dyn Player>>;
}
