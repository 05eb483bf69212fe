//! Playback device session on top of the `tl-auth` credential
//!
//! - [`DeviceSession`] binds the credential to the playback SDK, tracks the
//!   device id, and tears everything down when the credential goes away
//! - [`StatusPublisher`] republishes a [`ConnectionSnapshot`] every tick and
//!   triggers the credential's refresh check
//! - [`ScheduledTask`] is the single-instance periodic task both rely on

pub mod config;
pub mod device;
pub mod errors;
pub mod publisher;
pub mod sdk;
pub mod status;
pub mod task;

pub use config::SessionConfig;
pub use device::DeviceSession;
pub use errors::{Result, SessionError};
pub use publisher::{StatusPublisher, StatusSource};
pub use sdk::{EventSink, PlaybackSdk, PlaybackState, Player, SdkEvent};
pub use status::{derive_status, ConnectionSnapshot, ConnectionStatus};
pub use task::ScheduledTask;
