use std::time::Duration;

/// Interval between status publisher ticks
pub const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Name the playback device announces itself with
pub const DEVICE_NAME: &str = "tunelink";

/// Configuration for the device session and its status loop
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device name shown in the provider's device picker
    pub device_name: String,

    /// Status publisher period
    pub status_interval: Duration,

    /// Also probe the provider with the token on every tick
    pub probe_connectivity: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            status_interval: STATUS_INTERVAL,
            probe_connectivity: true,
        }
    }
}
