use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tl_auth::Credential;

/// UI-facing connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    /// A credential exists but is not usable until it is refreshed
    TokenPending,
    /// Credential usable, waiting for the device to report ready
    DeviceConnecting,
    Ready,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "Disconnected",
            Self::TokenPending => "Waiting for token",
            Self::DeviceConnecting => "Connecting device",
            Self::Ready => "Connected",
        };
        f.write_str(text)
    }
}

/// Everything the UI shows about the connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub device_id: Option<String>,
    /// Remaining credential lifetime
    pub expires_in: Option<Duration>,
    /// Best-effort mirror of the player's paused flag
    pub playing: bool,
}

impl ConnectionSnapshot {
    pub fn compute(
        credential: Option<&Credential>,
        device_id: Option<&str>,
        playing: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let status = derive_status(credential, device_id, now);
        Self {
            status,
            device_id: device_id.map(str::to_string),
            expires_in: credential.and_then(|c| c.remaining_at(now)),
            playing: playing && status == ConnectionStatus::Ready,
        }
    }

    /// Status line, e.g. `Connected (expires in 42m)`
    pub fn label(&self) -> String {
        match (self.status, self.expires_in) {
            (ConnectionStatus::Disconnected, _) | (_, None) => self.status.to_string(),
            (status, Some(left)) => format!("{} (expires in {})", status, format_remaining(left)),
        }
    }
}

/// Derive the connection status from credential and device state
pub fn derive_status(
    credential: Option<&Credential>,
    device_id: Option<&str>,
    now: DateTime<Utc>,
) -> ConnectionStatus {
    let Some(credential) = credential else {
        return ConnectionStatus::Disconnected;
    };

    if credential.is_expired_at(now) {
        return ConnectionStatus::TokenPending;
    }

    match device_id {
        Some(_) => ConnectionStatus::Ready,
        None if credential.is_valid_at(now) => ConnectionStatus::DeviceConnecting,
        None => ConnectionStatus::TokenPending,
    }
}

fn format_remaining(left: Duration) -> String {
    let secs = left.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_with(now: DateTime<Utc>, secs: i64) -> Credential {
        Credential {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: now + chrono::Duration::seconds(secs),
        }
    }

    #[test]
    fn test_derive_status() {
        let now = Utc::now();
        let valid = credential_with(now, 3600);
        let in_buffer = credential_with(now, 60);
        let expired = credential_with(now, -1);

        assert_eq!(derive_status(None, None, now), ConnectionStatus::Disconnected);
        assert_eq!(
            derive_status(None, Some("device"), now),
            ConnectionStatus::Disconnected
        );
        assert_eq!(
            derive_status(Some(&valid), None, now),
            ConnectionStatus::DeviceConnecting
        );
        assert_eq!(
            derive_status(Some(&valid), Some("device"), now),
            ConnectionStatus::Ready
        );
        assert_eq!(
            derive_status(Some(&in_buffer), Some("device"), now),
            ConnectionStatus::Ready
        );
        assert_eq!(
            derive_status(Some(&in_buffer), None, now),
            ConnectionStatus::TokenPending
        );
        assert_eq!(
            derive_status(Some(&expired), Some("device"), now),
            ConnectionStatus::TokenPending
        );
    }

    #[test]
    fn test_labels() {
        let now = Utc::now();
        let credential = credential_with(now, 42 * 60 + 30);

        let ready = ConnectionSnapshot::compute(Some(&credential), Some("device"), true, now);
        assert_eq!(ready.label(), "Connected (expires in 42m)");
        assert!(ready.playing);

        let connecting = ConnectionSnapshot::compute(Some(&credential), None, true, now);
        assert_eq!(connecting.status, ConnectionStatus::DeviceConnecting);
        assert!(!connecting.playing);

        assert_eq!(ConnectionSnapshot::default().label(), "Disconnected");
        assert_eq!(format_remaining(Duration::from_secs(7260)), "2h 1m");
        assert_eq!(format_remaining(Duration::from_secs(9)), "9s");
    }
}
