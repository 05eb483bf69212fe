use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TOKEN_EXPIRY_BUFFER;

/// Access credential bound to the streaming device
///
/// Access token and expiry always travel together; an absent credential is
/// `Option::None`, never a half-filled record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Credential expiring `lifetime` from now, clamped to the latest
    /// representable instant
    pub fn new(access_token: String, refresh_token: Option<String>, lifetime: Duration) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: expiry_after(Utc::now(), lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Like [`Credential::new`], but `None` when the lifetime overflows
    pub fn try_new(
        access_token: String,
        refresh_token: Option<String>,
        lifetime: Duration,
    ) -> Option<Self> {
        let expires_at = expiry_after(Utc::now(), lifetime)?;
        Some(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Build from an absolute expiry in epoch milliseconds
    pub fn from_expiry_millis(
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: i64,
    ) -> Option<Self> {
        let expires_at = Utc.timestamp_millis_opt(expires_at_ms).single()?;
        Some(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    pub fn expires_at_millis(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }

    /// Time left before literal expiry, `None` once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .signed_duration_since(now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Valid means usable for at least the expiry buffer
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(buffer())
            .is_some_and(|edge| now < edge)
    }

    /// A refresh is due inside the buffer window but before literal expiry
    pub fn is_refresh_due_at(&self, now: DateTime<Utc>) -> bool {
        let left = self.expires_at.signed_duration_since(now);
        left > chrono::Duration::zero() && left < buffer()
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> Option<DateTime<Utc>> {
    now.checked_add_signed(chrono::Duration::from_std(lifetime).ok()?)
}

fn buffer() -> chrono::Duration {
    chrono::Duration::from_std(TOKEN_EXPIRY_BUFFER).unwrap_or(chrono::Duration::minutes(5))
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
