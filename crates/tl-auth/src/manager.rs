//! Credential state and the refresh orchestrator.
//!
//! [`CredentialManager`] is the only writer of the in-process credential. Every
//! update goes through the storage tiers first and is published in memory
//! last, so readers only ever see a complete previous or a complete new
//! credential.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::client::{AuthClient, ProbeResult};
use crate::credential::Credential;
use crate::fragment::{self, AddressBar, NoAddressBar};
use crate::settings::Settings;
use crate::tiers::TieredStore;

/// Refresh orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    FailedTransient,
    FailedFatal,
}

/// Why a refresh cannot succeed without outside intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    MissingRefreshToken,
    MissingClientId,
    /// The provider no longer accepts the refresh token
    InvalidGrant,
}

/// Result of one refresh trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No credential, or not inside the refresh window
    NotDue,
    /// Another refresh is already running
    AlreadyInFlight,
    Refreshed,
    /// The credential changed while the request was in flight; result dropped
    Discarded,
    /// Network or provider hiccup; retried on the next check
    Transient(String),
    Fatal(RefreshFailure),
}

/// Result of the remote connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The provider accepted the token
    Live,
    /// No locally valid token; nothing was sent
    NoValidToken,
    /// The provider rejected the token and the credential was cleared
    Revoked,
    /// No conclusion could be drawn; credential untouched
    Unknown,
}

impl Connectivity {
    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}

/// Why the credential was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Logout,
    InvalidGrant,
    Revoked,
}

/// Notification sent to credential listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialChange {
    Acquired,
    Refreshed,
    Cleared(ClearReason),
}

/// Read-only view of the credential for collaborators that must not mutate it
pub trait CredentialView: Send + Sync {
    /// Current in-memory access token, read on every call
    fn access_token(&self) -> Option<String>;

    fn has_credential(&self) -> bool;

    fn is_valid(&self) -> bool;

    /// Remaining lifetime before literal expiry
    fn expires_in(&self) -> Option<Duration>;
}

type CredentialListener = Arc<dyn Fn(CredentialChange) + Send + Sync>;

#[derive(Debug, Default)]
struct State {
    credential: Option<Credential>,
    /// Bumped on every replacement or clear
    generation: u64,
    refresh: RefreshState,
    /// Fatal failure recorded for a generation; not retried until it changes
    fatal: Option<(u64, RefreshFailure)>,
}

/// Owner of the credential and its refresh lifecycle
pub struct CredentialManager {
    client: AuthClient,
    store: TieredStore,
    settings: Arc<dyn Settings>,
    address_bar: Arc<dyn AddressBar>,
    state: Mutex<State>,
    listeners: Mutex<Vec<CredentialListener>>,
}

impl CredentialManager {
    pub fn new(client: AuthClient, store: TieredStore, settings: Arc<dyn Settings>) -> Self {
        Self {
            client,
            store,
            settings,
            address_bar: Arc::new(NoAddressBar),
            state: Mutex::new(State::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn with_address_bar(mut self, address_bar: Arc<dyn AddressBar>) -> Self {
        self.address_bar = address_bar;
        self
    }

    /// Register a callback fired after every credential change
    pub fn on_credential_changed<F>(&self, listener: F)
    where
        F: Fn(CredentialChange) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Snapshot of the current credential
    pub fn credential(&self) -> Option<Credential> {
        self.state.lock().credential.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.state.lock().refresh
    }

    /// Accept a token delivered as `#token=<percent-encoded>`
    ///
    /// Never fails; a fragment without a token acquires nothing.
    #[instrument(skip_all)]
    pub async fn acquire_from_fragment(&self, fragment: &str) -> Option<Credential> {
        let access_token = fragment::parse_token(fragment)?;

        info!("Acquired access token from URL fragment");
        let lifetime = self.client.config().default_lifetime;
        let credential = self.persist(access_token, lifetime, None).await;
        self.address_bar.clear_fragment();
        Some(credential)
    }

    /// Load the credential persisted by an earlier run
    #[instrument(skip_all)]
    pub async fn acquire_from_storage(&self) -> Option<Credential> {
        let Some(credential) = self.store.load().await else {
            debug!("No stored credential");
            return None;
        };

        info!(
            "Restored credential expiring at {} (valid: {})",
            credential.expires_at,
            credential.is_valid()
        );
        self.publish(credential.clone(), CredentialChange::Acquired);
        Some(credential)
    }

    /// Store a new access token in every tier, then make it current
    ///
    /// Without a new refresh token the previously known one is kept.
    #[instrument(skip(self, access_token, refresh_token))]
    pub async fn persist(
        &self,
        access_token: String,
        lifetime: Duration,
        refresh_token: Option<String>,
    ) -> Credential {
        let refresh_token = match refresh_token {
            Some(token) => Some(token),
            None => match self.credential().and_then(|c| c.refresh_token) {
                Some(token) => Some(token),
                None => self.store.load_refresh_token().await,
            },
        };

        let credential = Credential::new(access_token, refresh_token, lifetime);
        let written = self.store.save(&credential).await;
        if written == 0 {
            warn!("Credential could not be persisted; it will not survive a restart");
        }

        self.publish(credential.clone(), CredentialChange::Acquired);
        credential
    }

    /// Forget the credential everywhere
    pub async fn logout(&self) {
        info!("Logging out");
        self.clear(ClearReason::Logout).await;
    }

    async fn clear(&self, reason: ClearReason) {
        {
            let mut state = self.state.lock();
            state.credential = None;
            state.generation += 1;
        }
        self.store.clear().await;
        self.notify(CredentialChange::Cleared(reason));
    }

    fn publish(&self, credential: Credential, change: CredentialChange) {
        {
            let mut state = self.state.lock();
            state.credential = Some(credential);
            state.generation += 1;
        }
        self.notify(change);
    }

    /// Publish only if nothing replaced or cleared the credential since `generation`
    fn publish_if_current(&self, generation: u64, credential: Credential) -> bool {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return false;
            }
            state.credential = Some(credential);
            state.generation += 1;
        }
        self.notify(CredentialChange::Refreshed);
        true
    }

    fn notify(&self, change: CredentialChange) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(change);
        }
    }

    /// Ask the provider whether the current token still works
    ///
    /// 401/403 clears the credential; any other failure leaves it alone.
    #[instrument(skip_all)]
    pub async fn check_remote_connectivity(&self) -> Connectivity {
        let (access_token, generation) = {
            let state = self.state.lock();
            match &state.credential {
                Some(credential) if credential.is_valid() => {
                    (credential.access_token.clone(), state.generation)
                }
                _ => return Connectivity::NoValidToken,
            }
        };

        match self.client.probe(&access_token).await {
            ProbeResult::Valid => Connectivity::Live,
            ProbeResult::Unknown => Connectivity::Unknown,
            ProbeResult::Rejected => {
                if self.generation() != generation {
                    debug!("Credential changed during probe; ignoring rejection");
                    return Connectivity::Unknown;
                }
                warn!("Provider rejected the access token; clearing credential");
                self.clear(ClearReason::Revoked).await;
                Connectivity::Revoked
            }
        }
    }

    /// Refresh the credential if it is inside the expiry buffer
    ///
    /// Only one refresh runs at a time; concurrent triggers return
    /// [`RefreshOutcome::AlreadyInFlight`].
    pub async fn refresh_if_due(&self) -> RefreshOutcome {
        let generation = {
            let mut state = self.state.lock();
            let due = state
                .credential
                .as_ref()
                .is_some_and(|c| c.is_refresh_due_at(Utc::now()));
            if !due {
                return RefreshOutcome::NotDue;
            }
            let current = state.generation;
            if let Some((_, failure)) = state.fatal.filter(|(failed, _)| *failed == current) {
                debug!("Refresh already failed for this credential: {:?}", failure);
                return RefreshOutcome::Fatal(failure);
            }
            if state.refresh == RefreshState::InFlight {
                debug!("Refresh already in flight");
                return RefreshOutcome::AlreadyInFlight;
            }
            state.refresh = RefreshState::InFlight;
            state.generation
        };

        let guard = InFlightGuard { state: &self.state };
        let outcome = self.run_refresh(generation).await;
        let next = match &outcome {
            RefreshOutcome::Refreshed => RefreshState::Succeeded,
            RefreshOutcome::Transient(_) => RefreshState::FailedTransient,
            RefreshOutcome::Fatal(failure) => {
                self.state.lock().fatal = Some((generation, *failure));
                RefreshState::FailedFatal
            }
            _ => RefreshState::Idle,
        };
        guard.finish(next);
        outcome
    }

    #[instrument(skip(self))]
    async fn run_refresh(&self, generation: u64) -> RefreshOutcome {
        let Some(refresh_token) = self.store.load_refresh_token().await else {
            warn!("Credential is about to expire but no refresh token is stored");
            return RefreshOutcome::Fatal(RefreshFailure::MissingRefreshToken);
        };

        let config = self.client.config();
        let client_id = self
            .settings
            .get_setting(&config.settings_category, &config.client_id_key, None)
            .await
            .filter(|id| !id.is_empty());
        let Some(client_id) = client_id else {
            warn!("Credential is about to expire but no client id is configured");
            return RefreshOutcome::Fatal(RefreshFailure::MissingClientId);
        };

        info!("Refreshing access token before expiry");
        let token = match self.client.refresh_token(&refresh_token, &client_id).await {
            Ok(token) => token,
            Err(e) if e.is_invalid_grant() => {
                if self.generation() != generation {
                    return RefreshOutcome::Discarded;
                }
                warn!("Refresh token rejected ({}); clearing credential", e);
                self.clear(ClearReason::InvalidGrant).await;
                return RefreshOutcome::Fatal(RefreshFailure::InvalidGrant);
            }
            Err(e) => {
                warn!("Token refresh failed, will retry on next check: {}", e);
                return RefreshOutcome::Transient(e.to_string());
            }
        };

        if self.generation() != generation {
            debug!("Credential changed during refresh; discarding result");
            return RefreshOutcome::Discarded;
        }

        let Some(credential) = Credential::try_new(
            token.access_token,
            token.refresh_token.or(Some(refresh_token)),
            Duration::from_secs(token.expires_in),
        ) else {
            warn!(
                "Token endpoint returned an out-of-range expires_in ({}); will retry on next check",
                token.expires_in
            );
            return RefreshOutcome::Transient(format!(
                "expires_in out of range: {}",
                token.expires_in
            ));
        };
        self.store.save(&credential).await;

        if !self.publish_if_current(generation, credential) {
            // Our write landed after a logout or a newer acquisition; put the
            // tiers back in line with memory.
            match self.credential() {
                Some(current) => {
                    self.store.save(&current).await;
                }
                None => self.store.clear().await,
            }
            return RefreshOutcome::Discarded;
        }

        info!("Access token refreshed");
        RefreshOutcome::Refreshed
    }
}

/// Resets the in-flight marker if a refresh future is dropped mid-way
struct InFlightGuard<'a> {
    state: &'a Mutex<State>,
}

impl InFlightGuard<'_> {
    fn finish(self, next: RefreshState) {
        self.state.lock().refresh = next;
        std::mem::forget(self);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.refresh == RefreshState::InFlight {
            state.refresh = RefreshState::Idle;
        }
    }
}

impl CredentialView for CredentialManager {
    fn access_token(&self) -> Option<String> {
        self.state
            .lock()
            .credential
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    fn has_credential(&self) -> bool {
        self.state.lock().credential.is_some()
    }

    fn is_valid(&self) -> bool {
        self.state
            .lock()
            .credential
            .as_ref()
            .is_some_and(Credential::is_valid)
    }

    fn expires_in(&self) -> Option<Duration> {
        self.state
            .lock()
            .credential
            .as_ref()
            .and_then(|c| c.remaining_at(Utc::now()))
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
