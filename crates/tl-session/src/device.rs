use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tl_auth::{CredentialChange, CredentialManager, CredentialView, RefreshOutcome};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SessionConfig;
use crate::errors::Result;
use crate::publisher::{StatusPublisher, StatusSource};
use crate::sdk::{EventSink, PlaybackSdk, Player, SdkEvent};
use crate::status::{ConnectionSnapshot, ConnectionStatus};

type ReadyListener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
enum PlayerSlot {
    #[default]
    Empty,
    /// Creation attempt in progress, tagged so a stale attempt can tell
    Creating(u64),
    Active { attempt: u64, player: Arc<dyn Player> },
}

impl PlayerSlot {
    fn is_attempt(&self, attempt: u64) -> bool {
        match self {
            Self::Empty => false,
            Self::Creating(current) | Self::Active { attempt: current, .. } => *current == attempt,
        }
    }
}

#[derive(Default)]
struct DeviceState {
    device_id: Option<String>,
    playing: bool,
    player: PlayerSlot,
    attempts: u64,
}

/// Handshake state with the playback SDK
///
/// Reads the credential through [`CredentialView`] and never mutates it. When
/// the credential is cleared the session drops its device, stops the status
/// loop, and publishes `Disconnected`.
pub struct DeviceSession {
    config: SessionConfig,
    credentials: Arc<CredentialManager>,
    sdk: Mutex<Option<Arc<dyn PlaybackSdk>>>,
    publisher: StatusPublisher,
    state: Mutex<DeviceState>,
    ready_listeners: Mutex<Vec<ReadyListener>>,
    this: Weak<Self>,
}

impl DeviceSession {
    /// Create the session; `sdk` is `None` until the SDK runtime is loaded
    pub fn new(
        config: SessionConfig,
        credentials: Arc<CredentialManager>,
        sdk: Option<Arc<dyn PlaybackSdk>>,
    ) -> Arc<Self> {
        let session = Arc::new_cyclic(|this| Self {
            publisher: StatusPublisher::new(config.status_interval),
            config,
            credentials,
            sdk: Mutex::new(sdk),
            state: Mutex::new(DeviceState::default()),
            ready_listeners: Mutex::new(Vec::new()),
            this: this.clone(),
        });

        let weak = Arc::downgrade(&session);
        session.credentials.on_credential_changed(move |change| {
            if let Some(session) = weak.upgrade() {
                session.on_credential_change(change);
            }
        });

        session.refresh_snapshot();
        session
    }

    /// Register a callback fired with the device id whenever the device is ready
    pub fn on_device_ready<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.ready_listeners.lock().push(Arc::new(listener));
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.publisher.subscribe()
    }

    /// Last published snapshot
    pub fn current(&self) -> ConnectionSnapshot {
        self.publisher.current()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.current().status
    }

    pub fn device_id(&self) -> Option<String> {
        self.state.lock().device_id.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn has_player(&self) -> bool {
        matches!(self.state.lock().player, PlayerSlot::Active { .. })
    }

    pub fn is_status_loop_running(&self) -> bool {
        self.publisher.is_running()
    }

    /// Compute the snapshot from the current credential and device state
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let credential = self.credentials.credential();
        let state = self.state.lock();
        ConnectionSnapshot::compute(
            credential.as_ref(),
            state.device_id.as_deref(),
            state.playing,
            Utc::now(),
        )
    }

    fn refresh_snapshot(&self) {
        self.publisher.publish(self.snapshot());
    }

    /// The SDK runtime finished loading
    pub async fn attach_sdk(&self, sdk: Arc<dyn PlaybackSdk>) -> Result<bool> {
        *self.sdk.lock() = Some(sdk);
        self.ensure_player().await
    }

    /// Create and connect the player if possible
    ///
    /// Deferred (returns `Ok(false)`) without a valid credential or SDK. A call
    /// while a player exists or is being created does nothing.
    #[instrument(skip(self))]
    pub async fn ensure_player(&self) -> Result<bool> {
        if !self.credentials.is_valid() {
            debug!("No valid credential yet; deferring player creation");
            return Ok(false);
        }
        let Some(sdk) = self.sdk.lock().clone() else {
            debug!("Playback SDK not loaded; deferring player creation");
            return Ok(false);
        };

        let attempt = {
            let mut state = self.state.lock();
            if !matches!(state.player, PlayerSlot::Empty) {
                return Ok(false);
            }
            state.attempts += 1;
            state.player = PlayerSlot::Creating(state.attempts);
            state.attempts
        };
        self.refresh_snapshot();

        info!("Creating playback device '{}'", self.config.device_name);
        let tokens: Arc<dyn CredentialView> = self.credentials.clone();
        let events = EventSink::new(self.this.clone(), attempt);
        let created = sdk
            .create_player(&self.config.device_name, tokens, events)
            .await;

        let player = match created {
            Ok(player) => player,
            Err(e) => {
                {
                    let mut state = self.state.lock();
                    if state.player.is_attempt(attempt) {
                        state.player = PlayerSlot::Empty;
                    }
                }
                error!("Failed to create playback device: {}", e);
                return Err(e);
            }
        };

        let installed = {
            let mut state = self.state.lock();
            if state.player.is_attempt(attempt) {
                state.player = PlayerSlot::Active {
                    attempt,
                    player: player.clone(),
                };
                true
            } else {
                false
            }
        };
        if !installed {
            debug!("Session reset while the player was being created; discarding it");
            player.disconnect().await;
            return Ok(false);
        }

        match player.connect().await {
            Ok(true) => info!("Playback device connecting"),
            Ok(false) => warn!("Playback SDK refused to connect the device"),
            Err(e) => warn!("Playback device failed to connect: {}", e),
        }
        Ok(true)
    }

    /// Handle one SDK event from the player created by `attempt`
    pub(crate) fn dispatch(&self, attempt: u64, event: SdkEvent) {
        if !self.state.lock().player.is_attempt(attempt) {
            debug!(attempt, "Ignoring event from a discarded player: {:?}", event);
            return;
        }

        match event {
            SdkEvent::Ready { device_id } => {
                {
                    let mut state = self.state.lock();
                    if !state.player.is_attempt(attempt) {
                        return;
                    }
                    state.device_id = Some(device_id.clone());
                }
                info!(%device_id, "Playback device ready");
                self.refresh_snapshot();

                let listeners = self.ready_listeners.lock().clone();
                for listener in listeners {
                    listener(&device_id);
                }
                self.start_status_loop();
            }
            SdkEvent::NotReady { device_id } => {
                // The device may come back; keep the session.
                warn!(%device_id, "Playback device went offline");
            }
            SdkEvent::InitializationError(message) => {
                error!("Playback SDK initialization error: {}", message);
            }
            SdkEvent::AuthenticationError(message) => {
                error!("Playback SDK authentication error: {}", message);
            }
            SdkEvent::AccountError(message) => {
                error!("Playback SDK account error: {}", message);
            }
            SdkEvent::PlayerStateChanged(playback) => {
                let playing = playback.is_some_and(|p| !p.paused);
                self.state.lock().playing = playing;
                self.refresh_snapshot();
            }
        }
    }

    /// Start (or restart) the status loop
    pub fn start_status_loop(&self) {
        let source: Weak<dyn StatusSource> = self.this.clone();
        self.publisher.start(source);
    }

    pub fn stop_status_loop(&self) {
        self.publisher.stop();
    }

    /// Drop the device and stop the loop without touching the credential
    pub async fn disconnect(&self) {
        if let Some(player) = self.reset() {
            player.disconnect().await;
        }
    }

    fn reset(&self) -> Option<Arc<dyn Player>> {
        let player = {
            let mut state = self.state.lock();
            state.device_id = None;
            state.playing = false;
            match std::mem::take(&mut state.player) {
                PlayerSlot::Active { player, .. } => Some(player),
                PlayerSlot::Empty | PlayerSlot::Creating(_) => None,
            }
        };
        self.publisher.stop();
        self.refresh_snapshot();
        player
    }

    fn on_credential_change(&self, change: CredentialChange) {
        match change {
            CredentialChange::Cleared(reason) => {
                info!("Credential cleared ({:?}); tearing down device session", reason);
                if let Some(player) = self.reset() {
                    match tokio::runtime::Handle::try_current() {
                        Ok(handle) => {
                            handle.spawn(async move { player.disconnect().await });
                        }
                        Err(_) => warn!("No runtime to disconnect the player on"),
                    }
                }
            }
            CredentialChange::Acquired => {
                self.refresh_snapshot();
                let (Some(session), Ok(handle)) =
                    (self.this.upgrade(), tokio::runtime::Handle::try_current())
                else {
                    return;
                };
                handle.spawn(async move {
                    if let Err(e) = session.ensure_player().await {
                        warn!("Deferred player creation failed: {}", e);
                    }
                });
            }
            CredentialChange::Refreshed => self.refresh_snapshot(),
        }
    }
}

#[async_trait::async_trait]
impl StatusSource for DeviceSession {
    fn snapshot(&self) -> ConnectionSnapshot {
        DeviceSession::snapshot(self)
    }

    async fn on_tick(&self) {
        match self.credentials.refresh_if_due().await {
            RefreshOutcome::NotDue | RefreshOutcome::AlreadyInFlight => {}
            RefreshOutcome::Refreshed => debug!("Tick refreshed the credential"),
            RefreshOutcome::Discarded => debug!("Tick refresh discarded"),
            RefreshOutcome::Transient(reason) => {
                warn!("Token refresh failed, retrying next tick: {}", reason)
            }
            RefreshOutcome::Fatal(failure) => debug!("Token refresh impossible: {:?}", failure),
        }

        if self.config.probe_connectivity {
            let connectivity = self.credentials.check_remote_connectivity().await;
            debug!("Connectivity: {:?}", connectivity);
        }

        self.refresh_snapshot();

        if self.credentials.is_valid() && !self.has_player() {
            if let Err(e) = self.ensure_player().await {
                warn!("Player creation on tick failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("config", &self.config)
            .field("device_id", &self.device_id())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
