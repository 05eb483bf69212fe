use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tl_auth::fallback::keys;
use tl_auth::{
    AuthClient, AuthConfig, CredentialManager, CredentialView, LocalFallbackStore,
    MemoryFallbackStore, MemoryTokenStore, RefreshFailure, RefreshOutcome, StaticSettings,
    TieredStore,
};
use tl_session::{
    ConnectionStatus, DeviceSession, EventSink, PlaybackSdk, PlaybackState, Player, SdkEvent,
    SessionConfig, StatusSource,
};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct FakePlayer {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait::async_trait]
impl Player for FakePlayer {
    async fn connect(&self) -> tl_session::Result<bool> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeSdk {
    created: AtomicUsize,
    sink: Mutex<Option<EventSink>>,
    tokens: Mutex<Option<Arc<dyn CredentialView>>>,
    players: Mutex<Vec<Arc<FakePlayer>>>,
}

impl FakeSdk {
    fn emit(&self, event: SdkEvent) {
        let sink = self.sink.lock().clone().expect("player created");
        sink.emit(event);
    }

    fn last_player(&self) -> Arc<FakePlayer> {
        self.players.lock().last().cloned().expect("player created")
    }
}

#[async_trait::async_trait]
impl PlaybackSdk for FakeSdk {
    async fn create_player(
        &self,
        name: &str,
        tokens: Arc<dyn CredentialView>,
        events: EventSink,
    ) -> tl_session::Result<Arc<dyn Player>> {
        assert_eq!(name, "test-device");
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(events);
        *self.tokens.lock() = Some(tokens);
        let player = Arc::new(FakePlayer::default());
        self.players.lock().push(player.clone());
        Ok(player)
    }
}

struct Harness {
    server: MockServer,
    manager: Arc<CredentialManager>,
    fallback: Arc<MemoryFallbackStore>,
    sdk: Arc<FakeSdk>,
    session: Arc<DeviceSession>,
}

impl Harness {
    async fn new(probe_connectivity: bool) -> Self {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let config = AuthConfig::with_endpoints(
            base.join("/api/token").unwrap(),
            base.join("/v1/me").unwrap(),
        );
        let fallback = Arc::new(MemoryFallbackStore::new());
        let store = TieredStore::new(Arc::new(MemoryTokenStore::new()), fallback.clone(), "spotify");
        let settings = StaticSettings::new().with("spotify", "client_id", "client-123");
        let manager = Arc::new(CredentialManager::new(
            AuthClient::new(config).unwrap(),
            store,
            Arc::new(settings),
        ));

        let sdk = Arc::new(FakeSdk::default());
        let session_config = SessionConfig {
            device_name: "test-device".to_string(),
            status_interval: Duration::from_secs(60),
            probe_connectivity,
        };
        let session = DeviceSession::new(
            session_config,
            manager.clone(),
            Some(sdk.clone() as Arc<dyn PlaybackSdk>),
        );

        Self {
            server,
            manager,
            fallback,
            sdk,
            session,
        }
    }

    /// Valid credential, player created, device reported ready
    async fn ready(&self) {
        self.manager
            .persist(
                "access".to_string(),
                Duration::from_secs(3600),
                Some("refresh".to_string()),
            )
            .await;
        self.session.ensure_player().await.unwrap();
        tokio::task::yield_now().await;
        self.sdk.emit(SdkEvent::Ready {
            device_id: "device-1".to_string(),
        });
        assert_eq!(self.session.status(), ConnectionStatus::Ready);
    }
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn creation_waits_for_a_valid_credential() {
    let harness = Harness::new(false).await;

    assert!(!harness.session.ensure_player().await.unwrap());
    assert_eq!(harness.sdk.created.load(Ordering::SeqCst), 0);
    assert_eq!(harness.session.status(), ConnectionStatus::Disconnected);

    // inside the expiry buffer is not good enough
    harness
        .manager
        .persist("soon".to_string(), Duration::from_secs(10), None)
        .await;
    tokio::task::yield_now().await;
    assert!(!harness.session.ensure_player().await.unwrap());
    assert_eq!(harness.sdk.created.load(Ordering::SeqCst), 0);
    assert_eq!(harness.session.status(), ConnectionStatus::TokenPending);
}

#[tokio::test]
async fn creation_waits_for_the_sdk() {
    let harness = Harness::new(false).await;
    let session = DeviceSession::new(SessionConfig::default(), harness.manager.clone(), None);

    harness
        .manager
        .persist("access".to_string(), Duration::from_secs(3600), None)
        .await;
    assert!(!session.ensure_player().await.unwrap());
    assert_eq!(session.status(), ConnectionStatus::DeviceConnecting);

    let sdk = Arc::new(FakeSdk::default());
    let named = DeviceSession::new(
        SessionConfig {
            device_name: "test-device".to_string(),
            ..SessionConfig::default()
        },
        harness.manager.clone(),
        None,
    );
    assert!(named.attach_sdk(sdk.clone()).await.unwrap());
    assert_eq!(sdk.created.load(Ordering::SeqCst), 1);
    assert_eq!(sdk.last_player().connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_creation_is_a_no_op() {
    let harness = Harness::new(false).await;
    let ready_ids = Arc::new(Mutex::new(Vec::new()));
    let sink = ready_ids.clone();
    harness
        .session
        .on_device_ready(move |id| sink.lock().push(id.to_string()));

    harness.ready().await;
    assert!(harness.session.is_status_loop_running());

    assert!(!harness.session.ensure_player().await.unwrap());
    assert!(!harness.session.ensure_player().await.unwrap());

    assert_eq!(harness.sdk.created.load(Ordering::SeqCst), 1);
    assert_eq!(harness.session.device_id().as_deref(), Some("device-1"));
    assert_eq!(*ready_ids.lock(), vec!["device-1".to_string()]);
}

#[tokio::test]
async fn token_source_reads_the_current_token() {
    let harness = Harness::new(false).await;
    harness.ready().await;

    let tokens = harness.sdk.tokens.lock().clone().unwrap();
    assert_eq!(tokens.access_token().as_deref(), Some("access"));

    harness
        .manager
        .persist("rotated".to_string(), Duration::from_secs(3600), None)
        .await;
    assert_eq!(tokens.access_token().as_deref(), Some("rotated"));
    assert_eq!(harness.sdk.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn playing_flag_follows_player_state() {
    let harness = Harness::new(false).await;
    harness.ready().await;

    harness
        .sdk
        .emit(SdkEvent::PlayerStateChanged(Some(PlaybackState {
            paused: false,
            track_uri: Some("spotify:track:1".to_string()),
            position_ms: 1200,
        })));
    assert!(harness.session.is_playing());
    assert!(harness.session.current().playing);

    harness.sdk.emit(SdkEvent::PlayerStateChanged(None));
    assert!(!harness.session.is_playing());
}

#[tokio::test]
async fn not_ready_and_sdk_errors_keep_the_session() {
    let harness = Harness::new(false).await;
    harness.ready().await;

    harness.sdk.emit(SdkEvent::NotReady {
        device_id: "device-1".to_string(),
    });
    harness
        .sdk
        .emit(SdkEvent::AuthenticationError("Invalid token scopes".to_string()));
    harness
        .sdk
        .emit(SdkEvent::AccountError("Premium required".to_string()));

    assert!(harness.session.has_player());
    assert_eq!(harness.session.device_id().as_deref(), Some("device-1"));
    assert_eq!(harness.session.status(), ConnectionStatus::Ready);
    assert!(harness.manager.has_credential());
}

#[tokio::test]
async fn events_from_a_replaced_player_are_ignored() {
    let harness = Harness::new(false).await;
    harness.ready().await;
    let stale = harness.sdk.sink.lock().clone().unwrap();

    harness.session.disconnect().await;
    assert!(harness.session.ensure_player().await.unwrap());
    assert_eq!(harness.sdk.created.load(Ordering::SeqCst), 2);

    stale.emit(SdkEvent::Ready {
        device_id: "device-old".to_string(),
    });
    stale.emit(SdkEvent::PlayerStateChanged(Some(PlaybackState {
        paused: false,
        track_uri: None,
        position_ms: 0,
    })));
    assert!(harness.session.device_id().is_none());
    assert!(!harness.session.is_playing());
    assert!(!harness.session.is_status_loop_running());
    assert_eq!(harness.session.status(), ConnectionStatus::DeviceConnecting);

    harness.sdk.emit(SdkEvent::Ready {
        device_id: "device-2".to_string(),
    });
    assert_eq!(harness.session.device_id().as_deref(), Some("device-2"));
    assert_eq!(harness.session.status(), ConnectionStatus::Ready);
}

#[tokio::test]
async fn invalid_grant_tears_down_the_device() {
    let harness = Harness::new(false).await;
    harness.ready().await;
    harness.session.stop_status_loop();
    let mut updates = harness.session.subscribe();

    harness
        .manager
        .persist("expiring".to_string(), Duration::from_secs(10), None)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Refresh token revoked"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    assert_eq!(
        harness.manager.refresh_if_due().await,
        RefreshOutcome::Fatal(RefreshFailure::InvalidGrant)
    );

    assert!(harness.manager.credential().is_none());
    assert!(harness.session.device_id().is_none());
    assert!(!harness.session.is_playing());
    assert!(!harness.session.is_status_loop_running());
    assert_eq!(harness.session.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        updates.borrow_and_update().status,
        ConnectionStatus::Disconnected
    );

    let player = harness.sdk.last_player();
    eventually(|| player.disconnects.load(Ordering::SeqCst) == 1).await;

    // a late ready from the dropped player does not resurrect the session
    harness.sdk.emit(SdkEvent::Ready {
        device_id: "device-1".to_string(),
    });
    assert!(harness.session.device_id().is_none());
    assert_eq!(harness.session.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn probe_rejection_on_tick_disconnects() {
    let harness = Harness::new(true).await;
    harness.ready().await;
    harness.session.stop_status_loop();

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.server)
        .await;

    harness.session.on_tick().await;

    assert!(harness.manager.credential().is_none());
    assert!(harness.session.device_id().is_none());
    assert_eq!(harness.session.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn probe_server_error_on_tick_changes_nothing() {
    let harness = Harness::new(true).await;
    harness.ready().await;
    harness.session.stop_status_loop();
    let before = harness.manager.credential();

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.server)
        .await;

    harness.session.on_tick().await;

    assert_eq!(harness.manager.credential(), before);
    assert_eq!(harness.session.status(), ConnectionStatus::Ready);
    assert_eq!(harness.session.device_id().as_deref(), Some("device-1"));
}

#[tokio::test]
async fn status_loop_refreshes_a_stale_fallback_token() {
    let harness = Harness::new(false).await;
    let expiry = Utc::now().timestamp_millis() + 10_000;
    harness.fallback.set(keys::ACCESS_TOKEN, "X").unwrap();
    harness
        .fallback
        .set(keys::TOKEN_EXPIRY, &expiry.to_string())
        .unwrap();
    harness.fallback.set(keys::REFRESH_TOKEN, "refresh-x").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "Y",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let credential = harness.manager.acquire_from_storage().await.unwrap();
    assert_eq!(credential.access_token, "X");
    assert!(!harness.manager.is_valid());
    assert_eq!(harness.session.status(), ConnectionStatus::TokenPending);

    harness.session.start_status_loop();
    let manager = harness.manager.clone();
    eventually(move || manager.access_token().as_deref() == Some("Y")).await;

    // with a valid token the tick goes on to create the device
    let sdk = harness.sdk.clone();
    eventually(move || sdk.created.load(Ordering::SeqCst) == 1).await;
    assert_eq!(harness.session.status(), ConnectionStatus::DeviceConnecting);

    harness.session.disconnect().await;
    assert!(!harness.session.is_status_loop_running());
    assert!(harness.manager.is_valid());
}
