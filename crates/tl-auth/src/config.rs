use std::time::Duration;
use url::Url;

/// Streaming provider endpoints
pub mod endpoints {
    pub const TOKEN: &str = "https://accounts.spotify.com/api/token";
    /// Cheap authenticated resource used only as a liveness probe
    pub const PROBE: &str = "https://api.spotify.com/v1/me";
}

/// Provider key used for the durable store and settings lookups
pub const PROVIDER: &str = "spotify";

/// Settings key holding the OAuth client id
pub const CLIENT_ID_KEY: &str = "client_id";

/// A token this close to expiry is already treated as invalid
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Lifetime assumed for tokens delivered through the URL fragment
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Configuration for the credential manager and its HTTP client
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Key the credential is stored under in the durable store
    pub provider: String,

    /// Token exchange endpoint
    pub token_url: Url,

    /// Authenticated liveness probe endpoint
    pub probe_url: Url,

    /// Settings category holding the client id
    pub settings_category: String,

    /// Settings key holding the client id
    pub client_id_key: String,

    /// Lifetime used by fragment acquisition
    pub default_lifetime: Duration,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl AuthConfig {
    /// Config pointing at custom endpoints (tests, proxies)
    pub fn with_endpoints(token_url: Url, probe_url: Url) -> Self {
        Self {
            token_url,
            probe_url,
            ..Self::default()
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: PROVIDER.to_string(),
            token_url: Url::parse(endpoints::TOKEN).expect("valid token URL"),
            probe_url: Url::parse(endpoints::PROBE).expect("valid probe URL"),
            settings_category: PROVIDER.to_string(),
            client_id_key: CLIENT_ID_KEY.to_string(),
            default_lifetime: DEFAULT_TOKEN_LIFETIME,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("tunelink".to_string()),
        }
    }
}
