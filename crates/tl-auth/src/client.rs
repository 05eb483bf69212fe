use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use crate::config::AuthConfig;
use crate::errors::{AuthError, Result};
use crate::models::{OAuthErrorResponse, RefreshForm, TokenEndpointBody, TokenResponse};

/// Outcome of the authenticated liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// 2xx: the token is accepted
    Valid,
    /// 401/403: the token is definitively rejected
    Rejected,
    /// Timeouts, 5xx, anything else: no conclusion
    Unknown,
}

/// HTTP client for the provider's token and resource endpoints
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: Client,
}

impl AuthClient {
    /// Create a new authentication client
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("tunelink"))
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchange a refresh token for a new access token
    #[instrument(skip(self, refresh_token, client_id))]
    pub async fn refresh_token(&self, refresh_token: &str, client_id: &str) -> Result<TokenResponse> {
        let form = RefreshForm {
            grant_type: "refresh_token",
            refresh_token,
            client_id,
        };

        debug!("Refreshing access token");
        let response = self
            .http
            .post(self.config.token_url.clone())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::token_error(status, &body));
        }

        match serde_json::from_str::<TokenEndpointBody>(&body)? {
            TokenEndpointBody::Token(token) => Ok(token),
            TokenEndpointBody::Error(error) => Err(Self::oauth_error(error)),
        }
    }

    fn token_error(status: StatusCode, body: &str) -> AuthError {
        if let Ok(error) = serde_json::from_str::<OAuthErrorResponse>(body) {
            return Self::oauth_error(error);
        }

        if body.contains("invalid_grant") {
            return AuthError::OAuthInvalidGrant;
        }

        AuthError::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }

    fn oauth_error(error: OAuthErrorResponse) -> AuthError {
        if error.error == "invalid_grant" {
            return AuthError::OAuthInvalidGrant;
        }
        AuthError::OAuth {
            error: error.error,
            description: error.error_description.unwrap_or_default(),
        }
    }

    /// Lightweight authenticated request telling whether the token still works
    #[instrument(skip(self, access_token))]
    pub async fn probe(&self, access_token: &str) -> ProbeResult {
        let response = match self
            .http
            .get(self.config.probe_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Connectivity probe failed: {}", e);
                return ProbeResult::Unknown;
            }
        };

        let status = response.status();
        debug!("Connectivity probe answered {}", status);

        if status.is_success() {
            ProbeResult::Valid
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ProbeResult::Rejected
        } else {
            ProbeResult::Unknown
        }
    }
}
