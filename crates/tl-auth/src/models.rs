use serde::{Deserialize, Serialize};

/// Token endpoint response for the refresh_token grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token endpoint error body
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Either shape the token endpoint may answer with, regardless of status code
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TokenEndpointBody {
    Token(TokenResponse),
    Error(OAuthErrorResponse),
}

/// Refresh request form body
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshForm<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
    pub client_id: &'a str,
}
