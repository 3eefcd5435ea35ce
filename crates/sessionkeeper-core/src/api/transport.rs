use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::sessions::SessionInfo;

/// Body of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_id: String,
    pub fingerprint: Option<String>,
}

/// User record the server may return alongside refreshed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

/// A validated, successful refresh response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Option<UserProfile>,
}

/// The authentication backend, as seen by the token manager.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshGrant, ApiError>;

    async fn list_sessions(&self, access_token: &str) -> Result<Vec<SessionInfo>, ApiError>;

    async fn terminate_session(&self, access_token: &str, session_id: &str)
        -> Result<(), ApiError>;

    async fn terminate_other_sessions(&self, access_token: &str) -> Result<(), ApiError>;
}
