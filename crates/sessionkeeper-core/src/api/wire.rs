//! Response bodies as they arrive, and their validation into domain types.
//!
//! Every field is optional on the wire; `into_*` decides what is required so a
//! partial or unexpected body becomes an error instead of a half-filled value.

use serde::Deserialize;

use super::{ApiError, RefreshGrant, UserProfile};
use crate::sessions::SessionInfo;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    success: Option<bool>,
    token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<RawUser>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Option<serde_json::Value>,
    username: Option<String>,
    email: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionsResponse {
    success: Option<bool>,
    sessions: Option<Vec<SessionInfo>>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    success: Option<bool>,
    message: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `success` must be present and true.
fn check_success(success: Option<bool>, message: Option<String>) -> Result<(), ApiError> {
    match success {
        Some(true) => Ok(()),
        Some(false) => Err(ApiError::Rejected(
            message.unwrap_or_else(|| "server reported failure".to_string()),
        )),
        None => Err(ApiError::InvalidResponse("missing success flag".to_string())),
    }
}

impl RawUser {
    fn into_profile(self) -> Result<UserProfile, ApiError> {
        let id = match self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(ApiError::InvalidResponse("user without id".to_string())),
        };
        Ok(UserProfile {
            id,
            username: self.username.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            role: self.role.unwrap_or_default(),
        })
    }
}

impl RefreshResponse {
    pub(crate) fn into_grant(self) -> Result<RefreshGrant, ApiError> {
        check_success(self.success, self.message)?;

        let access_token = non_empty(self.token)
            .or_else(|| non_empty(self.access_token))
            .ok_or_else(|| ApiError::InvalidResponse("missing access token".to_string()))?;
        let refresh_token = non_empty(self.refresh_token)
            .ok_or_else(|| ApiError::InvalidResponse("missing refresh token".to_string()))?;
        let user = self.user.map(RawUser::into_profile).transpose()?;

        Ok(RefreshGrant {
            access_token,
            refresh_token,
            user,
        })
    }
}

impl SessionsResponse {
    pub(crate) fn into_sessions(self) -> Result<Vec<SessionInfo>, ApiError> {
        check_success(self.success, self.message)?;
        self.sessions
            .ok_or_else(|| ApiError::InvalidResponse("missing sessions".to_string()))
    }
}

impl AckResponse {
    pub(crate) fn into_result(self) -> Result<(), ApiError> {
        check_success(self.success, self.message)
    }
}
