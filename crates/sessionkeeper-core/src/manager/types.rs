use serde::Serialize;

use crate::api::{ApiError, UserProfile};
use crate::token::DecodedTokenPayload;

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Hydrating,
    Unauthenticated,
    Authenticated,
    /// A refresh is due now or in flight.
    Refreshing,
    /// Transient: the refresh was refused and credentials are being cleared.
    RefreshFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReauthReason {
    MissingRefreshToken,
    Rejected,
    Network,
    InvalidResponse,
    /// Tokens were cleared while the refresh was in flight.
    LoggedOut,
}

impl From<&ApiError> for ReauthReason {
    fn from(error: &ApiError) -> Self {
        match error {
            ApiError::Unauthorized
            | ApiError::AccessDenied(_)
            | ApiError::NotFound(_)
            | ApiError::Rejected(_) => ReauthReason::Rejected,
            ApiError::RateLimited
            | ApiError::ServerError(_)
            | ApiError::NetworkError(_)
            | ApiError::InvalidUrl(_) => ReauthReason::Network,
            ApiError::InvalidResponse(_) => ReauthReason::InvalidResponse,
        }
    }
}

/// Result of a refresh attempt. A failed refresh always means the user must
/// sign in again; there is no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { user: Option<UserProfile> },
    ReauthRequired(ReauthReason),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, RefreshOutcome::ReauthRequired(_))
    }
}

/// The signed-in user, as claimed by the current access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub session_id: String,
}

impl From<DecodedTokenPayload> for CurrentUser {
    fn from(claims: DecodedTokenPayload) -> Self {
        Self {
            id: claims.subject_id,
            username: claims.username,
            email: claims.email,
            role: claims.role,
            session_id: claims.session_id,
        }
    }
}
