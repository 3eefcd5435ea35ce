use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::clamped_seconds;

/// The current access/refresh token pair.
///
/// Immutable: a refresh produces a new pair, it never edits this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at,
            expires_at,
        }
    }

    /// Pair issued at `now` that expires after `lifetime_seconds`.
    pub fn issued_now(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        now: DateTime<Utc>,
        lifetime_seconds: u64,
    ) -> Self {
        Self::new(
            access_token,
            refresh_token,
            now,
            now + clamped_seconds(lifetime_seconds),
        )
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Expiry recorded when the pair was built. The decoded token expiry
    /// takes precedence where it is available.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub(crate) fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}
