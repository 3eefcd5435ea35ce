//! Offline inspection of access and refresh tokens.
//!
//! Tokens are JWTs. Only the payload is read; signatures are checked by the
//! server, and a decoded expiry is a scheduling hint, never proof of validity.
//! Anything that cannot be decoded counts as expired.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clamped_seconds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by a token. A projection of the token string, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTokenPayload {
    pub subject_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub session_id: String,
    pub device_id: Option<String>,
    pub fingerprint: Option<String>,
    /// `iat` is optional in JWTs.
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub kind: TokenKind,
}

/// Subject ids arrive as strings from some issuers and numbers from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClaimId {
    Text(String),
    Number(i64),
}

impl ClaimId {
    fn into_string(self) -> String {
        match self {
            ClaimId::Text(s) => s,
            ClaimId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClaims {
    user_id: Option<ClaimId>,
    sub: Option<ClaimId>,
    username: Option<String>,
    email: Option<String>,
    role: Option<String>,
    session_id: Option<String>,
    device_id: Option<String>,
    fingerprint: Option<String>,
    iat: Option<f64>,
    exp: Option<f64>,
    #[serde(rename = "type")]
    kind: Option<TokenKind>,
}

const DEFAULT_ROLE: &str = "user";

fn timestamp(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((seconds * 1000.0) as i64)
}

pub struct TokenCodec;

impl TokenCodec {
    /// Decode a token's claims without verifying its signature.
    ///
    /// Returns `None` for anything that is not a three-part token with a
    /// JSON payload carrying a subject, session id and `exp`.
    pub fn decode(token: &str) -> Option<DecodedTokenPayload> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("Token does not have three segments");
            return None;
        };

        let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Token payload is not base64url");
                return None;
            }
        };
        let claims: RawClaims = match serde_json::from_slice(&bytes) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Token payload is not valid claims JSON");
                return None;
            }
        };

        let subject_id = claims.user_id.or(claims.sub)?.into_string();
        let session_id = claims.session_id?;
        let issued_at = claims.iat.and_then(timestamp);
        let expires_at = claims.exp.and_then(timestamp)?;

        Some(DecodedTokenPayload {
            subject_id,
            username: claims.username.unwrap_or_default(),
            email: claims.email.unwrap_or_default(),
            role: claims.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            session_id,
            device_id: claims.device_id,
            fingerprint: claims.fingerprint,
            issued_at,
            expires_at,
            kind: claims.kind.unwrap_or(TokenKind::Access),
        })
    }

    pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
        Self::decode(token).map(|claims| claims.expires_at)
    }

    pub fn is_expired(token: &str) -> bool {
        Self::is_expired_at(token, Utc::now())
    }

    /// True once `now` reaches the claimed expiry, or if the token can't be decoded.
    pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
        match Self::expiry(token) {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }

    pub fn is_expiring_soon(token: &str, threshold_seconds: u64) -> bool {
        Self::is_expiring_soon_at(token, threshold_seconds, Utc::now())
    }

    /// True if the token expires within `threshold_seconds` of `now`.
    pub fn is_expiring_soon_at(token: &str, threshold_seconds: u64, now: DateTime<Utc>) -> bool {
        let threshold = clamped_seconds(threshold_seconds);
        match Self::expiry(token) {
            Some(expires_at) => now + threshold >= expires_at,
            None => true,
        }
    }

    /// Time left before the claimed expiry, zero once passed.
    pub fn time_remaining_at(token: &str, now: DateTime<Utc>) -> Option<Duration> {
        Self::expiry(token).map(|expires_at| (expires_at - now).max(Duration::zero()))
    }
}
