//! HTTP implementation of `AuthTransport`.
//!
//! Talks to the authentication backend's refresh and session endpoints. The
//! request timeout here is the only timeout on a refresh; the manager itself
//! waits for whatever this returns.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{AckResponse, RefreshResponse, SessionsResponse};
use super::{ApiError, AuthTransport, RefreshGrant, RefreshRequest};
use crate::sessions::SessionInfo;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Auth API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Reuse an existing client (and its connection pool).
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{} body: {}", what, e)))
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshGrant, ApiError> {
        let url = self.endpoint(&["auth", "refresh"])?;
        debug!(url = %url, device_id = %request.device_id, "Refreshing tokens");

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        Self::read_json::<RefreshResponse>(response, "refresh")
            .await?
            .into_grant()
    }

    async fn list_sessions(&self, access_token: &str) -> Result<Vec<SessionInfo>, ApiError> {
        let url = self.endpoint(&["auth", "sessions"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        Self::read_json::<SessionsResponse>(response, "sessions")
            .await?
            .into_sessions()
    }

    async fn terminate_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<(), ApiError> {
        if matches!(session_id, "" | "." | "..") {
            return Err(ApiError::NotFound(format!("invalid session id {:?}", session_id)));
        }
        let url = self.endpoint(&["auth", "sessions", session_id])?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::read_json::<AckResponse>(response, "terminate session")
            .await?
            .into_result()
    }

    async fn terminate_other_sessions(&self, access_token: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["auth", "sessions", "terminate-others"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::read_json::<AckResponse>(response, "terminate other sessions")
            .await?
            .into_result()
    }
}
