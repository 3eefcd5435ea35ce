//! Shared fixtures for the token manager integration tests.
//!
//! Time is driven by tokio's paused clock: `TokioClock` reports wall time as
//! a fixed anchor plus tokio's elapsed time, so advancing the runtime clock
//! moves token expiry and the refresh timer together.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::json;

use sessionkeeper_core::{
    ApiError, AuthTransport, Clock, Config, EncryptedStore, KdfParams, KeyValueBackend,
    MemoryBackend, RefreshGrant, RefreshRequest, SessionInfo, StaticProbe, TokenManager,
    TokenPair, TOKENS_KEY,
};

pub const SECRET: &str = "test-secret";
pub const NAMESPACE: &str = "secure_";

pub const CHEAP_KDF: KdfParams = KdfParams {
    memory_kib: 64,
    iterations: 1,
    parallelism: 1,
};

// ============================================================================
// Clock
// ============================================================================

pub struct TokioClock {
    anchor: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        // Whole seconds, matching the precision of token claims
        let anchor = DateTime::from_timestamp(Utc::now().timestamp(), 0).expect("valid timestamp");
        Arc::new(Self {
            anchor,
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.anchor + chrono::Duration::from_std(self.start.elapsed()).expect("elapsed in range")
    }
}

// ============================================================================
// Tokens
// ============================================================================

pub fn make_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.test-signature", header, payload)
}

/// Access token for `user-1` in `session` expiring at `exp`.
pub fn access_token(session: &str, exp: DateTime<Utc>) -> String {
    make_token(json!({
        "userId": "user-1",
        "username": "scout",
        "email": "scout@example.com",
        "role": "user",
        "sessionId": session,
        "iat": exp.timestamp() - 900,
        "exp": exp.timestamp(),
        "type": "access"
    }))
}

/// Pair whose access token expires `secs_from_now` seconds after `now`.
pub fn pair_expiring_in(now: DateTime<Utc>, secs_from_now: i64, refresh: &str) -> TokenPair {
    let exp = now + chrono::Duration::seconds(secs_from_now);
    TokenPair::new(access_token("sess-1", exp), refresh, now, exp)
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// New pair; access token expires `access_lifetime` seconds after the call.
    Grant,
    Unauthorized,
    Rejected,
    ServerError,
    Malformed,
}

pub struct MockTransport {
    clock: Arc<dyn Clock>,
    replies: Mutex<VecDeque<RefreshReply>>,
    default_reply: RefreshReply,
    refresh_delay: Duration,
    access_lifetime: i64,
    pub requests: Mutex<Vec<RefreshRequest>>,
    refresh_calls: AtomicUsize,
    session_calls: AtomicUsize,
    sessions: Mutex<Vec<SessionInfo>>,
    issued: AtomicUsize,
}

impl MockTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            replies: Mutex::new(VecDeque::new()),
            default_reply: RefreshReply::Grant,
            refresh_delay: Duration::ZERO,
            access_lifetime: 900,
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
            sessions: Mutex::new(Vec::new()),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn failing_with(mut self, reply: RefreshReply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_access_lifetime(mut self, secs: i64) -> Self {
        self.access_lifetime = secs;
        self
    }

    pub fn with_sessions(self, sessions: Vec<SessionInfo>) -> Self {
        *self.sessions.lock().unwrap() = sessions;
        self
    }

    pub fn push_reply(&self, reply: RefreshReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RefreshRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Refresh token issued by the n-th successful refresh (1-based).
    pub fn issued_refresh_token(n: usize) -> String {
        format!("refresh-{}", n)
    }
}

#[async_trait]
impl AuthTransport for MockTransport {
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshGrant, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        match reply {
            RefreshReply::Grant => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                let exp = self.clock.now() + chrono::Duration::seconds(self.access_lifetime);
                Ok(RefreshGrant {
                    access_token: access_token(&format!("sess-refreshed-{}", n), exp),
                    refresh_token: Self::issued_refresh_token(n),
                    user: None,
                })
            }
            RefreshReply::Unauthorized => Err(ApiError::Unauthorized),
            RefreshReply::Rejected => Err(ApiError::Rejected("refresh token revoked".into())),
            RefreshReply::ServerError => Err(ApiError::ServerError("unavailable".into())),
            RefreshReply::Malformed => Err(ApiError::InvalidResponse("missing access token".into())),
        }
    }

    async fn list_sessions(&self, _access_token: &str) -> Result<Vec<SessionInfo>, ApiError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn terminate_session(&self, _access_token: &str, session_id: &str) -> Result<(), ApiError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.session_id != session_id);
        if sessions.len() == before {
            return Err(ApiError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn terminate_other_sessions(&self, _access_token: &str) -> Result<(), ApiError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().retain(|s| s.session_id == "sess-1");
        Ok(())
    }
}

pub fn session(id: &str, active: bool) -> SessionInfo {
    let at = DateTime::from_timestamp(1_800_000_000, 0).expect("valid timestamp");
    SessionInfo {
        session_id: id.to_string(),
        device_id: format!("device-{}", id),
        user_agent: "test-agent".to_string(),
        ip_address: "10.0.0.1".to_string(),
        location: None,
        is_active: active,
        last_activity_at: at,
        created_at: at,
    }
}

// ============================================================================
// Manager
// ============================================================================

pub fn test_config() -> Config {
    Config::default()
        .with_api_base_url("http://auth.invalid/api")
        .with_storage_secret(SECRET)
}

pub fn test_probe() -> StaticProbe {
    StaticProbe {
        user_agent: Some("sessionkeeper-tests".to_string()),
        language: Some("en-US".to_string()),
        platform: Some("test".to_string()),
        ..StaticProbe::default()
    }
}

pub struct Harness {
    pub manager: TokenManager,
    pub transport: Arc<MockTransport>,
    pub backend: Arc<MemoryBackend>,
    pub clock: Arc<TokioClock>,
}

impl Harness {
    pub fn build(config: Config, transport: MockTransport, backend: Arc<MemoryBackend>, clock: Arc<TokioClock>) -> Self {
        let transport = Arc::new(transport);
        let manager = TokenManager::builder(config)
            .transport(transport.clone())
            .backend(backend.clone())
            .probe(Arc::new(test_probe()))
            .clock(clock.clone())
            .kdf_params(CHEAP_KDF)
            .build()
            .expect("Failed to build token manager");
        Self {
            manager,
            transport,
            backend,
            clock,
        }
    }

    /// Manager over an empty in-memory store with a succeeding transport.
    pub fn new() -> Self {
        let clock = TokioClock::new();
        let transport = MockTransport::new(clock.clone());
        Self::build(test_config(), transport, Arc::new(MemoryBackend::new()), clock)
    }

    pub fn with_transport(make: impl FnOnce(Arc<TokioClock>) -> MockTransport) -> Self {
        let clock = TokioClock::new();
        let transport = make(clock.clone());
        Self::build(test_config(), transport, Arc::new(MemoryBackend::new()), clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn has_persisted_tokens(&self) -> bool {
        self.backend
            .get(&format!("{}{}", NAMESPACE, TOKENS_KEY))
            .expect("memory backend never fails")
            .is_some()
    }
}

/// Write a pair into `backend` the way the manager would.
pub fn persist_pair(backend: &Arc<MemoryBackend>, pair: &TokenPair) {
    let store = EncryptedStore::new(backend.clone(), NAMESPACE, SECRET, &CHEAP_KDF);
    store.set_item(TOKENS_KEY, pair).expect("Failed to persist test pair");
}

/// Let spawned tasks (fingerprint, zero-delay timers) run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
