//! Token lifecycle manager.
//!
//! `TokenManager` owns the current `TokenPair`, keeps it persisted in the
//! encrypted store, and keeps exactly one proactive-refresh timer armed for
//! it. Lifecycle:
//!
//! ```text
//! Uninitialized -> Hydrating -> Unauthenticated
//!                            -> Authenticated <-> Refreshing
//!                                                  -> RefreshFailed -> Unauthenticated
//! ```
//!
//! A refresh that fails for any reason clears every stored credential; the
//! caller is expected to send the user back to sign-in. Nothing is retried.

pub mod builder;
mod timer;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AuthTransport, RefreshRequest};
use crate::clock::Clock;
use crate::config::Config;
use crate::fingerprint::{generate_device_id, DeviceFingerprinter, DeviceIdentity};
use crate::sessions::{CachedData, SessionInfo, SessionRegistry};
use crate::storage::{EncryptedStore, KeyValueBackend};
use crate::token::{clamped_seconds, TokenCodec, TokenPair};

pub use builder::{BuildError, TokenManagerBuilder};
use timer::ScheduledRefresh;
pub use types::{CurrentUser, LifecycleState, ReauthReason, RefreshOutcome};

/// Encrypted entry holding the current token pair
pub const TOKENS_KEY: &str = "tokens";

/// Plain (non-secret) entry holding the device id, outside the encrypted namespace
pub const DEVICE_ID_KEY: &str = "device_id";

/// Shortest wait before refreshing a pair the server has just issued.
const MIN_REFRESH_DELAY_SECS: u64 = 30;

/// Where a pair being installed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Install {
    /// Read back from the store; already persisted.
    Restored,
    /// Handed in by the caller.
    Provided,
    /// Issued by a successful refresh.
    Refreshed,
}

#[derive(Debug, Default)]
struct ManagerState {
    pair: Option<Arc<TokenPair>>,
    /// Bumped on every replace or clear of `pair`.
    generation: u64,
    timer: Option<ScheduledRefresh>,
    device: DeviceIdentity,
}

struct Inner {
    config: Config,
    transport: Arc<dyn AuthTransport>,
    backend: Arc<dyn KeyValueBackend>,
    store: EncryptedStore,
    fingerprinter: DeviceFingerprinter,
    clock: Arc<dyn Clock>,
    sessions: SessionRegistry,
    state: Mutex<ManagerState>,
    status: watch::Sender<LifecycleState>,
    initialized: AtomicBool,
    /// Serializes refreshes so at most one request is in flight.
    refresh_gate: tokio::sync::Mutex<()>,
}

/// Handle to the token manager.
/// Clone is cheap - all clones share the same state and timer.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("state", &self.state())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn builder(config: Config) -> TokenManagerBuilder {
        TokenManagerBuilder::new(config)
    }

    fn from_parts(
        config: Config,
        transport: Arc<dyn AuthTransport>,
        backend: Arc<dyn KeyValueBackend>,
        store: EncryptedStore,
        fingerprinter: DeviceFingerprinter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(LifecycleState::Uninitialized);
        let sessions = SessionRegistry::new(transport.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                backend,
                store,
                fingerprinter,
                clock,
                sessions,
                state: Mutex::new(ManagerState::default()),
                status,
                initialized: AtomicBool::new(false),
                refresh_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Load the device identity and any persisted tokens.
    ///
    /// The fingerprint is computed in the background and is absent until it
    /// is ready. A persisted access token that is already inside the refresh
    /// window gets an immediate refresh instead of an "authenticated" state.
    /// Calling this more than once has no effect.
    pub async fn initialize(&self) {
        let inner = &self.inner;
        if inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("Token manager already initialized");
            return;
        }
        inner.status.send_replace(LifecycleState::Hydrating);

        let device_id = inner.load_or_create_device_id();
        inner.state().device.device_id = device_id;
        if inner.config.enable_fingerprinting {
            inner.spawn_fingerprint();
        }

        match inner.store.get_item::<TokenPair>(TOKENS_KEY) {
            Some(pair) if pair.has_refresh_token() => {
                info!("Restored persisted tokens");
                let mut state = inner.state();
                inner.install_locked(&mut state, pair, Install::Restored);
            }
            Some(_) => {
                warn!("Persisted tokens have no refresh token, discarding");
                inner.store.remove_item(TOKENS_KEY);
                inner.status.send_replace(LifecycleState::Unauthenticated);
            }
            None => {
                debug!("No persisted tokens");
                inner.status.send_replace(LifecycleState::Unauthenticated);
            }
        }
    }

    /// Replace the current pair (e.g. after sign-in), persist it and re-arm
    /// the refresh timer at `expiry - auto_refresh_threshold`.
    pub async fn set_tokens(&self, pair: TokenPair) {
        let mut state = self.inner.state();
        self.inner.install_locked(&mut state, pair, Install::Provided);
    }

    /// The current access token, unless it is already past its expiry.
    pub fn access_token(&self) -> Option<String> {
        let pair = self.inner.state().pair.clone()?;
        if TokenCodec::is_expired_at(pair.access_token(), self.inner.clock.now()) {
            return None;
        }
        Some(pair.access_token().to_string())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Exchange the refresh token for a new pair.
    pub async fn refresh_tokens(&self) -> RefreshOutcome {
        self.inner.refresh().await
    }

    /// User-initiated refresh ("extend session").
    pub async fn manual_refresh(&self) -> RefreshOutcome {
        info!("Manual token refresh requested");
        self.inner.refresh().await
    }

    /// Forget the current pair and its persisted copy. The pending timer is
    /// cancelled before this returns.
    pub fn clear_tokens(&self) {
        let mut state = self.inner.state();
        self.inner.clear_locked(&mut state);
        self.inner.status.send_replace(LifecycleState::Unauthenticated);
    }

    /// `clear_tokens`, plus every entry in the encrypted namespace and the
    /// cached session list. The device id survives.
    pub fn cleanup(&self) {
        let mut state = self.inner.state();
        self.inner.clear_locked(&mut state);
        self.inner.store.clear();
        self.inner.sessions.clear_cache();
        self.inner.status.send_replace(LifecycleState::Unauthenticated);
        debug!("Token manager cleaned up");
    }

    // ===== Sessions =====

    /// All sessions of the signed-in account. Empty without a valid token.
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        let Some(token) = self.access_token() else {
            debug!("Not authenticated, skipping session listing");
            return Vec::new();
        };
        self.inner.sessions.list(&token).await
    }

    pub async fn terminate_session(&self, session_id: &str) -> bool {
        let Some(token) = self.access_token() else {
            debug!("Not authenticated, skipping session termination");
            return false;
        };
        self.inner.sessions.terminate(&token, session_id).await
    }

    pub async fn terminate_other_sessions(&self) -> bool {
        let Some(token) = self.access_token() else {
            debug!("Not authenticated, skipping session termination");
            return false;
        };
        let current = TokenCodec::decode(&token).map(|claims| claims.session_id);
        self.inner
            .sessions
            .terminate_others(&token, current.as_deref())
            .await
    }

    pub fn cached_sessions(&self) -> Option<CachedData<Vec<SessionInfo>>> {
        self.inner.sessions.cached()
    }

    /// Whether the last listing showed more active sessions than allowed.
    pub fn session_limit_exceeded(&self) -> bool {
        self.inner
            .sessions
            .exceeds_limit(self.inner.config.max_concurrent_sessions)
    }

    // ===== Utility =====

    /// Time until the access token expires, `None` without a token.
    pub fn token_time_remaining(&self) -> Option<chrono::Duration> {
        let pair = self.inner.state().pair.clone()?;
        let now = self.inner.clock.now();
        TokenCodec::time_remaining_at(pair.access_token(), now)
            .or_else(|| Some(pair.time_until_expiry(now).max(chrono::Duration::zero())))
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        let token = self.access_token()?;
        TokenCodec::decode(&token).map(CurrentUser::from)
    }

    pub fn device_identity(&self) -> DeviceIdentity {
        self.inner.state().device.clone()
    }

    /// When the armed refresh timer is due, if one is armed.
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state().timer.as_ref().map(|t| t.due_at())
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.status.borrow()
    }

    /// Receive every lifecycle transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.status.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_or_create_device_id(&self) -> String {
        match self.backend.get(DEVICE_ID_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => return id.trim().to_string(),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read device id"),
        }
        let id = generate_device_id();
        if let Err(e) = self.backend.set(DEVICE_ID_KEY, &id) {
            warn!(error = %e, "Failed to persist device id");
        }
        info!(device_id = %id, "Generated new device id");
        id
    }

    fn spawn_fingerprint(self: &Arc<Self>) {
        let fingerprinter = self.fingerprinter.clone();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let fingerprint = fingerprinter.generate_fingerprint();
            if let Some(inner) = weak.upgrade() {
                debug!("Device fingerprint ready");
                inner.state().device.fingerprint = Some(fingerprint);
            }
        });
    }

    /// Make `pair` current and re-arm the timer, as one step under the lock.
    fn install_locked(self: &Arc<Self>, state: &mut ManagerState, pair: TokenPair, origin: Install) {
        let now = self.clock.now();
        let expiry = TokenCodec::expiry(pair.access_token()).unwrap_or_else(|| pair.expires_at());
        let mut due_at = expiry
            .checked_sub_signed(clamped_seconds(self.config.auto_refresh_threshold_seconds))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut delay = (due_at - now).to_std().unwrap_or(Duration::ZERO);

        // A freshly issued token that is already due would refresh in a loop
        let floor = Duration::from_secs(MIN_REFRESH_DELAY_SECS);
        if origin == Install::Refreshed && delay < floor {
            warn!(
                expires_at = %expiry,
                threshold_secs = self.config.auto_refresh_threshold_seconds,
                "Refreshed access token is already inside the refresh threshold"
            );
            delay = floor;
            due_at = now + clamped_seconds(MIN_REFRESH_DELAY_SECS);
        }

        if origin != Install::Restored && self.store.set_item(TOKENS_KEY, &pair).is_none() {
            warn!("Tokens could not be persisted, keeping them in memory only");
        }

        state.generation += 1;
        state.pair = Some(Arc::new(pair));
        self.rearm(state, due_at.max(now), delay);

        let status = if delay.is_zero() {
            LifecycleState::Refreshing
        } else {
            LifecycleState::Authenticated
        };
        self.status.send_replace(status);
        debug!(
            generation = state.generation,
            refresh_in_secs = delay.as_secs(),
            "Token pair installed"
        );
    }

    /// Cancel any armed timer, then arm one for the current generation.
    fn rearm(self: &Arc<Self>, state: &mut ManagerState, due_at: DateTime<Utc>, delay: Duration) {
        state.timer = None;

        let generation = state.generation;
        let weak = Arc::downgrade(self);
        state.timer = Some(ScheduledRefresh::spawn(generation, due_at, delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(generation).await;
            }
        }));
    }

    fn clear_locked(&self, state: &mut ManagerState) {
        state.timer = None;
        state.pair = None;
        state.generation += 1;
        self.store.remove_item(TOKENS_KEY);
    }

    async fn on_timer(self: Arc<Self>, generation: u64) {
        {
            let mut state = self.state();
            match state.timer.take() {
                Some(timer) if timer.generation() == generation => timer.disarm(),
                other => {
                    state.timer = other;
                    return;
                }
            }
        }
        debug!(generation, "Proactive refresh timer fired");
        let outcome = self.refresh().await;
        debug!(success = outcome.is_success(), "Proactive refresh finished");
    }

    async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let observed = self.state().generation;
        let _gate = self.refresh_gate.lock().await;

        let (generation, request) = {
            let state = self.state();
            if state.generation != observed && state.pair.is_some() {
                debug!("Tokens replaced while waiting, skipping refresh");
                return RefreshOutcome::Refreshed { user: None };
            }
            let Some(pair) = state.pair.as_ref().filter(|p| p.has_refresh_token()) else {
                debug!("No refresh token available");
                return RefreshOutcome::ReauthRequired(ReauthReason::MissingRefreshToken);
            };
            let request = RefreshRequest {
                refresh_token: pair.refresh_token().to_string(),
                device_id: state.device.device_id.clone(),
                fingerprint: state.device.fingerprint.clone(),
            };
            self.status.send_replace(LifecycleState::Refreshing);
            (state.generation, request)
        };

        let result = self.transport.refresh(&request).await;

        let mut state = self.state();
        if state.generation != generation {
            debug!("Tokens changed during refresh, discarding result");
            return match state.pair {
                Some(_) => RefreshOutcome::Refreshed { user: None },
                None => RefreshOutcome::ReauthRequired(ReauthReason::LoggedOut),
            };
        }

        match result {
            Ok(grant) => {
                let pair = TokenPair::issued_now(
                    grant.access_token,
                    grant.refresh_token,
                    self.clock.now(),
                    self.config.access_token_expiry_seconds,
                );
                self.install_locked(&mut state, pair, Install::Refreshed);
                info!("Tokens refreshed");
                RefreshOutcome::Refreshed { user: grant.user }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing credentials");
                self.status.send_replace(LifecycleState::RefreshFailed);
                self.clear_locked(&mut state);
                self.status.send_replace(LifecycleState::Unauthenticated);
                RefreshOutcome::ReauthRequired(ReauthReason::from(&e))
            }
        }
    }
}
