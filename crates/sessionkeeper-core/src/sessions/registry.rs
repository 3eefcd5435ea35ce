//! Server-tracked sessions for the signed-in account.
//!
//! The server owns session state; the registry only forwards list/terminate
//! calls and keeps the last list it saw. Failures never propagate: a failed
//! listing is an empty list, a failed termination is `false`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::CachedData;
use crate::api::AuthTransport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub device_id: String,
    pub user_agent: String,
    pub ip_address: String,
    #[serde(default)]
    pub location: Option<String>,
    pub is_active: bool,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    transport: Arc<dyn AuthTransport>,
    cache: Mutex<Option<CachedData<Vec<SessionInfo>>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("cache", &*self.cache())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn AuthTransport>) -> Self {
        Self {
            transport,
            cache: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedData<Vec<SessionInfo>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the account's sessions. Empty on any failure.
    pub async fn list(&self, access_token: &str) -> Vec<SessionInfo> {
        match self.transport.list_sessions(access_token).await {
            Ok(sessions) => {
                debug!(count = sessions.len(), "Fetched sessions");
                *self.cache() = Some(CachedData::new(sessions.clone()));
                sessions
            }
            Err(e) => {
                warn!(error = %e, "Failed to list sessions");
                Vec::new()
            }
        }
    }

    pub async fn terminate(&self, access_token: &str, session_id: &str) -> bool {
        match self.transport.terminate_session(access_token, session_id).await {
            Ok(()) => {
                info!(session_id, "Terminated session");
                if let Some(cached) = self.cache().as_mut() {
                    cached.data.retain(|s| s.session_id != session_id);
                }
                true
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to terminate session");
                false
            }
        }
    }

    /// Terminate every session except the caller's own.
    ///
    /// `current_session_id` only trims the cached list; the server decides
    /// which session is current from the bearer token.
    pub async fn terminate_others(&self, access_token: &str, current_session_id: Option<&str>) -> bool {
        match self.transport.terminate_other_sessions(access_token).await {
            Ok(()) => {
                info!("Terminated other sessions");
                let mut cache = self.cache();
                match (cache.as_mut(), current_session_id) {
                    (Some(cached), Some(current)) => {
                        cached.data.retain(|s| s.session_id == current);
                    }
                    _ => *cache = None,
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to terminate other sessions");
                false
            }
        }
    }

    /// Last fetched list, with its age.
    pub fn cached(&self) -> Option<CachedData<Vec<SessionInfo>>> {
        self.cache().clone()
    }

    pub fn clear_cache(&self) {
        *self.cache() = None;
    }

    /// Whether the last fetched list has more active sessions than `max`.
    pub fn exceeds_limit(&self, max: usize) -> bool {
        self.cache()
            .as_ref()
            .map(|cached| cached.data.iter().filter(|s| s.is_active).count() > max)
            .unwrap_or(false)
    }
}
