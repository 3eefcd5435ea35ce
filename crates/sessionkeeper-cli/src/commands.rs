//! Command handlers. Each runs against an initialized manager.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sessionkeeper_core::{
    CurrentUser, DeviceIdentity, LifecycleState, RefreshOutcome, SessionInfo, TokenCodec,
    TokenManager, TokenPair,
};
use tracing::debug;

use crate::cli::Command;

/// How long to wait for a refresh started by `initialize` to finish.
const SETTLE_TIMEOUT_SECS: u64 = 35;

/// How long to wait for the background fingerprint after startup.
const FINGERPRINT_WAIT_MS: u64 = 2000;

pub async fn run(command: Command, manager: &TokenManager) -> Result<()> {
    match command {
        Command::Status { json } => {
            wait_settled(manager).await;
            status(manager, json)
        }
        Command::Import {
            access_token,
            refresh_token,
        } => import(manager, access_token, refresh_token).await,
        Command::Refresh => refresh(manager).await,
        Command::Sessions { json } => {
            wait_settled(manager).await;
            sessions(manager, json).await
        }
        Command::Terminate { session_id } => {
            wait_settled(manager).await;
            require_auth(manager)?;
            if !manager.terminate_session(&session_id).await {
                bail!("Failed to terminate session {}", session_id);
            }
            println!("Terminated session {}", session_id);
            Ok(())
        }
        Command::TerminateOthers => {
            wait_settled(manager).await;
            require_auth(manager)?;
            if !manager.terminate_other_sessions().await {
                bail!("Failed to terminate other sessions");
            }
            println!("Terminated all other sessions");
            Ok(())
        }
        Command::Logout => {
            manager.clear_tokens();
            println!("Signed out");
            Ok(())
        }
        Command::Purge => {
            manager.cleanup();
            println!("Removed stored tokens and encrypted data (device id kept)");
            Ok(())
        }
        Command::Fingerprint => {
            let identity = device_identity_settled(manager).await;
            println!(
                "{}",
                fingerprint_report(&identity, manager.config().enable_fingerprinting)
            );
            Ok(())
        }
        Command::Watch { duration_secs } => watch(manager, Duration::from_secs(duration_secs)).await,
    }
}

/// Wait out a refresh that `initialize` kicked off for a nearly expired token.
async fn wait_settled(manager: &TokenManager) {
    let mut status = manager.subscribe();
    let settled = tokio::time::timeout(
        Duration::from_secs(SETTLE_TIMEOUT_SECS),
        status.wait_for(|state| {
            !matches!(state, LifecycleState::Refreshing | LifecycleState::RefreshFailed)
        }),
    )
    .await
    .is_ok();
    if !settled {
        debug!("Gave up waiting for the startup refresh");
    }
}

fn require_auth(manager: &TokenManager) -> Result<()> {
    if !manager.is_authenticated() {
        bail!("Not signed in. Import a token pair with `sessionkeeper import`.");
    }
    Ok(())
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusReport {
    state: LifecycleState,
    authenticated: bool,
    user: Option<CurrentUser>,
    expires_in_seconds: Option<i64>,
    next_refresh_at: Option<DateTime<Utc>>,
    device_id: String,
    fingerprint: Option<String>,
}

impl StatusReport {
    fn collect(manager: &TokenManager) -> Self {
        let device = manager.device_identity();
        Self {
            state: manager.state(),
            authenticated: manager.is_authenticated(),
            user: manager.current_user(),
            expires_in_seconds: manager.token_time_remaining().map(|d| d.num_seconds()),
            next_refresh_at: manager.next_refresh_at(),
            device_id: device.device_id,
            fingerprint: device.fingerprint,
        }
    }
}

fn status(manager: &TokenManager, json: bool) -> Result<()> {
    let report = StatusReport::collect(manager);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("State:         {:?}", report.state);
    match &report.user {
        Some(user) => {
            println!("User:          {} <{}> ({})", user.username, user.email, user.role);
            println!("Session:       {}", user.session_id);
        }
        None => println!("User:          not signed in"),
    }
    if let Some(secs) = report.expires_in_seconds {
        println!("Expires in:    {}", format_duration(secs));
    }
    if let Some(at) = report.next_refresh_at {
        println!("Next refresh:  {}", format_time(at));
    }
    println!("Device:        {}", report.device_id);
    Ok(())
}

// ============================================================================
// Tokens
// ============================================================================

async fn import(manager: &TokenManager, access_token: String, refresh_token: String) -> Result<()> {
    if refresh_token.trim().is_empty() {
        bail!("Refresh token must not be empty");
    }
    let claims = TokenCodec::decode(&access_token)
        .context("Access token is not a readable JWT (missing sessionId or exp?)")?;
    let now = Utc::now();
    if claims.expires_at <= now {
        bail!("Access token already expired at {}", format_time(claims.expires_at));
    }

    manager
        .set_tokens(TokenPair::new(access_token, refresh_token, now, claims.expires_at))
        .await;
    println!("Signed in as {} (session {})", claims.username, claims.session_id);
    if let Some(at) = manager.next_refresh_at() {
        println!("Next refresh at {}", format_time(at));
    }
    Ok(())
}

async fn refresh(manager: &TokenManager) -> Result<()> {
    match manager.manual_refresh().await {
        RefreshOutcome::Refreshed { user } => {
            let username = user
                .map(|u| u.username)
                .or_else(|| manager.current_user().map(|u| u.username));
            match username {
                Some(username) => println!("Tokens refreshed for {}", username),
                None => println!("Tokens refreshed"),
            }
            Ok(())
        }
        RefreshOutcome::ReauthRequired(reason) => {
            bail!("Refresh failed ({:?}). Stored credentials were cleared; sign in again.", reason)
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

async fn sessions(manager: &TokenManager, json: bool) -> Result<()> {
    require_auth(manager)?;
    let sessions = manager.active_sessions().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    let current = manager.current_user().map(|u| u.session_id);
    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for session in &sessions {
        println!("{}", session_line(session, current.as_deref()));
    }

    if manager.session_limit_exceeded() {
        println!(
            "\nWarning: more than {} active sessions",
            manager.config().max_concurrent_sessions
        );
    }
    Ok(())
}

fn session_line(session: &SessionInfo, current: Option<&str>) -> String {
    let marker = if Some(session.session_id.as_str()) == current {
        "*"
    } else {
        " "
    };
    format!(
        "{} {:<24} {:<16} {:<20} {:<8} last active {}",
        marker,
        session.session_id,
        session.ip_address,
        session.location.as_deref().unwrap_or("-"),
        if session.is_active { "active" } else { "inactive" },
        format_time(session.last_activity_at),
    )
}

// ============================================================================
// Device
// ============================================================================

async fn device_identity_settled(manager: &TokenManager) -> DeviceIdentity {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(FINGERPRINT_WAIT_MS);
    loop {
        let identity = manager.device_identity();
        if identity.fingerprint.is_some()
            || !manager.config().enable_fingerprinting
            || tokio::time::Instant::now() >= deadline
        {
            return identity;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn fingerprint_report(identity: &DeviceIdentity, enabled: bool) -> String {
    let fingerprint = match (&identity.fingerprint, enabled) {
        (Some(fingerprint), _) => fingerprint.as_str(),
        (None, true) => "not ready",
        (None, false) => "disabled",
    };
    format!(
        "Device id:    {}\nFingerprint:  {}",
        identity.device_id, fingerprint
    )
}

// ============================================================================
// Watch
// ============================================================================

async fn watch(manager: &TokenManager, duration: Duration) -> Result<()> {
    let mut status = manager.subscribe();
    let deadline = tokio::time::Instant::now() + duration;
    print_transition(manager, *status.borrow_and_update());

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *status.borrow_and_update();
                print_transition(manager, state);
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }
    Ok(())
}

fn print_transition(manager: &TokenManager, state: LifecycleState) {
    let next = manager
        .next_refresh_at()
        .map(|at| format!(" (next refresh {})", format_time(at)))
        .unwrap_or_default();
    println!("{} {:?}{}", Local::now().format("%H:%M:%S"), state, next);
}

// ============================================================================
// Formatting
// ============================================================================

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}
