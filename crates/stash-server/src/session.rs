//! Per-connection session state.
//!
//! The protocol phase is an explicit state machine rather than a pair of
//! boolean flags: `Unauthenticated -> Authenticated -> AwaitingUpload ->
//! Authenticated`. Disallowed transitions are errors. The counters live on
//! a shared handle so the live-session registry can snapshot them for
//! `STATS` while the connection task retains sole ownership of the phase.

use crate::auth::AuthInfo;
use chrono::{DateTime, Utc};
use stash_core::protocol::{CONTENT_BEGIN, CONTENT_END};
use stash_core::{Result, Role, SentinelAccumulator, StashError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Protocol phase of one connection.
#[derive(Debug)]
pub enum SessionPhase {
    /// Only AUTH lines are legal; everything else is rejected.
    Unauthenticated,
    /// Line-oriented command dispatch.
    Authenticated,
    /// Raw inbound bytes feed the sentinel accumulator until the upload
    /// payload is complete. At most one upload is in flight per session.
    AwaitingUpload {
        target: String,
        accumulator: SentinelAccumulator,
    },
}

/// Connection-task-owned session state: the phase machine plus a reference
/// to the shared, registry-visible handle.
pub struct Session {
    pub handle: std::sync::Arc<SessionHandle>,
    phase: SessionPhase,
}

impl Session {
    pub fn new(handle: std::sync::Arc<SessionHandle>) -> Self {
        Self {
            handle,
            phase: SessionPhase::Unauthenticated,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.phase, SessionPhase::Unauthenticated)
    }

    pub fn awaiting_upload(&self) -> bool {
        matches!(self.phase, SessionPhase::AwaitingUpload { .. })
    }

    /// Transition `Unauthenticated -> Authenticated`, recording identity
    /// and role on the shared handle. The role is set here once and never
    /// changes for the rest of the session.
    pub async fn authenticate(&mut self, info: AuthInfo) -> Result<()> {
        if self.is_authenticated() {
            return Err(StashError::Protocol("Already authenticated".to_string()));
        }
        *self.handle.auth.lock().await = Some(info);
        self.phase = SessionPhase::Authenticated;
        Ok(())
    }

    /// Arm the upload sub-protocol. Entry clears any previously
    /// accumulated buffer by constructing a fresh accumulator. Rejected
    /// while an upload is already in flight.
    pub fn begin_upload(&mut self, target: String, max_bytes: usize) -> Result<()> {
        match self.phase {
            SessionPhase::Authenticated => {
                self.phase = SessionPhase::AwaitingUpload {
                    target,
                    accumulator: SentinelAccumulator::new(CONTENT_BEGIN, CONTENT_END, max_bytes),
                };
                Ok(())
            }
            SessionPhase::AwaitingUpload { .. } => Err(StashError::Protocol(
                "Upload already in progress".to_string(),
            )),
            SessionPhase::Unauthenticated => {
                Err(StashError::Protocol("Not authenticated".to_string()))
            }
        }
    }

    /// Feed one raw inbound chunk to the in-flight upload.
    ///
    /// Returns the target name and extracted payload once the marker pair
    /// is complete. On completion or error the session drops back to
    /// `Authenticated` with all upload state cleared; while incomplete the
    /// phase is left armed and `None` is returned.
    pub fn push_upload_chunk(&mut self, chunk: &[u8]) -> Result<Option<(String, String)>> {
        let SessionPhase::AwaitingUpload { target, accumulator } = &mut self.phase else {
            return Err(StashError::Protocol("No upload in progress".to_string()));
        };

        match accumulator.push(chunk) {
            Ok(Some(payload)) => {
                let target = target.clone();
                self.phase = SessionPhase::Authenticated;
                Ok(Some((target, payload)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.phase = SessionPhase::Authenticated;
                Err(e)
            }
        }
    }
}

/// Registry-visible state of one live connection. Counter updates happen
/// atomically with the read/write they measure; the registry only ever
/// loads them.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: u64,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub auth: Mutex<Option<AuthInfo>>,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub messages_received: AtomicU64,
    last_active_ms: AtomicI64,
}

impl SessionHandle {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            id,
            peer,
            connected_at: now,
            auth: Mutex::new(None),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Record traffic on this connection; resets the idle clock.
    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_active_ms.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    pub async fn username(&self) -> Option<String> {
        self.auth.lock().await.as_ref().map(|a| a.username.clone())
    }

    pub async fn role(&self) -> Option<Role> {
        self.auth.lock().await.as_ref().map(|a| a.role)
    }
}
