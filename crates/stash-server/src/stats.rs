//! Statistics accounting.
//!
//! Global byte totals are process-lifetime monotonic atomics. Per-username
//! counters outlive the session that produced them: they are flushed into
//! a snapshot table when a connection closes and merged additively back
//! into the next session that authenticates under the same username, so a
//! user's counters survive reconnects.

use crate::session::SessionHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use stash_core::Role;
use tokio::sync::Mutex;
use tracing::debug;

/// Last-known counters for a username, kept after disconnect.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserCounters {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
}

/// Process-wide statistics state.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_bytes_received: AtomicU64,
    total_bytes_sent: AtomicU64,
    by_username: Mutex<HashMap<String, UserCounters>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_received(&self, n: u64) {
        self.total_bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_sent(&self, n: u64) {
        self.total_bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Counters previously persisted for a username, if any. The table
    /// entry is left in place; it is overwritten on the next flush.
    pub async fn counters_for(&self, username: &str) -> Option<UserCounters> {
        self.by_username.lock().await.get(username).copied()
    }

    /// Persist a closing session's counters under its username. The
    /// session counters already include anything merged at auth time, so
    /// the stored value is replaced, not added to.
    pub async fn flush_session(&self, username: &str, handle: &SessionHandle) {
        let counters = UserCounters {
            bytes_received: handle.bytes_received.load(Ordering::Relaxed),
            bytes_sent: handle.bytes_sent.load(Ordering::Relaxed),
            messages_received: handle.messages_received.load(Ordering::Relaxed),
        };
        debug!(
            "Flushing stats for user '{}': {} msgs, {} in / {} out",
            username, counters.messages_received, counters.bytes_received, counters.bytes_sent
        );
        self.by_username
            .lock()
            .await
            .insert(username.to_string(), counters);
    }

    /// Build the `STATS` snapshot over the currently live sessions.
    pub async fn snapshot(&self, live: &[Arc<SessionHandle>]) -> StatsReport {
        let mut sessions = Vec::with_capacity(live.len());
        let mut peers: Vec<String> = Vec::new();

        for handle in live {
            let peer = handle.peer.to_string();
            if !peers.contains(&peer) {
                peers.push(peer.clone());
            }
            sessions.push(SessionReport {
                username: handle.username().await,
                address: peer,
                role: handle.role().await,
                messages_received: handle.messages_received.load(Ordering::Relaxed),
                bytes_received: handle.bytes_received.load(Ordering::Relaxed),
                bytes_sent: handle.bytes_sent.load(Ordering::Relaxed),
                last_active: handle.last_active(),
            });
        }
        peers.sort();

        StatsReport {
            timestamp: Utc::now(),
            active_connections: live.len(),
            active_peers: peers,
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            sessions,
        }
    }
}

/// Serializable snapshot returned by the `STATS` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub timestamp: DateTime<Utc>,
    pub active_connections: usize,
    pub active_peers: Vec<String>,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub sessions: Vec<SessionReport>,
}

/// Per-connection breakdown within a [`StatsReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub username: Option<String>,
    pub address: String,
    pub role: Option<Role>,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub last_active: DateTime<Utc>,
}
