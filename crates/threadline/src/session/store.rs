//! Bounded per-session message log with time-based retention.
//!
//! Each session holds an append-only sequence of messages capped at a fixed
//! length (oldest dropped first). A background task sweeps sessions whose
//! most recent message has aged out of the retention window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{Sender, StoredMessage};
use crate::session::current_millis;

/// How often the retention sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// In-memory message history for all sessions.
///
/// Cheap to clone; clones share the same underlying state. Construction
/// spawns the sweep task, so a tokio runtime must be running.
#[derive(Clone)]
pub struct MessageStore {
    max_messages: usize,
    retention_ms: u64,
    sessions: Arc<RwLock<HashMap<String, VecDeque<StoredMessage>>>>,
    sweeper: CancellationToken,
}

impl MessageStore {
    pub fn new(max_messages_per_session: usize, message_retention_ms: u64) -> Self {
        let store = Self {
            max_messages: max_messages_per_session,
            retention_ms: message_retention_ms,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sweeper: CancellationToken::new(),
        };
        store.spawn_sweeper();
        store
    }

    /// Append a message to a session's history.
    ///
    /// Unknown session ids are created lazily. Beyond the per-session cap
    /// the single oldest entry is dropped, regardless of sender.
    pub async fn add_message(&self, session_id: &str, message: StoredMessage) {
        let mut sessions = self.sessions.write().await;
        let messages = sessions.entry(session_id.to_string()).or_default();
        messages.push_back(message);
        if messages.len() > self.max_messages {
            messages.pop_front();
        }
    }

    /// Agent messages appended after the entry with id `after`, in insertion
    /// order.
    ///
    /// The cut is positional, not timestamp-based, so comparisons against a
    /// user-sent id still work. An unknown or evicted `after` id degrades to
    /// returning every stored agent message; an unknown session yields an
    /// empty list.
    pub async fn get_messages(&self, session_id: &str, after: Option<&str>) -> Vec<StoredMessage> {
        let sessions = self.sessions.read().await;
        let Some(messages) = sessions.get(session_id) else {
            return Vec::new();
        };

        let start = after
            .and_then(|id| messages.iter().position(|m| m.id == id))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        messages
            .iter()
            .skip(start)
            .filter(|m| m.sender == Sender::Agent)
            .cloned()
            .collect()
    }

    /// Whether any message has ever been stored for this session.
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Total stored messages for a session, user and agent alike.
    pub async fn message_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Drop every session whose most recent message is older than the
    /// retention window, returning how many were removed.
    ///
    /// Sessions with no messages are never removed by this rule.
    pub async fn sweep_expired_sessions(&self, now_ms: i64) -> usize {
        let retention_ms = self.retention_ms as i64;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, messages| match messages.back() {
            Some(last) => now_ms - last.timestamp <= retention_ms,
            None => true,
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!(sessions = removed, "Swept expired chat sessions");
        }
        removed
    }

    /// Stop the sweep task and drop all stored history. Idempotent.
    pub async fn shutdown(&self) {
        self.sweeper.cancel();
        self.sessions.write().await.clear();
    }

    fn spawn_sweeper(&self) {
        let store = self.clone();
        let cancel = self.sweeper.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick fires immediately; skip it so a fresh store
            // does not sweep at startup.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        store.sweep_expired_sessions(current_millis()).await;
                    }
                }
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
