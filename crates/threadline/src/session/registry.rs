//! Session to forum-thread mapping and thread lifecycle.
//!
//! The registry owns the 1:1 mapping between session ids and gateway thread
//! ids, and every gateway call that touches a thread's lifecycle: creating
//! the forum post, probing whether a thread is still alive, and re-tagging
//! posts as the support flow progresses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use threadline_gateway::{ForumTag, NewThreadPost, ThreadGateway};

use crate::api::SessionMetadata;
use crate::session::error::ChatResult;

// ============================================================================
// Session Status
// ============================================================================

/// Support-flow status reflected onto the forum post's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Completed,
}

impl SessionStatus {
    /// Tag names that represent this status, matched case-insensitively.
    /// Korean names come first since deployments in that locale predate the
    /// English ones.
    fn tag_names(self) -> &'static [&'static str] {
        match self {
            SessionStatus::Waiting => &["대기중", "waiting"],
            SessionStatus::InProgress => &["진행중", "in-progress"],
            SessionStatus::Completed => &["완료", "completed", "done"],
        }
    }
}

// ============================================================================
// Mapping Pair
// ============================================================================

/// Both directions of the session/thread mapping.
///
/// Kept in one struct so every insert or delete updates both sides under a
/// single write guard; the two maps can never be observed out of step.
#[derive(Default)]
struct MappingPair {
    session_to_thread: HashMap<String, String>,
    thread_to_session: HashMap<String, String>,
}

impl MappingPair {
    fn insert(&mut self, session_id: String, thread_id: String) {
        self.session_to_thread
            .insert(session_id.clone(), thread_id.clone());
        self.thread_to_session.insert(thread_id, session_id);
    }

    fn remove(&mut self, session_id: &str, thread_id: &str) {
        self.session_to_thread.remove(session_id);
        self.thread_to_session.remove(thread_id);
    }
}

// ============================================================================
// Thread Registry
// ============================================================================

/// Cheap to clone; clones share the same mapping state.
#[derive(Clone)]
pub struct ThreadRegistry {
    gateway: Arc<dyn ThreadGateway>,
    mappings: Arc<RwLock<MappingPair>>,
}

impl ThreadRegistry {
    pub fn new(gateway: Arc<dyn ThreadGateway>) -> Self {
        Self {
            gateway,
            mappings: Arc::new(RwLock::new(MappingPair::default())),
        }
    }

    /// Open a forum post for a new session and record the mapping.
    ///
    /// The mapping is inserted only after the gateway call succeeds; a failed
    /// create leaves the registry untouched.
    pub async fn create_thread(
        &self,
        session_id: &str,
        metadata: Option<&SessionMetadata>,
    ) -> ChatResult<String> {
        let channel = self.gateway.fetch_channel().await?;
        let waiting_tag = find_status_tag(&channel.available_tags, SessionStatus::Waiting);

        let created_at = Utc::now();
        let post = NewThreadPost {
            title: format_post_title(session_id, created_at),
            message: format_welcome_message(session_id, created_at, metadata),
            applied_tag_ids: waiting_tag
                .map(|tag| vec![tag.id.clone()])
                .unwrap_or_default(),
        };

        let thread_id = self.gateway.create_thread(post).await?;
        self.mappings
            .write()
            .await
            .insert(session_id.to_string(), thread_id.clone());
        debug!(session_id = %session_id, thread_id = %thread_id, "Created thread for session");
        Ok(thread_id)
    }

    /// Resolve the live thread for a session.
    ///
    /// A mapping whose thread no longer resolves on the gateway is orphaned:
    /// both directions are removed and the session reads as gone. A fetch
    /// that finds a non-thread channel reports no thread but keeps the
    /// mapping, since the id may resolve again later.
    pub async fn resolve_thread(&self, session_id: &str) -> Option<String> {
        let thread_id = self
            .mappings
            .read()
            .await
            .session_to_thread
            .get(session_id)
            .cloned()?;

        match self.gateway.fetch_thread(&thread_id).await {
            Ok(true) => Some(thread_id),
            Ok(false) => None,
            Err(err) => {
                debug!(
                    session_id = %session_id,
                    thread_id = %thread_id,
                    error = %err,
                    "Dropping orphaned session mapping"
                );
                self.remove_if_current(session_id, &thread_id).await;
                None
            }
        }
    }

    /// Reverse lookup for inbound gateway events.
    pub async fn session_for_thread(&self, thread_id: &str) -> Option<String> {
        self.mappings
            .read()
            .await
            .thread_to_session
            .get(thread_id)
            .cloned()
    }

    /// Membership check against the mapping only; does not probe the gateway.
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.mappings
            .read()
            .await
            .session_to_thread
            .contains_key(session_id)
    }

    /// Re-tag the session's forum post for a support-flow status change.
    ///
    /// Status tags are cosmetic: a missing tag, a dead thread, or a gateway
    /// failure all reduce to a debug-logged no-op.
    pub async fn update_status(&self, session_id: &str, status: SessionStatus) {
        let Some(thread_id) = self.resolve_thread(session_id).await else {
            debug!(session_id = %session_id, "No live thread for status update");
            return;
        };

        let channel = match self.gateway.fetch_channel().await {
            Ok(channel) => channel,
            Err(err) => {
                debug!(error = %err, "Skipping status update, channel fetch failed");
                return;
            }
        };

        let Some(tag) = find_status_tag(&channel.available_tags, status) else {
            debug!(session_id = %session_id, status = ?status, "No matching status tag");
            return;
        };

        if let Err(err) = self
            .gateway
            .apply_thread_tags(&thread_id, std::slice::from_ref(&tag.id))
            .await
        {
            debug!(
                session_id = %session_id,
                error = %err,
                "Failed to update status tag"
            );
        }
    }

    /// Remove a mapping pair, but only if it still points where it did when
    /// we looked it up; a racing create may have remapped the session while
    /// the gateway fetch was in flight.
    async fn remove_if_current(&self, session_id: &str, thread_id: &str) {
        let mut mappings = self.mappings.write().await;
        if mappings
            .session_to_thread
            .get(session_id)
            .is_some_and(|current| current == thread_id)
        {
            mappings.remove(session_id, thread_id);
        }
    }
}

// ============================================================================
// Tag + Post Formatting
// ============================================================================

/// Find a channel tag matching the status by case-insensitive name lookup.
fn find_status_tag(tags: &[ForumTag], status: SessionStatus) -> Option<&ForumTag> {
    tags.iter().find(|tag| {
        status
            .tag_names()
            .iter()
            .any(|name| tag.name.eq_ignore_ascii_case(name))
    })
}

/// Forum post title, e.g. `Support #A1B2C3 (08/23 14:05)`.
fn format_post_title(session_id: &str, created_at: DateTime<Utc>) -> String {
    format!(
        "Support #{} ({})",
        short_session_ref(session_id),
        created_at.format("%m/%d %H:%M")
    )
}

/// Last six characters of the session id, uppercased.
fn short_session_ref(session_id: &str) -> String {
    let tail_start = session_id
        .char_indices()
        .rev()
        .nth(5)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    session_id[tail_start..].to_uppercase()
}

/// Markdown body for the forum post's opening message.
fn format_welcome_message(
    session_id: &str,
    created_at: DateTime<Utc>,
    metadata: Option<&SessionMetadata>,
) -> String {
    let mut body = format!(
        "## 🎫 New support session\n\n\
         **Session ID**: `{session_id}`\n\
         **Started**: {}\n",
        created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(metadata) = metadata {
        let referrer = metadata.referrer.as_deref().filter(|r| !r.is_empty());
        let browser = metadata
            .user_agent
            .as_deref()
            .filter(|ua| !ua.is_empty())
            .map(parse_browser);
        if referrer.is_some() || browser.is_some() {
            body.push_str("\n### 📋 Visitor\n");
            if let Some(referrer) = referrer {
                body.push_str(&format!("- **Referrer**: {referrer}\n"));
            }
            if let Some(browser) = browser {
                body.push_str(&format!("- **Browser**: {browser}\n"));
            }
        }
    }

    body.push_str("\n*Replies in this thread are delivered to the customer.*");
    body
}

/// Coarse browser family from a user-agent string, by first substring match.
fn parse_browser(user_agent: &str) -> &'static str {
    if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else if user_agent.contains("Edge") {
        "Edge"
    } else {
        "Unknown"
    }
}

// ============================================================================
// Tests
// ============================================================================
