//! Gateway contract between the threadline core and a messaging platform.
//!
//! The core never talks to a chat platform directly. It drives an opaque
//! [`ThreadGateway`] for outbound operations (create a forum post, send a
//! message into a thread, fetch channel metadata) and consumes a stream of
//! [`GatewayEvent`]s for inbound traffic. Platform crates (currently Discord)
//! implement the trait and feed the event channel; everything
//! platform-specific stays on their side of this boundary.

use async_trait::async_trait;
use thiserror::Error;

/// Capacity of the inbound event channel between a gateway and the core.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The configured channel exists but is not a forum-capable channel.
    #[error("channel {0} is not a forum channel")]
    NotForum(String),

    /// The requested channel, thread, or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform rejected or failed the request.
    #[error("gateway request failed: {0}")]
    Platform(String),

    /// The request did not complete within the configured deadline.
    #[error("gateway request timed out after {0}s")]
    Timeout(u64),
}

// ============================================================================
// Outbound Types
// ============================================================================

/// A selectable status tag on a forum channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTag {
    pub id: String,
    pub name: String,
}

/// Metadata for the configured forum channel and its parent server.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub channel_name: String,
    pub server_name: String,
    pub server_icon: Option<String>,
    pub available_tags: Vec<ForumTag>,
}

/// Payload for opening a new forum post.
#[derive(Debug, Clone)]
pub struct NewThreadPost {
    pub title: String,
    pub message: String,
    pub applied_tag_ids: Vec<String>,
}

// ============================================================================
// Inbound Events
// ============================================================================

/// Events emitted by a gateway connection.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The connection handshake completed; outbound operations may begin.
    Ready { bot_user: String },
    /// A message was created somewhere the connection can see.
    MessageCreated(InboundMessage),
}

/// A platform message, flattened to what the routing layer needs.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: String,
    /// Channel the message was posted in; for thread messages this is the
    /// thread id itself.
    pub channel_id: String,
    pub is_thread: bool,
    pub content: String,
    pub timestamp_ms: i64,
    pub author: MessageAuthor,
}

#[derive(Debug, Clone)]
pub struct MessageAuthor {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_bot: bool,
}

// ============================================================================
// Gateway Trait
// ============================================================================

/// Outbound operations a messaging platform must provide.
///
/// Every method is expected to enforce a bounded deadline internally and
/// surface expiry as [`GatewayError::Timeout`]; callers never wait
/// indefinitely on a platform request.
#[async_trait]
pub trait ThreadGateway: Send + Sync {
    /// Fetches the configured channel together with its parent server
    /// metadata and available tags. Fails with [`GatewayError::NotForum`]
    /// when the id resolves to anything other than a forum channel.
    async fn fetch_channel(&self) -> Result<ChannelInfo, GatewayError>;

    /// Opens a new forum post and returns the created thread id.
    async fn create_thread(&self, post: NewThreadPost) -> Result<String, GatewayError>;

    /// Checks whether an id still resolves on the platform. Returns
    /// `Ok(true)` for a live thread, `Ok(false)` when the id resolves to a
    /// non-thread channel, and [`GatewayError::NotFound`] when it no longer
    /// resolves at all.
    async fn fetch_thread(&self, thread_id: &str) -> Result<bool, GatewayError>;

    /// Sends a message into a thread and returns the platform message id.
    async fn send_message(&self, thread_id: &str, content: &str) -> Result<String, GatewayError>;

    /// Replaces the applied tags on a thread.
    async fn apply_thread_tags(&self, thread_id: &str, tag_ids: &[String])
    -> Result<(), GatewayError>;

    /// Tears the platform connection down. Idempotent.
    async fn disconnect(&self);
}
