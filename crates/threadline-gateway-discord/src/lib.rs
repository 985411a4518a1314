//! Discord gateway for threadline using serenity.
//!
//! Maps the platform-neutral [`ThreadGateway`] contract onto a Discord forum
//! channel: sessions become forum posts, outbound customer messages become
//! thread messages, and the serenity event loop feeds inbound agent replies
//! into the core's event channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serenity::all::{
    AutoArchiveDuration, Channel, ChannelId, ChannelType, CreateForumPost, CreateMessage,
    EditThread, ForumTagId, GatewayIntents, ShardManager,
};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use threadline_gateway::{
    ChannelInfo, ForumTag, GatewayError, GatewayEvent, InboundMessage, MessageAuthor,
    NewThreadPost, ThreadGateway,
};

/// Discord message character limit.
const MAX_MESSAGE_LENGTH: usize = 2000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the Discord gateway.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Discord bot token.
    pub bot_token: String,
    /// Forum channel that receives one post per session.
    pub channel_id: String,
    /// Deadline applied to every REST request.
    pub request_timeout_seconds: u64,
}

// ============================================================================
// Discord Gateway
// ============================================================================

/// Discord connection implementing the [`ThreadGateway`] contract.
///
/// REST operations run over the shared [`Http`] handle and are usable as soon
/// as [`DiscordGateway::connect`] returns; inbound events only start flowing
/// once the websocket handshake completes and [`GatewayEvent::Ready`] is
/// emitted.
pub struct DiscordGateway {
    http: Arc<Http>,
    channel_id: ChannelId,
    request_timeout: Duration,
    shard_manager: Arc<ShardManager>,
}

impl DiscordGateway {
    /// Builds the serenity client and spawns its connection task.
    ///
    /// Returns the gateway handle plus the join handle of the connection
    /// task; the task ends after [`ThreadGateway::disconnect`] shuts the
    /// shards down.
    pub async fn connect(
        config: DiscordConfig,
        events: mpsc::Sender<GatewayEvent>,
    ) -> Result<(Arc<Self>, JoinHandle<()>), GatewayError> {
        let channel_id = parse_channel_id(&config.channel_id)?;

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler { event_tx: events };

        let mut client = Client::builder(&config.bot_token, intents)
            .event_handler(handler)
            .await
            .map_err(|e| GatewayError::Platform(format!("failed to build Discord client: {e}")))?;

        let gateway = Arc::new(Self {
            http: client.http.clone(),
            channel_id,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            shard_manager: client.shard_manager.clone(),
        });

        let connection = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(error = %e, "Discord client error");
            }
            info!("Discord gateway stopped");
        });

        Ok((gateway, connection))
    }

    async fn request<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = serenity::Result<T>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_serenity_error(what, err)),
            Err(_) => Err(GatewayError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

#[async_trait]
impl ThreadGateway for DiscordGateway {
    async fn fetch_channel(&self) -> Result<ChannelInfo, GatewayError> {
        let channel = self
            .request("fetch channel", self.channel_id.to_channel(&self.http))
            .await?;

        let Channel::Guild(channel) = channel else {
            return Err(GatewayError::NotForum(self.channel_id.to_string()));
        };
        if channel.kind != ChannelType::Forum {
            return Err(GatewayError::NotForum(self.channel_id.to_string()));
        }

        let guild = self
            .request("fetch guild", channel.guild_id.to_partial_guild(&self.http))
            .await?;

        Ok(ChannelInfo {
            channel_name: channel.name.clone(),
            server_name: guild.name.clone(),
            server_icon: guild.icon_url(),
            available_tags: channel
                .available_tags
                .iter()
                .map(|tag| ForumTag {
                    id: tag.id.to_string(),
                    name: tag.name.clone(),
                })
                .collect(),
        })
    }

    async fn create_thread(&self, post: NewThreadPost) -> Result<String, GatewayError> {
        let tags = parse_tag_ids(&post.applied_tag_ids);
        let builder = CreateForumPost::new(post.title, CreateMessage::new().content(post.message))
            .auto_archive_duration(AutoArchiveDuration::OneDay)
            .set_applied_tags(tags);

        let thread = self
            .request(
                "create forum post",
                self.channel_id.create_forum_post(&self.http, builder),
            )
            .await?;

        Ok(thread.id.to_string())
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<bool, GatewayError> {
        let id = parse_channel_id(thread_id)?;
        let channel = self.request("fetch thread", id.to_channel(&self.http)).await?;

        match channel {
            Channel::Guild(channel) => Ok(channel.thread_metadata.is_some()),
            _ => Ok(false),
        }
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> Result<String, GatewayError> {
        let id = parse_channel_id(thread_id)?;

        let mut last_id = String::new();
        for chunk in chunk_message(content) {
            if chunk.is_empty() {
                continue;
            }
            let message = self
                .request(
                    "send message",
                    id.send_message(&self.http, CreateMessage::new().content(chunk)),
                )
                .await?;
            last_id = message.id.to_string();
        }

        Ok(last_id)
    }

    async fn apply_thread_tags(
        &self,
        thread_id: &str,
        tag_ids: &[String],
    ) -> Result<(), GatewayError> {
        let id = parse_channel_id(thread_id)?;
        let tags = parse_tag_ids(tag_ids);

        self.request(
            "apply tags",
            id.edit_thread(&self.http, EditThread::new().applied_tags(tags)),
        )
        .await?;

        Ok(())
    }

    async fn disconnect(&self) {
        self.shard_manager.shutdown_all().await;
    }
}

// ============================================================================
// Event Handler
// ============================================================================

struct Handler {
    event_tx: mpsc::Sender<GatewayEvent>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages to avoid loops
        if msg.author.bot {
            return;
        }

        let is_thread = match msg.channel_id.to_channel(&ctx).await {
            Ok(Channel::Guild(channel)) => channel.thread_metadata.is_some(),
            Ok(_) => false,
            Err(e) => {
                debug!(error = %e, channel_id = %msg.channel_id, "could not resolve message channel");
                false
            }
        };

        let event = GatewayEvent::MessageCreated(InboundMessage {
            message_id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            is_thread,
            content: msg.content.clone(),
            timestamp_ms: timestamp_millis(&msg),
            author: MessageAuthor {
                id: msg.author.id.to_string(),
                username: msg.author.name.clone(),
                display_name: msg.author.global_name.clone(),
                avatar_url: Some(msg.author.face()),
                is_bot: msg.author.bot,
            },
        });

        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "failed to forward message event");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            user_id = %ready.user.id,
            "Discord bot connected"
        );

        let event = GatewayEvent::Ready {
            bot_user: ready.user.name.clone(),
        };
        if self.event_tx.send(event).await.is_err() {
            error!("failed to send ready event");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn timestamp_millis(msg: &Message) -> i64 {
    let ts = msg.timestamp;
    ts.unix_timestamp() * 1000 + i64::from(ts.nanosecond() / 1_000_000)
}

fn parse_channel_id(id: &str) -> Result<ChannelId, GatewayError> {
    match id.parse::<u64>() {
        Ok(raw) if raw != 0 => Ok(ChannelId::new(raw)),
        _ => Err(GatewayError::NotFound(format!("invalid channel id: {id}"))),
    }
}

fn parse_tag_ids(tag_ids: &[String]) -> Vec<ForumTagId> {
    tag_ids
        .iter()
        .filter_map(|id| id.parse::<u64>().ok())
        .filter(|raw| *raw != 0)
        .map(ForumTagId::new)
        .collect()
}

fn map_serenity_error(what: &str, err: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(ref response)) = err
        && response.status_code == 404
    {
        return GatewayError::NotFound(what.to_string());
    }
    GatewayError::Platform(format!("{what}: {err}"))
}

fn chunk_message(content: &str) -> Vec<&str> {
    if content.len() <= MAX_MESSAGE_LENGTH {
        return vec![content];
    }

    let mut chunks = Vec::new();
    let mut remaining = content;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LENGTH {
            chunks.push(remaining);
            break;
        }

        // Back off to a char boundary, then prefer a newline split within it
        let mut boundary = MAX_MESSAGE_LENGTH;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let split_at = remaining[..boundary].rfind('\n').unwrap_or(boundary);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_single_chunk() {
        assert_eq!(chunk_message("hello"), vec!["hello"]);
    }

    #[test]
    fn long_message_splits_at_newline() {
        let long = format!("{}\n{}", "a".repeat(1990), "b".repeat(100));
        let chunks = chunk_message(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(1990));
        assert_eq!(chunks[1], "b".repeat(100));
    }

    #[test]
    fn long_message_without_newline_splits_at_limit() {
        let long = "a".repeat(2500);
        let chunks = chunk_message(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_MESSAGE_LENGTH);
        assert_eq!(chunks[1].len(), 500);
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        let long = "한".repeat(1000);
        for chunk in chunk_message(&long) {
            assert!(chunk.len() <= MAX_MESSAGE_LENGTH);
            assert!(chunk.is_char_boundary(chunk.len()));
        }
    }

    #[test]
    fn channel_id_must_be_a_nonzero_snowflake() {
        assert!(parse_channel_id("123456789").is_ok());
        assert!(parse_channel_id("0").is_err());
        assert!(parse_channel_id("not-a-number").is_err());
        assert!(parse_channel_id("").is_err());
    }

    #[test]
    fn unparseable_tag_ids_are_dropped() {
        let tags = parse_tag_ids(&[
            "42".to_string(),
            "garbage".to_string(),
            "0".to_string(),
            "7".to_string(),
        ]);
        assert_eq!(tags.len(), 2);
    }
}
