//! The public chat contract: session creation, message routing, polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;
use ulid::Ulid;

use threadline_gateway::{ChannelInfo, ThreadGateway};

use crate::api::{Sender, SessionMetadata, StoredMessage};
use crate::config::WidgetConfig;
use crate::session::current_millis;
use crate::session::error::{ChatError, ChatResult};
use crate::session::registry::ThreadRegistry;
use crate::session::store::MessageStore;

/// Prefix for generated session ids.
const SESSION_ID_PREFIX: &str = "session_";

/// Prefix marking customer-authored messages inside the forum thread.
const CUSTOMER_PREFIX: &str = "**Customer**: ";

/// A freshly created session, as returned to the client.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: String,
    pub thread_id: String,
    pub created_at: i64,
}

/// Orchestrates sessions: id generation, outbound sends, polling reads.
///
/// Cheap to clone; clones share readiness, store, and registry state.
#[derive(Clone)]
pub struct ChatService {
    gateway: Arc<dyn ThreadGateway>,
    store: MessageStore,
    registry: ThreadRegistry,
    display: WidgetConfig,
    ready: Arc<AtomicBool>,
}

impl ChatService {
    pub fn new(gateway: Arc<dyn ThreadGateway>, store: MessageStore, display: WidgetConfig) -> Self {
        let registry = ThreadRegistry::new(Arc::clone(&gateway));
        Self {
            gateway,
            store,
            registry,
            display,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip readiness; set once the gateway handshake completes.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Create a session backed by a fresh forum thread.
    pub async fn create_session(
        &self,
        metadata: Option<SessionMetadata>,
    ) -> ChatResult<CreatedSession> {
        if !self.is_ready() {
            return Err(ChatError::NotReady);
        }

        let session_id = generate_session_id();
        let thread_id = self
            .registry
            .create_thread(&session_id, metadata.as_ref())
            .await?;
        info!(session_id = %session_id, thread_id = %thread_id, "Created chat session");

        Ok(CreatedSession {
            session_id,
            thread_id,
            created_at: current_millis(),
        })
    }

    /// Forward a customer message into the session's thread and record it.
    ///
    /// The stored copy keeps the raw content (no customer prefix) under
    /// `sender=user`, so agent-only polling never echoes it while its id
    /// still works as a positional cursor.
    pub async fn send_customer_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> ChatResult<StoredMessage> {
        if !self.is_ready() {
            return Err(ChatError::NotReady);
        }

        let Some(thread_id) = self.registry.resolve_thread(session_id).await else {
            return Err(ChatError::SessionNotFound(session_id.to_string()));
        };

        let message_id = self
            .gateway
            .send_message(&thread_id, &format!("{CUSTOMER_PREFIX}{content}"))
            .await?;

        let message = StoredMessage {
            id: message_id,
            content: content.to_string(),
            sender: Sender::User,
            timestamp: current_millis(),
            agent_name: None,
            agent_avatar: None,
            metadata: None,
        };
        self.store.add_message(session_id, message.clone()).await;
        Ok(message)
    }

    /// New agent messages for a polling client; pure store delegation, no
    /// existence check. Unknown sessions simply yield empty.
    pub async fn get_messages(&self, session_id: &str, after: Option<&str>) -> Vec<StoredMessage> {
        self.store.get_messages(session_id, after).await
    }

    /// Whether the id names a live, addressable session.
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.registry.has_session(session_id).await
    }

    /// Channel metadata for the widget's boot handshake.
    pub async fn server_info(&self) -> ChatResult<ChannelInfo> {
        if !self.is_ready() {
            return Err(ChatError::NotReady);
        }
        Ok(self.gateway.fetch_channel().await?)
    }

    /// Tear down the gateway connection and message store. Idempotent.
    pub async fn shutdown(&self) {
        self.set_ready(false);
        self.gateway.disconnect().await;
        self.store.shutdown().await;
    }

    pub(crate) fn store(&self) -> &MessageStore {
        &self.store
    }

    pub(crate) fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub(crate) fn display(&self) -> &WidgetConfig {
        &self.display
    }
}

/// `session_` plus a ULID: time-ordered and unique enough for the creation
/// rate of a support widget. Not an auth token.
fn generate_session_id() -> String {
    format!("{SESSION_ID_PREFIX}{}", Ulid::new())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use threadline_gateway::{ForumTag, GatewayError, NewThreadPost};

    struct RecordingGateway {
        sent: Mutex<Vec<(String, String)>>,
        send_fails: AtomicBool,
        next_id: AtomicUsize,
    }

    impl RecordingGateway {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                send_fails: AtomicBool::new(false),
                next_id: AtomicUsize::new(1),
            })
        }
    }

    #[async_trait]
    impl ThreadGateway for RecordingGateway {
        async fn fetch_channel(&self) -> Result<ChannelInfo, GatewayError> {
            Ok(ChannelInfo {
                channel_name: "support".to_string(),
                server_name: "Acme".to_string(),
                server_icon: Some("https://cdn.example/icon.png".to_string()),
                available_tags: vec![ForumTag {
                    id: "10".to_string(),
                    name: "waiting".to_string(),
                }],
            })
        }

        async fn create_thread(&self, _post: NewThreadPost) -> Result<String, GatewayError> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("thread-{id}"))
        }

        async fn fetch_thread(&self, _thread_id: &str) -> Result<bool, GatewayError> {
            Ok(true)
        }

        async fn send_message(
            &self,
            thread_id: &str,
            content: &str,
        ) -> Result<String, GatewayError> {
            if self.send_fails.load(Ordering::SeqCst) {
                return Err(GatewayError::Platform("send failed".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((thread_id.to_string(), content.to_string()));
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("msg-{id}"))
        }

        async fn apply_thread_tags(
            &self,
            _thread_id: &str,
            _tag_ids: &[String],
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn disconnect(&self) {}
    }

    fn ready_service(gateway: Arc<RecordingGateway>) -> ChatService {
        let store = MessageStore::new(100, 86_400_000);
        let service = ChatService::new(gateway, store, WidgetConfig::default());
        service.set_ready(true);
        service
    }

    #[tokio::test]
    async fn test_create_session_fails_before_ready() {
        let store = MessageStore::new(100, 86_400_000);
        let service = ChatService::new(RecordingGateway::new(), store, WidgetConfig::default());

        let err = service.create_session(None).await.unwrap_err();
        assert!(matches!(err, ChatError::NotReady));
    }

    #[tokio::test]
    async fn test_create_session_generates_prefixed_unique_ids() {
        let service = ready_service(RecordingGateway::new());

        let first = service.create_session(None).await.unwrap();
        let second = service.create_session(None).await.unwrap();

        assert!(first.session_id.starts_with("session_"));
        assert_ne!(first.session_id, second.session_id);
        assert!(service.has_session(&first.session_id).await);
        assert!(service.has_session(&second.session_id).await);
        assert!(first.created_at > 0);
    }

    #[tokio::test]
    async fn test_send_customer_message_posts_prefix_and_stores_raw() {
        let gateway = RecordingGateway::new();
        let service = ready_service(gateway.clone());
        let session = service.create_session(None).await.unwrap();

        let stored = service
            .send_customer_message(&session.session_id, "hello there")
            .await
            .unwrap();

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, session.thread_id);
        assert_eq!(sent[0].1, "**Customer**: hello there");

        // Stored copy is raw, tagged as the user, under the gateway's id.
        assert_eq!(stored.content, "hello there");
        assert_eq!(stored.sender, Sender::User);
        assert_eq!(stored.id, "msg-2");

        // Agent-only polling never echoes it.
        assert!(service.get_messages(&session.session_id, None).await.is_empty());
        assert_eq!(service.store().message_count(&session.session_id).await, 1);
    }

    #[tokio::test]
    async fn test_send_customer_message_unknown_session() {
        let service = ready_service(RecordingGateway::new());

        let err = service
            .send_customer_message("session_nope", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_send_customer_message_not_ready() {
        let gateway = RecordingGateway::new();
        let service = ready_service(gateway.clone());
        let session = service.create_session(None).await.unwrap();

        service.set_ready(false);
        let err = service
            .send_customer_message(&session.session_id, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotReady));
    }

    #[tokio::test]
    async fn test_send_failure_stores_nothing() {
        let gateway = RecordingGateway::new();
        let service = ready_service(gateway.clone());
        let session = service.create_session(None).await.unwrap();

        gateway.send_fails.store(true, Ordering::SeqCst);
        let err = service
            .send_customer_message(&session.session_id, "hi")
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::GatewayUnavailable(_)));
        assert_eq!(service.store().message_count(&session.session_id).await, 0);
    }

    #[tokio::test]
    async fn test_get_messages_unknown_session_is_empty() {
        let service = ready_service(RecordingGateway::new());
        assert!(service.get_messages("session_nope", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_server_info_requires_ready() {
        let store = MessageStore::new(100, 86_400_000);
        let service = ChatService::new(RecordingGateway::new(), store, WidgetConfig::default());

        assert!(matches!(
            service.server_info().await.unwrap_err(),
            ChatError::NotReady
        ));

        service.set_ready(true);
        let info = service.server_info().await.unwrap();
        assert_eq!(info.server_name, "Acme");
        assert_eq!(info.channel_name, "support");
        assert_eq!(info.server_icon.as_deref(), Some("https://cdn.example/icon.png"));
    }

    #[tokio::test]
    async fn test_shutdown_clears_readiness_and_history() {
        let service = ready_service(RecordingGateway::new());
        let session = service.create_session(None).await.unwrap();
        service
            .send_customer_message(&session.session_id, "hi")
            .await
            .unwrap();

        service.shutdown().await;

        assert!(!service.is_ready());
        assert!(!service.store().has_session(&session.session_id).await);
    }
}
