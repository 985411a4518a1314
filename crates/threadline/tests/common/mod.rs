//! Common test utilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use threadline::config::WidgetConfig;
use threadline::session::{ChatService, MessageStore};
use threadline_gateway::{
    ChannelInfo, ForumTag, GatewayError, GatewayEvent, InboundMessage, MessageAuthor,
    NewThreadPost, ThreadGateway,
};

/// How [`FakeGateway::fetch_thread`] answers existence probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadProbe {
    Live,
    NotThread,
    Missing,
}

/// Scriptable in-memory gateway standing in for Discord.
///
/// Records every outbound call and exposes failure toggles so tests can
/// drive each error path through the real service stack.
pub struct FakeGateway {
    pub created_posts: Mutex<Vec<NewThreadPost>>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub applied_tags: Mutex<Vec<(String, Vec<String>)>>,
    pub channel_fails: AtomicBool,
    pub create_fails: AtomicBool,
    pub send_fails: AtomicBool,
    pub thread_probe: Mutex<ThreadProbe>,
    next_thread: AtomicUsize,
    next_message: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created_posts: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            applied_tags: Mutex::new(Vec::new()),
            channel_fails: AtomicBool::new(false),
            create_fails: AtomicBool::new(false),
            send_fails: AtomicBool::new(false),
            thread_probe: Mutex::new(ThreadProbe::Live),
            next_thread: AtomicUsize::new(1),
            next_message: AtomicUsize::new(1),
        })
    }
}

#[async_trait]
impl ThreadGateway for FakeGateway {
    async fn fetch_channel(&self) -> Result<ChannelInfo, GatewayError> {
        if self.channel_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Platform("channel fetch failed".to_string()));
        }
        Ok(ChannelInfo {
            channel_name: "support".to_string(),
            server_name: "Acme".to_string(),
            server_icon: Some("https://cdn.example/icon.png".to_string()),
            available_tags: vec![
                ForumTag {
                    id: "10".to_string(),
                    name: "대기중".to_string(),
                },
                ForumTag {
                    id: "11".to_string(),
                    name: "in-progress".to_string(),
                },
                ForumTag {
                    id: "12".to_string(),
                    name: "done".to_string(),
                },
            ],
        })
    }

    async fn create_thread(&self, post: NewThreadPost) -> Result<String, GatewayError> {
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Platform("thread creation failed".to_string()));
        }
        self.created_posts.lock().unwrap().push(post);
        let id = self.next_thread.fetch_add(1, Ordering::SeqCst);
        Ok(format!("thread-{id}"))
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<bool, GatewayError> {
        match *self.thread_probe.lock().unwrap() {
            ThreadProbe::Live => Ok(true),
            ThreadProbe::NotThread => Ok(false),
            ThreadProbe::Missing => Err(GatewayError::NotFound(thread_id.to_string())),
        }
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> Result<String, GatewayError> {
        if self.send_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Platform("send failed".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((thread_id.to_string(), content.to_string()));
        let id = self.next_message.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg-{id}"))
    }

    async fn apply_thread_tags(
        &self,
        thread_id: &str,
        tag_ids: &[String],
    ) -> Result<(), GatewayError> {
        self.applied_tags
            .lock()
            .unwrap()
            .push((thread_id.to_string(), tag_ids.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) {}
}

/// Service wired to a fresh fake gateway, before the ready handshake.
pub fn unready_service() -> (ChatService, Arc<FakeGateway>) {
    let gateway = FakeGateway::new();
    let store = MessageStore::new(100, 86_400_000);
    let service = ChatService::new(gateway.clone(), store, WidgetConfig::default());
    (service, gateway)
}

/// Service wired to a fresh fake gateway, past the ready handshake.
pub fn test_service() -> (ChatService, Arc<FakeGateway>) {
    let (service, gateway) = unready_service();
    service.set_ready(true);
    (service, gateway)
}

/// An inbound agent reply as the gateway would report it.
pub fn agent_reply(thread_id: &str, message_id: &str, content: &str) -> GatewayEvent {
    GatewayEvent::MessageCreated(InboundMessage {
        message_id: message_id.to_string(),
        channel_id: thread_id.to_string(),
        is_thread: true,
        content: content.to_string(),
        timestamp_ms: 1_700_000_000_000,
        author: MessageAuthor {
            id: "7".to_string(),
            username: "helpdesk".to_string(),
            display_name: Some("Help Desk".to_string()),
            avatar_url: None,
            is_bot: false,
        },
    })
}
