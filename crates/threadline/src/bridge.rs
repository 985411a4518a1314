//! Translates inbound gateway events into message-store writes.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use threadline_gateway::{GatewayEvent, InboundMessage};

use crate::api::{Sender, StoredMessage};
use crate::session::{ChatService, SessionStatus};

/// Single consumer of the gateway event channel.
///
/// Filters the event stream down to agent replies inside registered threads
/// and appends them to the message store; everything else is dropped.
#[derive(Clone)]
pub struct EventBridge {
    service: ChatService,
}

impl EventBridge {
    pub fn new(service: ChatService) -> Self {
        Self { service }
    }

    /// Drain the event channel until it closes on gateway disconnect.
    pub fn spawn(self, mut events: mpsc::Receiver<GatewayEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            debug!("Gateway event channel closed");
        })
    }

    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { bot_user } => {
                info!(bot_user = %bot_user, "Gateway ready, accepting sessions");
                self.service.set_ready(true);
            }
            GatewayEvent::MessageCreated(message) => self.handle_message(message).await,
        }
    }

    async fn handle_message(&self, message: InboundMessage) {
        // Bot-authored messages include our own customer relays; dropping
        // them prevents echo loops.
        if message.author.is_bot {
            return;
        }
        if !message.is_thread {
            return;
        }
        let Some(session_id) = self
            .service
            .registry()
            .session_for_thread(&message.channel_id)
            .await
        else {
            return;
        };

        let display = self.service.display();
        let agent_name = display
            .agent_name
            .clone()
            .or_else(|| message.author.display_name.clone())
            .unwrap_or_else(|| message.author.username.clone());
        let agent_avatar = display
            .agent_avatar
            .clone()
            .or_else(|| message.author.avatar_url.clone());

        let first_reply = self
            .service
            .store()
            .get_messages(&session_id, None)
            .await
            .is_empty();

        let stored = StoredMessage {
            id: message.message_id,
            content: message.content,
            sender: Sender::Agent,
            timestamp: message.timestamp_ms,
            agent_name: Some(agent_name),
            agent_avatar,
            metadata: None,
        };
        debug!(session_id = %session_id, message_id = %stored.id, "Agent reply received");
        self.service.store().add_message(&session_id, stored).await;

        if first_reply {
            self.service
                .registry()
                .update_status(&session_id, SessionStatus::InProgress)
                .await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
