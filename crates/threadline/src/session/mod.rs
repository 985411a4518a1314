//! Chat session management.
//!
//! ```text
//!  HTTP handlers ──▶ ChatService ──▶ ThreadRegistry ──▶ gateway threads
//!                        │                 ▲
//!                        ▼                 │ reverse lookup
//!                   MessageStore ◀── EventBridge ◀── gateway events
//! ```
//!
//! - **MessageStore**: bounded per-session history with a retention sweep.
//! - **ThreadRegistry**: session↔thread mapping plus thread lifecycle calls.
//! - **ChatService**: the public contract handlers and the bridge talk to.

mod error;
mod registry;
mod service;
mod store;

pub use error::{ChatError, ChatResult};
pub use registry::{SessionStatus, ThreadRegistry};
pub use service::{ChatService, CreatedSession};
pub use store::MessageStore;

/// Milliseconds since the Unix epoch.
pub(crate) fn current_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
