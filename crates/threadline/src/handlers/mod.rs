//! HTTP request handlers.

mod chat;
mod health;
mod version;

pub use chat::{create_session, get_messages, send_message, server_info};
pub use health::{livez, readyz};
pub use version::version;
