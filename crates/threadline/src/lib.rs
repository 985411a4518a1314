//! threadline bridges a web chat widget to a Discord forum channel.
//!
//! Site visitors chat through an embedded widget; each conversation becomes
//! one forum post where support agents reply from Discord. This library holds
//! the session layer, the HTTP surface, and the gateway event bridge; the
//! `threadline` binary wires them to the Discord gateway.

pub mod api;
pub mod bridge;
pub mod build_info;
pub mod config;
pub mod handlers;
pub mod server;
pub mod session;
