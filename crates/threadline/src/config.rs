//! Configuration loading for the threadline server.
//!
//! Configuration lives in a YAML file (`threadline.yaml` by default) and is
//! expanded for `${VAR}` environment references before parsing, so secrets
//! like the Discord bot token can stay out of the file itself. A missing file
//! yields the built-in defaults.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordSettings,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("discord.bot_token is not configured")]
    MissingBotToken,

    #[error("discord.channel_id is not configured")]
    MissingChannelId,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_saphyr::from_str(&expanded)?)
    }

    /// Check that everything the Discord connection needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        if self.discord.channel_id.trim().is_empty() {
            return Err(ConfigError::MissingChannelId);
        }
        Ok(())
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3971
}

fn default_request_timeout() -> u64 {
    300
}

fn default_discord_request_timeout() -> u64 {
    10
}

fn default_max_messages_per_session() -> usize {
    100
}

fn default_message_retention_ms() -> u64 {
    // 24 hours
    86_400_000
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// Nested references (`${VAR:-${OTHER}}`) are not supported, and an unclosed
/// `${` returns an error.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        result.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            // `$$` collapses to a literal dollar sign.
            result.push('$');
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('{') {
            let Some(close) = body.find('}') else {
                return Err(ConfigError::UnclosedVarReference);
            };
            result.push_str(&resolve_var_reference(&body[..close])?);
            rest = &body[close + 1..];
        } else {
            // A `$` not followed by `{` stays literal (e.g. `$100`).
            result.push('$');
            rest = after;
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve the body of a `${...}` reference.
///
/// `NAME` requires the variable to be set; `NAME:-default` falls back to the
/// (possibly empty) default when it is not.
fn resolve_var_reference(body: &str) -> Result<String, ConfigError> {
    let (name, default) = match body.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (body, None),
    };

    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => match default {
            Some(default) => Ok(default.to_string()),
            None => Err(ConfigError::MissingEnvVar(name.to_string())),
        },
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Origins allowed to call the HTTP API. Empty means any origin, which
    /// suits a widget embedded on arbitrary pages.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// DiscordSettings
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSettings {
    /// Discord bot token.
    #[serde(default)]
    pub bot_token: String,

    /// Forum channel that receives one post per chat session.
    #[serde(default)]
    pub channel_id: String,

    /// Timeout for individual Discord REST calls.
    #[serde(default = "default_discord_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: String::new(),
            request_timeout_seconds: default_discord_request_timeout(),
        }
    }
}

// ============================================================================
// WidgetConfig
// ============================================================================

/// Overrides for how agent replies are presented to the widget.
///
/// When unset, replies fall back to the Discord author's display name and
/// avatar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetConfig {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub agent_avatar: Option<String>,
}

// ============================================================================
// SessionsConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Per-session message cap; the oldest message is dropped beyond it.
    #[serde(default = "default_max_messages_per_session")]
    pub max_messages_per_session: usize,

    /// How long an idle session's messages are kept before the hourly sweep
    /// removes them.
    #[serde(default = "default_message_retention_ms")]
    pub message_retention_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_messages_per_session: default_max_messages_per_session(),
            message_retention_ms: default_message_retention_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
