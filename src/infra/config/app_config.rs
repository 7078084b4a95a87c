use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::infra::error::AppError;

const MAX_PAGE_SIZE: u32 = 100;
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub inbox: InboxConfig,
    pub push: PushConfig,
}

impl AppConfig {
    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.agent.org_id.trim().is_empty() {
            return Err(invalid("agent.org_id", "must not be empty"));
        }
        if self.agent.agent_id.trim().is_empty() {
            return Err(invalid("agent.agent_id", "must not be empty"));
        }
        if !(self.server.base_url.starts_with("http://")
            || self.server.base_url.starts_with("https://"))
        {
            return Err(invalid("server.base_url", "must be an http(s) URL"));
        }
        if !(self.server.hub_url.starts_with("ws://") || self.server.hub_url.starts_with("wss://")) {
            return Err(invalid("server.hub_url", "must be a ws(s) URL"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(invalid("server.request_timeout_ms", "must be positive"));
        }
        if self.inbox.page_size == 0 || self.inbox.page_size > MAX_PAGE_SIZE {
            return Err(invalid(
                "inbox.page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.inbox.conversation_count == 0 {
            return Err(invalid("inbox.conversation_count", "must be positive"));
        }
        if self.push.retry_delays_ms.is_empty() {
            return Err(invalid("push.retry_delays_ms", "must list at least one delay"));
        }
        if self.push.keep_alive_ms == 0 || self.push.keep_alive_ms >= self.push.server_timeout_ms {
            return Err(invalid(
                "push.keep_alive_ms",
                "must be positive and shorter than push.server_timeout_ms",
            ));
        }
        Ok(())
    }

    /// Copy that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.agent.access_token.is_empty() {
            copy.agent.access_token = REDACTED.to_owned();
        }
        copy
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> AppError {
    AppError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub base_url: String,
    pub hub_url: String,
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_owned(),
            hub_url: "ws://localhost:5000/hubs/chat".to_owned(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    pub org_id: String,
    pub agent_id: String,
    /// Channel announced to the hub on every connect.
    pub channel: String,
    pub access_token: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            org_id: String::new(),
            agent_id: String::new(),
            channel: "web".to_owned(),
            access_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboxConfig {
    pub page_size: u32,
    pub conversation_count: u32,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            conversation_count: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushConfig {
    /// Delay before each reconnect attempt; the last entry repeats.
    pub retry_delays_ms: Vec<u64>,
    pub keep_alive_ms: u64,
    pub server_timeout_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: vec![0, 2_000, 10_000, 30_000],
            keep_alive_ms: 15_000,
            server_timeout_ms: 30_000,
        }
    }
}
