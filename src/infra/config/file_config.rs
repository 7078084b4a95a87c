use std::path::PathBuf;

use serde::Deserialize;

use super::app_config::{AgentConfig, AppConfig, InboxConfig, LogConfig, PushConfig, ServerConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub server: Option<FileServerConfig>,
    pub agent: Option<FileAgentConfig>,
    pub inbox: Option<FileInboxConfig>,
    pub push: Option<FilePushConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(server) = self.server {
            server.merge_into(&mut config.server);
        }

        if let Some(agent) = self.agent {
            agent.merge_into(&mut config.agent);
        }

        if let Some(inbox) = self.inbox {
            inbox.merge_into(&mut config.inbox);
        }

        if let Some(push) = self.push {
            push.merge_into(&mut config.push);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileServerConfig {
    pub base_url: Option<String>,
    pub hub_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl FileServerConfig {
    fn merge_into(self, config: &mut ServerConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }

        if let Some(hub_url) = self.hub_url {
            config.hub_url = hub_url;
        }

        if let Some(timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileAgentConfig {
    pub org_id: Option<String>,
    pub agent_id: Option<String>,
    pub channel: Option<String>,
    pub access_token: Option<String>,
}

impl FileAgentConfig {
    fn merge_into(self, config: &mut AgentConfig) {
        if let Some(org_id) = self.org_id {
            config.org_id = org_id;
        }

        if let Some(agent_id) = self.agent_id {
            config.agent_id = agent_id;
        }

        if let Some(channel) = self.channel {
            config.channel = channel;
        }

        if let Some(access_token) = self.access_token {
            config.access_token = access_token;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileInboxConfig {
    pub page_size: Option<u32>,
    pub conversation_count: Option<u32>,
}

impl FileInboxConfig {
    fn merge_into(self, config: &mut InboxConfig) {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }

        if let Some(count) = self.conversation_count {
            config.conversation_count = count;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FilePushConfig {
    pub retry_delays_ms: Option<Vec<u64>>,
    pub keep_alive_ms: Option<u64>,
    pub server_timeout_ms: Option<u64>,
}

impl FilePushConfig {
    fn merge_into(self, config: &mut PushConfig) {
        if let Some(delays) = self.retry_delays_ms {
            config.retry_delays_ms = delays;
        }

        if let Some(keep_alive_ms) = self.keep_alive_ms {
            config.keep_alive_ms = keep_alive_ms;
        }

        if let Some(timeout_ms) = self.server_timeout_ms {
            config.server_timeout_ms = timeout_ms;
        }
    }
}
