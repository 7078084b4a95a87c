use tracing_appender::non_blocking::WorkerGuard;

use crate::{infra::config::AppConfig, usecases::engine::EngineSettings};

/// Validated configuration plus the resources that must live as long as the app.
#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    /// Where the configuration came from, for diagnostics.
    pub config_source: String,
    log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(config: AppConfig, config_source: String) -> Self {
        Self {
            config,
            config_source,
            log_guard: None,
        }
    }

    pub fn keep_log_guard(&mut self, guard: Option<WorkerGuard>) {
        self.log_guard = guard;
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            org_id: self.config.agent.org_id.clone(),
            agent_id: self.config.agent.agent_id.clone(),
            page_size: self.config.inbox.page_size,
            conversation_count: self.config.inbox.conversation_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{contracts::ConfigAdapter, stubs::StubConfigAdapter};

    #[test]
    fn engine_settings_follow_agent_and_inbox_sections() {
        let mut config = StubConfigAdapter::default().load().expect("stub config");
        config.inbox.page_size = 50;
        let context = AppContext::new(config, "test".to_owned());

        let settings = context.engine_settings();

        assert_eq!(settings.org_id, "org-1");
        assert_eq!(settings.agent_id, "agent-1");
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.conversation_count, 30);
    }
}
