use crate::infra::{config::AppConfig, contracts::ConfigAdapter, error::AppError};

/// Fixed in-memory configuration with a usable agent identity.
#[derive(Debug, Clone)]
pub struct StubConfigAdapter {
    pub config: AppConfig,
}

impl Default for StubConfigAdapter {
    fn default() -> Self {
        let mut config = AppConfig::default();
        config.agent.org_id = "org-1".to_owned();
        config.agent.agent_id = "agent-1".to_owned();
        Self { config }
    }
}

impl ConfigAdapter for StubConfigAdapter {
    fn load(&self) -> Result<AppConfig, AppError> {
        Ok(self.config.clone())
    }

    fn describe(&self) -> String {
        "in-memory stub".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_config_is_valid() {
        let config = StubConfigAdapter::default().load().expect("stub config must load");

        assert!(config.validate().is_ok());
    }
}
