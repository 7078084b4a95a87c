use std::path::Path;

use crate::{
    infra::{self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError},
    usecases::context::AppContext,
};

const CONFIG_LOADED: &str = "CONFIG_LOADED";

/// Loads and validates the configuration, then installs logging.
pub fn bootstrap(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let adapter = FileConfigAdapter::new(config_path);
    let mut context = build_context(&adapter)?;
    let guard = infra::logging::init(&context.config.logging)?;
    context.keep_log_guard(guard);

    tracing::info!(
        code = CONFIG_LOADED,
        source = %context.config_source,
        org_id = %context.config.agent.org_id,
        agent_id = %context.config.agent.agent_id,
        "configuration loaded"
    );
    Ok(context)
}

fn build_context(adapter: &dyn ConfigAdapter) -> Result<AppContext, AppError> {
    let config = adapter.load()?;
    config.validate()?;

    Ok(AppContext::new(config, adapter.describe()))
}
