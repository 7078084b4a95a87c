use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::{
    config::{file_config::FileConfig, AppConfig},
    error::AppError,
};

pub(super) const DEFAULT_CONFIG_PATH: &str = "config.toml";
/// Overrides `agent.access_token` so the token can stay out of the file.
pub const ACCESS_TOKEN_ENV: &str = "INBOX_SYNC_ACCESS_TOKEN";

pub(super) fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load(path: Option<&Path>) -> Result<AppConfig, AppError> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Defaults, then the TOML file when present, then environment overrides.
pub(super) fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<AppConfig, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AppConfig::default();
    if let Some(file_config) = read_file(&resolve_path(path))? {
        file_config.merge_into(&mut config);
    }

    if let Some(token) = env(ACCESS_TOKEN_ENV).filter(|token| !token.trim().is_empty()) {
        config.agent.access_token = token.trim().to_owned();
    }
    Ok(config)
}

fn read_file(config_path: &Path) -> Result<Option<FileConfig>, AppError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(config_path).map_err(|source| AppError::ConfigRead {
        path: config_path.to_path_buf(),
        source,
    })?;

    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| AppError::ConfigParse {
            path: config_path.to_path_buf(),
            source,
        })
}
