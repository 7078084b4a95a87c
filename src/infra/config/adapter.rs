use std::path::{Path, PathBuf};

use crate::infra::{
    config::{load, AppConfig},
    contracts::ConfigAdapter,
    error::AppError,
};

use super::loader::resolve_path;

/// TOML file source; a missing file yields the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfigAdapter {
    path: Option<PathBuf>,
}

impl FileConfigAdapter {
    pub fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
        }
    }

    fn resolved_path(&self) -> PathBuf {
        resolve_path(self.path.as_deref())
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<AppConfig, AppError> {
        load(self.path.as_deref())
    }

    fn describe(&self) -> String {
        let path = self.resolved_path();
        if path.exists() {
            path.display().to_string()
        } else {
            format!("{} (not found, using defaults)", path.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_missing_file_as_defaults() {
        let adapter = FileConfigAdapter::new(Some(Path::new("./missing-inbox.toml")));

        assert_eq!(
            adapter.describe(),
            "./missing-inbox.toml (not found, using defaults)"
        );
        assert_eq!(adapter.load().expect("defaults load"), AppConfig::default());
    }
}
