use crate::infra::{config::AppConfig, error::AppError};

pub trait ConfigAdapter {
    fn load(&self) -> Result<AppConfig, AppError>;

    /// Human-readable origin of the configuration.
    fn describe(&self) -> String;
}
