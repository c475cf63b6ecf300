use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("loading configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
