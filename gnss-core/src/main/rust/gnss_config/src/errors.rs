use thiserror::Error;

pub type ConfigResult<T> = std::result::Result<T, GnssConfigError>;

#[derive(Error,Debug)]
pub enum GnssConfigError {
    #[error("config file not found: {0}")]
    ConfigFileNotFound(String),

    #[error("config parse error {0}")]
    ConfigParseError(String),

    #[error("config write error {0}")]
    ConfigWriteError(String),

    #[error("no value for environment reference {0}")]
    EnvRefError(String),

    #[error("credentials error {0}")]
    CredentialsError(String),

    #[error("IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("config RON error {0}")]
    RonError( #[from] ron::Error),

    #[error("config serialize/deserialize RON error {0}")]
    RonSerdeError( #[from] ron::error::SpannedError),

    #[error("config error {0}")]
    ConfigError(String)
}

pub fn config_error (s: impl ToString) -> GnssConfigError {
    GnssConfigError::ConfigError(s.to_string())
}
