use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnssDailyError>;

#[derive(Error,Debug)]
pub enum GnssDailyError {
    #[error("scheduler config error: {0}")]
    ConfigError(String),

    #[error("bad date '{0}'")]
    DateError(String),

    #[error("variable substitution error: {0}")]
    SubstError(String),

    #[error("scheduler IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("object store error {0}")]
    ObjectStoreError( #[from] object_store::Error)
}

pub fn config_error (s: impl ToString) -> GnssDailyError {
    GnssDailyError::ConfigError(s.to_string())
}

pub fn subst_error (s: impl ToString) -> GnssDailyError {
    GnssDailyError::SubstError(s.to_string())
}
