use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnssCacheError>;

#[derive(Error,Debug)]
pub enum GnssCacheError {
    /// index I/O failure - fatal to the current operation, durability is at stake
    #[error("cache index error {0}")]
    IndexError( #[from] rusqlite::Error),

    #[error("cache IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("archive error {0}")]
    ArchiveError( #[from] gnss_archive::errors::GnssArchiveError),

    #[error("product error {0}")]
    ProductError( #[from] gnss_products::errors::GnssProductError),

    #[error("config error {0}")]
    ConfigError(String),

    #[error("unknown request {0}")]
    UnknownRequest(String)
}

pub fn config_error (s: impl ToString) -> GnssCacheError {
    GnssCacheError::ConfigError(s.to_string())
}
