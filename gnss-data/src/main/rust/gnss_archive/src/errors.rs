use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnssArchiveError>;

#[derive(Error,Debug)]
pub enum GnssArchiveError {
    /// transport level failure - the archive may serve the same request later
    #[error("transport error: {0}")]
    Transport(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("wildcard matches more than one file: {0}")]
    Ambiguous(String),

    /// the archive can never serve this request
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("archive not connected: {0}")]
    NotConnected(String),

    #[error("archive config error: {0}")]
    ConfigError(String),

    #[error("compression error: {0}")]
    CompressionError(String),

    #[error("archive IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("http error {0}")]
    HttpError( #[from] reqwest::Error),

    #[error("ftp error {0}")]
    FtpError( #[from] suppaftp::FtpError),

    #[error("object store error {0}")]
    ObjectStoreError( #[from] object_store::Error),

    #[error("product error {0}")]
    ProductError( #[from] gnss_products::errors::GnssProductError)
}

impl GnssArchiveError {
    /// can a later attempt against the same archive succeed
    pub fn is_retryable (&self) -> bool {
        use GnssArchiveError::*;
        matches!( self,
            Transport(_) | NotFound(_) | Ambiguous(_) | NotConnected(_) |
            IOError(_) | HttpError(_) | FtpError(_) | ObjectStoreError(_))
    }
}

pub fn config_error (s: impl ToString) -> GnssArchiveError {
    GnssArchiveError::ConfigError(s.to_string())
}

pub fn transport_error (s: impl ToString) -> GnssArchiveError {
    GnssArchiveError::Transport(s.to_string())
}
