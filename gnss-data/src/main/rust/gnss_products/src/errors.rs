use thiserror::Error;

pub type Result<T> = std::result::Result<T, GnssProductError>;

#[derive(Error,Debug)]
pub enum GnssProductError {
    #[error("malformed template '{0}': {1}")]
    TemplateError(String,String),

    #[error("unknown template token [{0}]")]
    UnknownToken(String),

    #[error("template requires a station but the request has none")]
    MissingStation,

    #[error("unknown product type {0}/{1}")]
    UnknownProduct(String,String),

    #[error("product catalog error: {0}")]
    CatalogError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error {0}")]
    ConfigError( #[from] gnss_config::errors::GnssConfigError)
}

pub fn catalog_error (s: impl ToString) -> GnssProductError {
    GnssProductError::CatalogError(s.to_string())
}
