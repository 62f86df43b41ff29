use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to '{0}' timed out")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL '{0}' doesn't match scheme://host/... and cannot anchor a redirect")]
    MalformedRedirectBase(String),

    #[error("Could not find specified interceptor '{0}'")]
    UnknownInterceptor(String),

    #[error("Could not find specified filter '{0}'")]
    UnknownFilter(String),

    #[error("Interceptor failed: {0}")]
    Interceptor(String),

    #[error("An error occurred while parsing the content: {0}")]
    Rewrite(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl From<ConfigError> for ProxyError {
    fn from(e: ConfigError) -> Self {
        ProxyError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
