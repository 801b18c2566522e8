//! Error types for gateway client operations

use thiserror::Error;

use crate::config::ConfigError;
use crate::request::RequestError;
use crate::stream::ChannelError;

/// Result type alias for gateway client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during gateway client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Event channel error
    #[error("Event channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Request failed before a usable response arrived
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    /// The server replied, but the body was not valid JSON
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Built outside a tokio runtime without an explicit handle
    #[error("No tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// An event channel is already live
    #[error("Event channel already connected")]
    AlreadyConnected,
}
