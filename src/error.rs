//! Error types for the Jellyfin library provider.

use thiserror::Error;

/// Errors that can occur while talking to Jellyfin or adapting its catalog.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Jellyfin client has not been initialized")]
    NotInitialized,

    #[error("Unable to locate Jellyfin user: {0}")]
    UserNotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {path}: {body}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
        body: String,
    },

    #[error("Invalid webhook payload: {0}")]
    Webhook(String),

    #[error("{kind} is missing {field}")]
    MissingParent {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Unsupported Jellyfin media type: {0:?}")]
    UnsupportedItem(String),
}

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;
