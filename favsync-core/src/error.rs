use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("favorites API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("favorites API rejected the credentials")]
    Unauthorized,
    #[error("favorites API did not answer within {0:?}")]
    Timeout(Duration),
    #[error("snapshot storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid API base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("configuration error: {0}")]
    Config(String),
}

impl FavoritesError {
    /// Errors that mean the session is gone rather than the network.
    pub fn is_auth(&self) -> bool {
        matches!(self, FavoritesError::Unauthorized)
    }
}
