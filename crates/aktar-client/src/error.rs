//! Client error types.

use aktar_common::AktarError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, timeout, undecodable body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered `{ success: false, message }`
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server answered 401
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Rejected locally before any state change (validation, stock)
    #[error(transparent)]
    Rejected(#[from] AktarError),
}

impl ClientError {
    /// Message to show the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Unauthorized(message) => message.clone(),
            Self::Rejected(err) => err.user_message(),
            Self::Http(_) => "Sunucuya ulaşılamadı, lütfen tekrar deneyin".to_string(),
            Self::Storage(_) => "Yerel veriler kaydedilemedi".to_string(),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
