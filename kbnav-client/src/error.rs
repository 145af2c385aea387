use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unauthorized: the server rejected the configured credentials")]
    Unauthorized,

    #[error("Decode error: {0}")]
    DecodeError(#[from] serde_json::Error),

    #[error("Not logged in")]
    NoSession,
}

impl ClientError {
    /// True for failures that came back from the server rather than the network.
    pub fn is_status(&self) -> bool {
        matches!(self, ClientError::Status { .. } | ClientError::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
