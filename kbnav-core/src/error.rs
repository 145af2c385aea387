use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Config already exists at {0}")]
    AlreadyExists(String),
}

/// A single math expression that could not be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("{0}")]
    Syntax(String),

    #[error("empty expression")]
    Empty,
}

/// A single diagram block that could not be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagramError {
    #[error("diagram request failed: {0}")]
    Request(String),

    #[error("renderer returned {status}: {message}")]
    Render { status: u16, message: String },

    #[error("diagram source is empty")]
    EmptySource,

    #[error("invalid renderer endpoint: {0}")]
    InvalidEndpoint(String),
}
