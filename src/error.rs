use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication required: set a GitHub token and try again")]
    AuthRequired,

    #[error("GitHub API rate limit exceeded; quota resets at {reset}")]
    RateLimitExceeded { reset: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("pull request search failed: {0}")]
    Search(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("state error: {0}")]
    State(String),
}

impl Error {
    /// Whether a failed request may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
