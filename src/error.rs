use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Request timed out after {0}ms")]
    TimeoutError(u64),
    #[error("Server error: {message}")]
    ServerError {
        status: Option<u16>,
        message: String,
    },
    #[error("Authentication error: {0}")]
    AuthError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StudioError {
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        StudioError::ServerError {
            status,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StudioError::TimeoutError(_))
    }

    /// Text suitable for a status line. Timeouts get their own hint; server
    /// errors surface only the extracted message, never the raw body.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::TimeoutError(_) => {
                "Generation timed out, try another model or a smaller size".to_string()
            }
            StudioError::ServerError { message, .. } => message.clone(),
            StudioError::ValidationError(msg) | StudioError::AuthError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(e: serde_json::Error) -> Self {
        StudioError::SerializationError(e.to_string())
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(e: reqwest::Error) -> Self {
        StudioError::NetworkError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
