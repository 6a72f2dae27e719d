use thiserror::Error;

/// Errors produced by the backend adapters.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Connection, TLS or body transfer failure.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    /// The backend is unreachable (used by the in-process backends).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Build a [`RemoteError::Status`] from an error response body, pulling
    /// the human-readable message out of the usual JSON error shapes.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                ["msg", "message", "error_description", "error"]
                    .iter()
                    .find_map(|key| match json.get(*key) {
                        Some(serde_json::Value::String(s)) => Some(s.clone()),
                        Some(serde_json::Value::Object(inner)) => inner
                            .get("message")
                            .and_then(|m| m.as_str())
                            .map(str::to_string),
                        _ => None,
                    })
            })
            .unwrap_or_else(|| body.trim().to_string());

        Self::Status { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RemoteError>;
