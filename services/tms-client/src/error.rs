//! Error types for the TMS client

/// Errors that can occur when talking to the TMS backend
#[derive(Debug, thiserror::Error)]
pub enum TmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("All API endpoints failed after {} attempts", attempted.len())]
    AllEndpointsFailed {
        /// Candidate URLs in the order they were tried
        attempted: Vec<String>,
        /// Error from the last candidate, kept for diagnostics
        #[source]
        last: Box<TmsError>,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Not connected to the notification feed")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    Socket(String),

    #[error("Failed to send frame: {0}")]
    SendError(String),

    #[error("Alert sink error: {0}")]
    Alert(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for TMS client operations
pub type Result<T> = std::result::Result<T, TmsError>;
