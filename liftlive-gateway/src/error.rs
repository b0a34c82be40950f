use thiserror::Error;

use crate::client::SessionId;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown client event: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} payload: {reason}")]
    MalformedPayload { event: &'static str, reason: String },

    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    #[error("Gateway server not started")]
    NotStarted,

    #[error("Gateway server already running")]
    AlreadyRunning,
}

impl GatewayError {
    /// Short code sent to clients in `processing_error`
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Io(_) => "io_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::MalformedFrame(_) => "malformed_frame",
            GatewayError::UnknownEvent(_) => "unknown_event",
            GatewayError::MalformedPayload { .. } => "malformed_payload",
            GatewayError::SessionClosed(_) => "session_closed",
            GatewayError::NotStarted => "not_started",
            GatewayError::AlreadyRunning => "already_running",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
