//! Notification wire frames and channel events

use serde::{Deserialize, Serialize};

use crate::error::TmsError;
use crate::store::Notification;

/// Priority of a ticket notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = TmsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(TmsError::InvalidValue(format!("Unknown priority: {}", s))),
        }
    }
}

/// Payload of a `notification` frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    /// Server-assigned identifier; generated client-side when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub ticket_id: String,
    pub subject: String,
    pub priority: Priority,
    #[serde(default)]
    pub status: String,
    pub message: String,
    /// ISO-8601 timestamp, as sent by the backend
    pub timestamp: String,
}

/// Frame exchanged over the notification socket
///
/// Every frame is a JSON object with a `type` discriminator. The client
/// sends `{"type":"ping"}` heartbeats; the server answers with `pong` and
/// pushes `notification` frames as tickets arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Notification(NotificationFrame),
    Ping,
    Pong,
}

impl Frame {
    /// The literal heartbeat frame sent by the client
    pub const PING: &'static str = r#"{"type":"ping"}"#;

    /// The literal reply to a server-initiated ping
    pub const PONG: &'static str = r#"{"type":"pong"}"#;
}

/// Event published to channel subscribers
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The socket is open and receiving frames
    Connected,
    /// The socket closed or errored; buffered notifications are retained
    Disconnected { reason: String },
    /// A reconnection attempt is starting
    Reconnecting {
        attempt: u32,
        max_attempts: Option<u32>,
    },
    /// Reconnection stopped without restoring the connection
    ReconnectGaveUp { reason: String },
    /// A notification frame was parsed and buffered
    NotificationReceived(Notification),
}
