use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Direction, Message, SessionStatus};

/// Events pushed to dashboard clients over the WebSocket channel.
///
/// Delivery is at-most-once; clients reconcile by polling the REST API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    #[serde(rename = "ready")]
    Ready { user_id: i64, email: String },

    /// The messaging bridge connected, disconnected or produced a new QR code
    #[serde(rename = "wa:status")]
    WaStatus(SessionStatus),

    /// A message was sent or received
    #[serde(rename = "message:new")]
    MessageNew {
        peer: String,
        id: i64,
        direction: Direction,
        text: String,
        created_at: DateTime<Utc>,
    },
}

impl From<&Message> for GatewayEvent {
    fn from(message: &Message) -> Self {
        Self::MessageNew {
            peer: message.peer().to_string(),
            id: message.id,
            direction: message.direction,
            text: message.text.clone(),
            created_at: message.created_at,
        }
    }
}
