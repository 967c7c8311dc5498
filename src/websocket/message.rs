use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::connection_manager::ConnectionId;
use crate::error::RelayError;
use crate::transport::Frame;

/// Addressed message sent by a client under unicast routing:
/// `{ "id": "<recipient>", "message": "<text>" }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient identity; empty means everyone but the sender
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

impl Envelope {
    pub fn parse(payload: &[u8]) -> Result<Self, RelayError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn recipient(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }
}

/// Text delivered to a unicast recipient, attributed to the sender
pub fn delivery_text(sender: &ConnectionId, message: &str) -> String {
    format!("You have message from {}: {}", sender, message)
}

/// Join-time announcement: the joiner's identity and everyone connected at
/// that moment, the joiner marked with "(You)"
pub fn welcome_text(own: &ConnectionId, members: &[ConnectionId]) -> String {
    let listing: Vec<String> = members
        .iter()
        .map(|id| {
            if id == own {
                format!("{} (You)", id)
            } else {
                id.to_string()
            }
        })
        .collect();

    format!(
        "Welcome! Your Client ID: {}\nConnected Clients:\n{}",
        own,
        listing.join("\n")
    )
}

/// Extract the joiner's identity from a welcome announcement
pub fn parse_welcome_id(text: &str) -> Option<ConnectionId> {
    let first = text.lines().next()?;
    first
        .strip_prefix("Welcome! Your Client ID: ")
        .map(|id| ConnectionId::from(id.trim()))
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(data) => Frame::Ping(data.to_vec()),
            Message::Pong(data) => Frame::Pong(data.to_vec()),
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        }
    }
}
