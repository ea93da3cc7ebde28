//! Message protocol definitions
//!
//! One JSON envelope is used in both directions:
//!
//! ```json
//! { "action": "send-message", "message": "hi",
//!   "target": { "id": "lobby" }, "sender": { "id": "...", "name": "alice" } }
//! ```
//!
//! For `join-room` and `leave-room` the room name travels in `message`,
//! not in `target`. `sender` is never read from the wire; the server
//! stamps it on every decoded message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, RoomName};

/// Operation tag carried by every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Broadcast `message` to the room named by `target`
    SendMessage,
    /// Join (creating if needed) the room named by `message`
    JoinRoom,
    /// Leave the room named by `message`
    LeaveRoom,
}

/// Room reference as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
}

/// Sender identity attached server-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderInfo {
    pub id: ClientId,
    pub name: String,
}

/// Wire and internal message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default, skip_deserializing)]
    pub sender: Option<SenderInfo>,
}

impl Message {
    /// Decode one text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode once for fan-out; the result is shared by every recipient queue.
    pub fn encode(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    /// Replace whatever sender the message carries
    pub fn stamp(&mut self, sender: SenderInfo) {
        self.sender = Some(sender);
    }

    /// Room named by `target`, used by `send-message`
    pub fn target_room(&self) -> Option<RoomName> {
        self.target
            .as_ref()
            .and_then(|t| RoomName::parse(t.id.as_str()))
    }

    /// Room named by the `message` field, used by `join-room` / `leave-room`
    pub fn room_argument(&self) -> Option<RoomName> {
        RoomName::parse(self.message.as_str())
    }
}
