//! Room actor
//!
//! A room owns its membership set and processes register, unregister and
//! broadcast commands one at a time from a private queue. Every member
//! sees broadcasts in the order the room processed them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::client::ClientHandle;
use crate::error::SendError;
use crate::message::Message;
use crate::types::{ClientId, RoomName};

/// Commands accepted by a room
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a member (no-op if already present)
    Register(ClientHandle),
    /// Remove a member (no-op if absent)
    Unregister(ClientId),
    /// Fan a message out to every member, sender included
    Broadcast(Message),
    /// Snapshot of current member IDs
    Members(oneshot::Sender<Vec<ClientId>>),
}

/// Cloneable reference to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    sender: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn register(&self, client: ClientHandle) -> Result<(), SendError> {
        self.send(RoomCommand::Register(client))
    }

    pub fn unregister(&self, client_id: ClientId) -> Result<(), SendError> {
        self.send(RoomCommand::Unregister(client_id))
    }

    pub fn broadcast(&self, message: Message) -> Result<(), SendError> {
        self.send(RoomCommand::Broadcast(message))
    }

    /// Current member IDs, after every command queued before this call
    pub async fn members(&self) -> Result<Vec<ClientId>, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Members(reply))?;
        rx.await.map_err(|_| SendError::ChannelClosed)
    }

    /// Check whether two handles point at the same room actor
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    fn send(&self, cmd: RoomCommand) -> Result<(), SendError> {
        self.sender.send(cmd).map_err(|_| SendError::ChannelClosed)
    }
}

/// The room actor itself
pub struct Room {
    name: RoomName,
    /// Current members: ClientId -> ClientHandle
    members: HashMap<ClientId, ClientHandle>,
    receiver: mpsc::UnboundedReceiver<RoomCommand>,
}

impl Room {
    /// Create a room actor and its handle without starting it
    pub fn new(name: RoomName) -> (Self, RoomHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let room = Self {
            name: name.clone(),
            members: HashMap::new(),
            receiver,
        };
        (room, RoomHandle { name, sender })
    }

    /// Create a room and run it on its own task
    pub fn spawn(name: RoomName) -> RoomHandle {
        let (room, handle) = Self::new(name);
        tokio::spawn(room.run());
        handle
    }

    /// Run the room event loop until every handle is dropped
    pub async fn run(mut self) {
        debug!("Room {} started", self.name);

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Room {} stopped", self.name);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Register(client) => {
                self.members.entry(client.id()).or_insert(client);
                debug!("Room {} has {} member(s)", self.name, self.members.len());
            }
            RoomCommand::Unregister(client_id) => {
                if self.members.remove(&client_id).is_some() {
                    debug!("Room {} has {} member(s)", self.name, self.members.len());
                }
            }
            RoomCommand::Broadcast(message) => self.broadcast(&message),
            RoomCommand::Members(reply) => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    /// Encode once and queue for every member without waiting
    ///
    /// A member whose queue is full misses this message, is dropped from the
    /// room and asked to disconnect. Members whose queue is closed are
    /// removed silently.
    fn broadcast(&mut self, message: &Message) {
        let payload: Arc<str> = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize message for room {}: {}", self.name, e);
                return;
            }
        };

        let mut evicted = Vec::new();
        for (client_id, client) in &self.members {
            match client.try_deliver(Arc::clone(&payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Client {} queue is full, dropping it from room {}",
                        client_id, self.name
                    );
                    client.request_close();
                    evicted.push(*client_id);
                }
                Err(TrySendError::Closed(_)) => evicted.push(*client_id),
            }
        }

        for client_id in evicted {
            self.members.remove(&client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn lobby() -> RoomName {
        RoomName::parse("lobby").unwrap()
    }

    fn chat(text: &str) -> Message {
        let json = format!(
            r#"{{"action":"send-message","message":"{}","target":{{"id":"lobby"}}}}"#,
            text
        );
        Message::decode(&json).unwrap()
    }

    async fn recv_text(rx: &mut mpsc::Receiver<Arc<str>>) -> String {
        let payload = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        value["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let room = Room::spawn(lobby());
        let (alice, mut alice_rx) = ClientHandle::new("alice", 8);
        let (bob, mut bob_rx) = ClientHandle::new("bob", 8);

        room.register(alice).unwrap();
        room.register(bob).unwrap();
        room.broadcast(chat("hi")).unwrap();

        assert_eq!(recv_text(&mut alice_rx).await, "hi");
        assert_eq!(recv_text(&mut bob_rx).await, "hi");
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let room = Room::spawn(lobby());
        let (alice, mut alice_rx) = ClientHandle::new("alice", 8);

        room.register(alice.clone()).unwrap();
        room.register(alice.clone()).unwrap();
        assert_eq!(room.members().await.unwrap(), vec![alice.id()]);

        // A double registration must not double-deliver.
        room.broadcast(chat("once")).unwrap();
        assert_eq!(recv_text(&mut alice_rx).await, "once");
        room.members().await.unwrap();
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let room = Room::spawn(lobby());
        let (alice, _alice_rx) = ClientHandle::new("alice", 8);
        let (bob, _bob_rx) = ClientHandle::new("bob", 8);

        room.register(alice.clone()).unwrap();
        room.unregister(bob.id()).unwrap();
        room.unregister(alice.id()).unwrap();
        room.unregister(alice.id()).unwrap();

        assert!(room.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let room = Room::spawn(lobby());
        let (alice, mut alice_rx) = ClientHandle::new("alice", 8);
        let (bob, mut bob_rx) = ClientHandle::new("bob", 8);

        room.register(alice).unwrap();
        room.register(bob.clone()).unwrap();
        room.unregister(bob.id()).unwrap();
        room.broadcast(chat("after")).unwrap();

        assert_eq!(recv_text(&mut alice_rx).await, "after");
        room.members().await.unwrap();
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_members_observe_submission_order() {
        let room = Room::spawn(lobby());
        let (alice, mut alice_rx) = ClientHandle::new("alice", 64);
        let (bob, mut bob_rx) = ClientHandle::new("bob", 64);
        room.register(alice).unwrap();
        room.register(bob).unwrap();

        for i in 0..20 {
            room.broadcast(chat(&i.to_string())).unwrap();
        }

        for i in 0..20 {
            assert_eq!(recv_text(&mut alice_rx).await, i.to_string());
            assert_eq!(recv_text(&mut bob_rx).await, i.to_string());
        }
    }

    #[tokio::test]
    async fn test_full_queue_evicts_slow_member_only() {
        let room = Room::spawn(lobby());
        let (fast, mut fast_rx) = ClientHandle::new("fast", 8);
        let (slow, _slow_rx) = ClientHandle::new("slow", 1);
        room.register(fast.clone()).unwrap();
        room.register(slow).unwrap();

        room.broadcast(chat("1")).unwrap();
        room.broadcast(chat("2")).unwrap();

        assert_eq!(recv_text(&mut fast_rx).await, "1");
        assert_eq!(recv_text(&mut fast_rx).await, "2");
        assert_eq!(room.members().await.unwrap(), vec![fast.id()]);
    }

    #[tokio::test]
    async fn test_closed_member_is_removed() {
        let room = Room::spawn(lobby());
        let (gone, gone_rx) = ClientHandle::new("gone", 8);
        room.register(gone).unwrap();
        drop(gone_rx);

        room.broadcast(chat("anyone?")).unwrap();
        assert!(room.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_room() {
        let room = Room::spawn(lobby());
        let other = Room::spawn(lobby());
        assert!(room.same_room(&room.clone()));
        assert!(!room.same_room(&other));
    }
}
