//! Hub actor implementation
//!
//! The process-wide registry of rooms and connected clients. All lookups,
//! room creation and connect/disconnect events flow through one queue, so
//! each room name maps to exactly one room actor.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::error::SendError;
use crate::room::{Room, RoomHandle};
use crate::types::{ClientId, RoomName};

/// Commands sent to the Hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// New client connected
    Register { client: ClientHandle },
    /// Client gone (idempotent)
    Unregister { client_id: ClientId },
    /// Remove a client and ask its connection to close
    Disconnect { client_id: ClientId },
    /// Look up a room by name
    FindRoom {
        name: RoomName,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    /// Create a room; an existing room of that name is returned instead
    CreateRoom {
        name: RoomName,
        reply: oneshot::Sender<RoomHandle>,
    },
    /// Look up a room, creating it if absent
    FindOrCreateRoom {
        name: RoomName,
        reply: oneshot::Sender<RoomHandle>,
    },
    /// Client and room counts
    Stats { reply: oneshot::Sender<HubStats> },
    /// Stop the event loop
    Shutdown,
}

/// Snapshot of hub counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub clients: usize,
    pub rooms: usize,
}

/// Cloneable handle used to talk to the Hub actor
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn register(&self, client: ClientHandle) -> Result<(), SendError> {
        self.send(HubCommand::Register { client }).await
    }

    pub async fn unregister(&self, client_id: ClientId) -> Result<(), SendError> {
        self.send(HubCommand::Unregister { client_id }).await
    }

    /// Force a client off: the hub forgets it and its connection closes
    pub async fn disconnect(&self, client_id: ClientId) -> Result<(), SendError> {
        self.send(HubCommand::Disconnect { client_id }).await
    }

    pub async fn find_room(&self, name: RoomName) -> Result<Option<RoomHandle>, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::FindRoom { name, reply }).await?;
        rx.await.map_err(|_| SendError::ChannelClosed)
    }

    pub async fn create_room(&self, name: RoomName) -> Result<RoomHandle, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::CreateRoom { name, reply }).await?;
        rx.await.map_err(|_| SendError::ChannelClosed)
    }

    pub async fn find_or_create_room(&self, name: RoomName) -> Result<RoomHandle, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::FindOrCreateRoom { name, reply }).await?;
        rx.await.map_err(|_| SendError::ChannelClosed)
    }

    pub async fn stats(&self) -> Result<HubStats, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply }).await?;
        rx.await.map_err(|_| SendError::ChannelClosed)
    }

    /// Stop the hub after the commands already queued
    pub async fn shutdown(&self) -> Result<(), SendError> {
        self.send(HubCommand::Shutdown).await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), SendError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// The Hub actor
///
/// Owns the room table and the set of connected clients.
pub struct Hub {
    /// All connected clients: ClientId -> ClientHandle
    clients: HashMap<ClientId, ClientHandle>,
    /// All rooms: RoomName -> RoomHandle
    rooms: HashMap<RoomName, RoomHandle>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a Hub and its handle without starting it
    pub fn new(capacity: usize) -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::channel(capacity);
        let hub = Self {
            clients: HashMap::new(),
            rooms: HashMap::new(),
            receiver,
        };
        (hub, HubHandle { sender })
    }

    /// Create a Hub and run it on its own task
    pub fn spawn(capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(capacity);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Run the Hub event loop
    ///
    /// Processes commands until `Shutdown` arrives or all handles are dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            if matches!(cmd, HubCommand::Shutdown) {
                break;
            }
            self.handle_command(cmd);
        }

        info!(
            "Hub shutting down with {} client(s) and {} room(s)",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { client } => self.handle_register(client),
            HubCommand::Unregister { client_id } => self.handle_unregister(client_id),
            HubCommand::Disconnect { client_id } => {
                if let Some(client) = self.clients.remove(&client_id) {
                    info!("Disconnecting client {}", client_id);
                    client.request_close();
                }
            }
            HubCommand::FindRoom { name, reply } => {
                let _ = reply.send(self.rooms.get(&name).cloned());
            }
            HubCommand::CreateRoom { name, reply } | HubCommand::FindOrCreateRoom { name, reply } => {
                let _ = reply.send(self.find_or_create_room(name));
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(HubStats {
                    clients: self.clients.len(),
                    rooms: self.rooms.len(),
                });
            }
            HubCommand::Shutdown => {}
        }
    }

    /// Handle new client connection
    fn handle_register(&mut self, client: ClientHandle) {
        info!("Client {} ({}) registered", client.id(), client.name());
        self.clients.insert(client.id(), client);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Handle client disconnection
    fn handle_unregister(&mut self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_some() {
            debug!(
                "Client {} unregistered. Total clients: {}",
                client_id,
                self.clients.len()
            );
        }
    }

    /// Return the room for `name`, spawning its actor on first use
    fn find_or_create_room(&mut self, name: RoomName) -> RoomHandle {
        if let Some(room) = self.rooms.get(&name) {
            return room.clone();
        }

        let room = Room::spawn(name.clone());
        info!("Room {} created", name);
        self.rooms.insert(name, room.clone());
        room
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> RoomName {
        RoomName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_find_missing_room() {
        let (hub, _task) = Hub::spawn(16);
        assert!(hub.find_room(name("lobby")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let (hub, _task) = Hub::spawn(16);
        let created = hub.create_room(name("lobby")).await.unwrap();
        let found = hub.find_room(name("lobby")).await.unwrap().unwrap();
        assert!(created.same_room(&found));
        assert_eq!(found.name().as_str(), "lobby");

        // Creating again hands back the existing room.
        let again = hub.create_room(name("lobby")).await.unwrap();
        assert!(created.same_room(&again));
        assert_eq!(hub.stats().await.unwrap().rooms, 1);
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_creates_once() {
        let (hub, _task) = Hub::spawn(64);

        let joins: Vec<_> = (0..32)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.find_or_create_room(name("lobby")).await.unwrap() })
            })
            .collect();

        let mut rooms = Vec::new();
        for join in joins {
            rooms.push(join.await.unwrap());
        }

        assert!(rooms.iter().all(|r| r.same_room(&rooms[0])));
        assert_eq!(hub.stats().await.unwrap().rooms, 1);
    }

    #[tokio::test]
    async fn test_register_and_unregister_idempotent() {
        let (hub, _task) = Hub::spawn(16);
        let (client, _rx) = ClientHandle::new("alice", 4);
        let client_id = client.id();

        hub.register(client).await.unwrap();
        assert_eq!(hub.stats().await.unwrap().clients, 1);

        hub.unregister(client_id).await.unwrap();
        hub.unregister(client_id).await.unwrap();
        assert_eq!(
            hub.stats().await.unwrap(),
            HubStats {
                clients: 0,
                rooms: 0
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_removes_client() {
        let (hub, _task) = Hub::spawn(16);
        let (client, _rx) = ClientHandle::new("alice", 4);
        let client_id = client.id();

        hub.register(client).await.unwrap();
        hub.disconnect(client_id).await.unwrap();
        hub.disconnect(client_id).await.unwrap();
        assert_eq!(hub.stats().await.unwrap().clients, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let (hub, task) = Hub::spawn(16);
        hub.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(hub.stats().await, Err(SendError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_independent_hubs() {
        let (first, _t1) = Hub::spawn(16);
        let (second, _t2) = Hub::spawn(16);
        first.create_room(name("lobby")).await.unwrap();
        assert!(second.find_room(name("lobby")).await.unwrap().is_none());
    }
}
