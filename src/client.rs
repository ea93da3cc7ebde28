//! Client actor
//!
//! A `Client` bridges one WebSocket connection to the hub and its rooms.
//! It runs two loops:
//! - the inbound loop decodes frames and dispatches them by action
//! - the outbound loop drains the client's bounded queue into the socket
//!
//! Rooms and the hub never own a `Client`; they hold a `ClientHandle`,
//! which is just the client's identity plus the sending side of its queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::hub::HubHandle;
use crate::message::{Action, Message, SenderInfo};
use crate::room::RoomHandle;
use crate::types::{ClientId, RoomName};

/// Upper bound on frames coalesced into one flush
const MAX_BATCH: usize = 64;

/// How long a disconnected client waits for its writer to flush
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Non-owning reference to a live client
///
/// Cheap to clone. Holding one keeps the client's outbound queue open,
/// so rooms and the hub drop theirs on unregister.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    name: Arc<str>,
    outbound: mpsc::Sender<Arc<str>>,
    close: Arc<Notify>,
}

impl ClientHandle {
    /// Create a handle with a fresh identity and a bounded outbound queue
    ///
    /// The returned receiver is the other end of that queue and belongs to
    /// the client's outbound loop.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: ClientId::new(),
            name: Arc::from(name.into()),
            outbound,
            close: Arc::new(Notify::new()),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sender_info(&self) -> SenderInfo {
        SenderInfo {
            id: self.id,
            name: self.name.to_string(),
        }
    }

    /// Queue an encoded message without waiting
    pub fn try_deliver(&self, payload: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.outbound.try_send(payload)
    }

    /// Ask the client to disconnect
    ///
    /// The request is remembered if the client is not currently waiting,
    /// so it cannot be lost.
    pub fn request_close(&self) {
        self.close.notify_one();
    }
}

/// Server-side actor for one connection
pub struct Client {
    handle: ClientHandle,
    hub: HubHandle,
    /// Rooms this client has joined, keyed by name
    rooms: HashMap<RoomName, RoomHandle>,
}

impl Client {
    pub fn new(handle: ClientHandle, hub: HubHandle) -> Self {
        Self {
            handle,
            hub,
            rooms: HashMap::new(),
        }
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Check whether the client currently counts itself a member of `name`
    pub fn in_room(&self, name: &RoomName) -> bool {
        self.rooms.contains_key(name)
    }

    /// Drive the connection until it closes, then disconnect
    ///
    /// `outbound` must be the receiver returned alongside this client's handle.
    pub async fn run<S>(mut self, ws: S, outbound: mpsc::Receiver<Arc<str>>)
    where
        S: Stream<Item = Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Send
            + 'static,
    {
        let client_id = self.handle.id();
        let (sink, mut stream) = ws.split();
        let mut writer = tokio::spawn(write_loop(client_id, sink, outbound));
        let close = Arc::clone(&self.handle.close);

        let writer_done = tokio::select! {
            _ = self.read_loop(&mut stream) => {
                debug!("Read loop ended for {}", client_id);
                false
            }
            _ = &mut writer => {
                debug!("Write loop ended for {}", client_id);
                true
            }
            _ = close.notified() => {
                debug!("Close requested for {}", client_id);
                false
            }
        };

        self.disconnect().await;
        drop(stream);

        // The writer exits once every handle to the queue is gone.
        if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            warn!("Writer for {} did not finish, aborting", client_id);
            writer.abort();
        }
    }

    /// Inbound loop: one frame at a time until close or error
    async fn read_loop<R>(&mut self, stream: &mut R)
    where
        R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    if self.handle_text(&text).await.is_err() {
                        debug!("Hub closed, ending read loop for {}", self.handle.id());
                        break;
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    debug!("Client {} sent close frame", self.handle.id());
                    break;
                }
                Ok(_) => {
                    // Binary, ping and pong frames carry nothing for us
                }
                Err(e) => {
                    debug!("WebSocket error for {}: {}", self.handle.id(), e);
                    break;
                }
            }
        }
    }

    /// Decode one text frame and dispatch it by action
    ///
    /// Malformed frames are logged and skipped. The only error is a closed
    /// hub, which ends the connection.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), SendError> {
        let mut message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid message from {}: {}", self.handle.id(), e);
                return Ok(());
            }
        };

        message.stamp(self.handle.sender_info());

        match message.action {
            Action::SendMessage => self.handle_send_message(message).await,
            Action::JoinRoom => self.handle_join_room(&message).await,
            Action::LeaveRoom => self.handle_leave_room(&message).await,
        }
    }

    async fn handle_send_message(&mut self, message: Message) -> Result<(), SendError> {
        let Some(name) = message.target_room() else {
            debug!("send-message from {} without target, dropped", self.handle.id());
            return Ok(());
        };

        match self.hub.find_room(name.clone()).await? {
            Some(room) => {
                if room.broadcast(message).is_err() {
                    debug!("Room {} closed, message dropped", name);
                }
            }
            None => {
                debug!("Room {} not found, message from {} dropped", name, self.handle.id());
            }
        }
        Ok(())
    }

    async fn handle_join_room(&mut self, message: &Message) -> Result<(), SendError> {
        let Some(name) = message.room_argument() else {
            debug!("join-room from {} without room name", self.handle.id());
            return Ok(());
        };

        let room = self.hub.find_or_create_room(name.clone()).await?;
        if room.register(self.handle.clone()).is_err() {
            debug!("Room {} closed, join ignored", name);
            return Ok(());
        }

        info!("Client {} joined room {}", self.handle.id(), name);
        self.rooms.insert(name, room);
        Ok(())
    }

    async fn handle_leave_room(&mut self, message: &Message) -> Result<(), SendError> {
        let Some(name) = message.room_argument() else {
            return Ok(());
        };

        // Never address a room that does not exist.
        let Some(room) = self.hub.find_room(name.clone()).await? else {
            debug!("Client {} left unknown room {}", self.handle.id(), name);
            return Ok(());
        };

        self.rooms.remove(&name);
        let _ = room.unregister(self.handle.id());
        info!("Client {} left room {}", self.handle.id(), name);
        Ok(())
    }

    /// Remove this client from the hub and every joined room
    ///
    /// Consumes the client so its own queue handle is released. Safe even
    /// if a room already dropped the client.
    async fn disconnect(self) {
        let client_id = self.handle.id();

        if self.hub.unregister(client_id).await.is_err() {
            debug!("Hub already closed while disconnecting {}", client_id);
        }
        for room in self.rooms.values() {
            let _ = room.unregister(client_id);
        }

        info!(
            "Client {} ({}) disconnected from {} room(s)",
            client_id,
            self.handle.name(),
            self.rooms.len()
        );
    }
}

/// Outbound loop: runs until the queue is closed or a write fails
async fn write_loop<W>(client_id: ClientId, mut sink: W, mut outbound: mpsc::Receiver<Arc<str>>)
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = write_batch(&mut sink, &mut outbound, payload).await {
            debug!("WebSocket send failed for {}: {}", client_id, e);
            break;
        }
    }
    debug!("Write loop ended for {}", client_id);

    let _ = sink.close().await;
}

/// Write `first` plus whatever is already queued, then flush once
async fn write_batch<W>(
    sink: &mut W,
    outbound: &mut mpsc::Receiver<Arc<str>>,
    first: Arc<str>,
) -> Result<usize, WsError>
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
{
    sink.feed(WsMessage::Text(first.to_string())).await?;
    let mut written = 1;

    while written < MAX_BATCH {
        match outbound.try_recv() {
            Ok(next) => {
                sink.feed(WsMessage::Text(next.to_string())).await?;
                written += 1;
            }
            Err(_) => break,
        }
    }

    sink.flush().await?;
    Ok(written)
}
