//! Multi-room WebSocket message router
//!
//! Clients connect on `/ws?name=<display name>`, join named rooms, and every
//! message sent to a room is fanned out to all of its current members.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` owns the room table and the set of connected clients
//! - each `Room` owns its membership set and does the fan-out
//! - each `Client` runs an inbound and an outbound loop for its socket
//! - No locks needed - every mutable collection has exactly one owning task
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use room_hub::{serve, Config, Hub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let (hub, _task) = Hub::spawn(config.hub_capacity);
//!     serve(listener, hub, config).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod room;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientHandle};
pub use config::Config;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve};
pub use hub::{Hub, HubCommand, HubHandle, HubStats};
pub use message::{Action, Message, SenderInfo, Target};
pub use room::{Room, RoomCommand, RoomHandle};
pub use types::{ClientId, RoomName};
