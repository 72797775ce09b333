//! Relink - resilient framed TCP client
//!
//! Maintains long-lived connections to backend servers, exchanging
//! length-prefixed binary frames and recovering from transient failures
//! without losing connection identity from the caller's perspective.
//!
//! The crate is organized around three pieces:
//! - [`protocol`]: the wire packet format and a streaming frame decoder
//! - [`network`]: the connection state machine and the channel registry
//! - [`bus`]: per-message-id fan-out of decoded frames to handlers
//!
//! A connection reports everything that happens to it through a single
//! event channel:
//!
//! ```no_run
//! use relink::network::{NetConnection, NetEvent, NetworkConfig};
//! use relink::protocol::Packet;
//!
//! # async fn run() {
//! let conn = NetConnection::new("game.example.com", 7001, NetworkConfig::default());
//! let mut events = conn.take_event_receiver().await.unwrap();
//!
//! conn.connect().await;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         NetEvent::Connected => conn.send(Packet::new(1, b"hello".as_ref())).await,
//!         NetEvent::Message { id, body } => println!("msg {}: {} bytes", id, body.len()),
//!         NetEvent::Error { .. } => conn.reconnect().await,
//!         _ => {}
//!     }
//! }
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod network;
pub mod protocol;

pub use bus::MessageBus;
pub use config::Config;
pub use network::{ConnectionRegistry, ConnectionStatus, NetConnection, NetEvent, NetworkConfig};
pub use protocol::{Frame, FrameDecoder, FrameError, Packet};
