//! Multi-user TCP Chat Server Library
//!
//! A broadcast chat server over plain TCP with a newline-delimited UTF-8
//! text protocol.
//!
//! # Features
//! - Display-name registration with uniqueness enforcement
//! - Room-wide broadcast and private `/whisper` messages
//! - `/help`, `/users`, `/quit` commands
//! - Delimiter-aware stream framing with partial-frame carry-over
//! - Slow-reader detection via bounded outbound queues
//! - Graceful shutdown with a drain grace period
//!
//! # Architecture
//! One tokio task per connection plus a listener task. Sessions never talk
//! to each other directly: the shared [`Registry`] maps display names to
//! [`SessionHandle`]s, and the [`Broadcaster`] fans messages out over an
//! atomic registry snapshot using non-blocking bounded queues.
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::signal;
//! use tcp_chat_server::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.bind_addr).await.unwrap();
//!     let server = ChatServer::new(config);
//!     server
//!         .run(listener, async { let _ = signal::ctrl_c().await; })
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod framer;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::Broadcaster;
pub use config::ServerConfig;
pub use error::{ChatError, DeliveryError, FrameError};
pub use framer::Framer;
pub use handler::handle_connection;
pub use message::{Message, MessageKind};
pub use registry::Registry;
pub use router::{CommandRouter, Disposition, SessionState};
pub use server::ChatServer;
pub use session::SessionHandle;
pub use types::ClientId;
