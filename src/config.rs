//! Server configuration
//!
//! A plain value handed to the server at startup. The core never reads files
//! or environment variables itself; the binary (or a test) fills this in.

use std::net::SocketAddr;
use std::time::Duration;

use crate::framer::DEFAULT_MAX_FRAME_LEN;

/// Static server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: SocketAddr,
    /// Pending-connection backlog for the listening socket
    pub backlog: u32,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Maximum inbound frame length in bytes
    pub max_frame_len: usize,
    /// Per-session outbound queue depth; overflowing it gets a session
    /// force-disconnected
    pub outbound_queue: usize,
    /// How many failed name registrations before the client is dropped
    pub max_register_attempts: u8,
    /// How long shutdown waits for sessions to drain before aborting them
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".parse().expect("valid literal address"),
            backlog: 64,
            max_sessions: 50,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbound_queue: 32,
            max_register_attempts: 3,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
