//! Multi-user TCP Chat Server - Entry Point
//!
//! Builds the listening socket and runs the server until Ctrl+C.

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpSocket;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use tcp_chat_server::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tcp_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tcp_chat_server=info")),
        )
        .init();

    // Get bind address from command line or use the default
    let mut config = ServerConfig::default();
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr.parse()?;
    }

    // Build the listener by hand so the backlog and SO_REUSEADDR apply
    let socket = match config.bind_addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(config.bind_addr)?;
    let listener = socket.listen(config.backlog)?;

    let server = ChatServer::new(config);
    server
        .run(listener, async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
