//! Connection handler
//!
//! Owns one client's connection for its whole lifetime: greets it, frames the
//! inbound byte stream, routes each line, and runs a dedicated write task
//! that drains the session's outbound queue. Whatever ends the session
//! (peer close, `/quit`, protocol violation, forced disconnect, shutdown),
//! teardown goes through the router exactly once.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::framer::Framer;
use crate::message::Message;
use crate::registry::Registry;
use crate::router::{CommandRouter, Disposition};
use crate::session::SessionHandle;
use crate::types::ClientId;

/// Read buffer size for the inbound socket
const READ_BUF_SIZE: usize = 1024;

/// Handle one accepted connection until it ends
///
/// Returns `Err` only for faults worth logging (protocol violations, socket
/// errors); a clean `/quit` or peer close is `Ok`.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ChatError> {
    let peer_addr = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (mut read_half, mut write_half) = stream.into_split();

    let client_id = ClientId::new();
    info!("client {} connected from {}", client_id, peer_addr);

    // Bounded outbound queue; overflowing it is how a slow reader gets
    // detected (the broadcaster kicks it, see Broadcaster::deliver_or_kick).
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(config.outbound_queue);
    let handle = SessionHandle::new(client_id, msg_tx);
    let kicked = handle.kick_signal();
    let local = handle.clone();

    let _ = local.deliver(Message::system("welcome! enter a display name"));

    // Write task: outbound queue -> socket.
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if write_half
                .write_all(&Framer::encode(&msg.to_line()))
                .await
                .is_err()
            {
                debug!("client {}: socket write failed, ending write task", client_id);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut framer = Framer::new(config.max_frame_len);
    let mut router = CommandRouter::new(
        registry,
        broadcaster,
        handle,
        config.max_register_attempts,
    );
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut result = Ok(());

    'session: loop {
        tokio::select! {
            read = read_half.read(&mut buf) => match read {
                // Zero-length read: the peer half-closed the stream.
                Ok(0) => break 'session,
                Ok(n) => {
                    for frame in framer.decode(&buf[..n]) {
                        match frame {
                            Ok(line) => {
                                if router.dispatch(&line) == Disposition::Terminate {
                                    break 'session;
                                }
                            }
                            Err(err) => {
                                // The offending content is never routed.
                                warn!("client {}: {}", client_id, err);
                                result = Err(ChatError::Protocol(err));
                                break 'session;
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!("client {}: read failed: {}", client_id, err);
                    result = Err(ChatError::Io(err));
                    break 'session;
                }
            },
            _ = kicked.notified() => {
                warn!("client {} force-disconnected (outbound queue overflow)", client_id);
                break 'session;
            }
            _ = shutdown.changed() => {
                let _ = local.deliver(Message::system("server is shutting down, goodbye"));
                break 'session;
            }
        }
    }

    router.terminate();
    let session_length = local.connected_at.elapsed();

    // Close the outbound queue so the write task flushes what's left and
    // exits; the registry entry is already gone.
    drop(router);
    drop(local);
    let _ = write_task.await;

    info!(
        "client {} disconnected after {:.1?}",
        client_id, session_length
    );
    result
}
