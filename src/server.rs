//! Chat server accept loop
//!
//! Accepts connections, caps concurrent sessions with a semaphore, and
//! spawns one handler task per connection. Owns the shutdown sequence: stop
//! accepting, tell every session to say goodbye, drain within the grace
//! period, abort stragglers.

use std::future::Future;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// How many consecutive accept failures before giving up
///
/// A single failed accept is transient; a run of them means resource
/// exhaustion (e.g. file-descriptor limits) that threatens the whole server.
const ACCEPT_FAILURE_LIMIT: u32 = 5;

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// The chat server
///
/// Holds the shared registry and broadcaster; `run` drives the accept loop
/// until the provided shutdown future resolves.
pub struct ChatServer {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
}

impl ChatServer {
    /// Create a server with an empty registry
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Self {
            config: Arc::new(config),
            registry,
            broadcaster,
        }
    }

    /// Shared registry, mainly for inspection in tests
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` resolves, then drain
    ///
    /// Errors only on repeated accept failures; everything session-scoped is
    /// contained in the session's own task.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ChatError> {
        info!("chat server listening on {}", listener.local_addr()?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let limiter = Arc::new(Semaphore::new(self.config.max_sessions));
        let mut sessions = JoinSet::new();
        let mut accept_failures = 0u32;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                (accepted, permit) = accept_limited(&listener, &limiter) => match accepted {
                    Ok((stream, addr)) => {
                        accept_failures = 0;
                        debug!("accepted connection from {}", addr);

                        let registry = Arc::clone(&self.registry);
                        let broadcaster = self.broadcaster.clone();
                        let config = Arc::clone(&self.config);
                        let shutdown_rx = shutdown_rx.clone();
                        sessions.spawn(async move {
                            // Held until the session ends, releasing its slot.
                            let _permit = permit;
                            if let Err(err) =
                                handle_connection(stream, registry, broadcaster, config, shutdown_rx)
                                    .await
                            {
                                error!("session from {} ended with error: {}", addr, err);
                            }
                        });
                    }
                    Err(err) => {
                        accept_failures += 1;
                        error!(
                            "failed to accept connection ({} in a row): {}",
                            accept_failures, err
                        );
                        if accept_failures >= ACCEPT_FAILURE_LIMIT {
                            error!("accept failing persistently, stopping server");
                            return Err(ChatError::Io(err));
                        }
                        sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = finished {
                        error!("session task panicked: {}", err);
                    }
                }
            }
        }

        // Stop accepting, then let in-flight sessions drain.
        drop(listener);
        let _ = shutdown_tx.send(true);

        info!("draining {} active session(s)", sessions.len());
        let drained = timeout(self.config.shutdown_grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "grace period expired, aborting {} session(s)",
                sessions.len()
            );
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }

        info!("chat server stopped");
        Ok(())
    }
}

/// Wait for a session slot, then accept one connection
async fn accept_limited(
    listener: &TcpListener,
    limiter: &Arc<Semaphore>,
) -> (
    std::io::Result<(TcpStream, std::net::SocketAddr)>,
    OwnedSemaphorePermit,
) {
    let permit = Arc::clone(limiter)
        .acquire_owned()
        .await
        .expect("session limiter never closed");
    (listener.accept().await, permit)
}
