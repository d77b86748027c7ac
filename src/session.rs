//! Session handle
//!
//! The shared view of one connected client: its identity, its bounded
//! outbound queue, and a force-disconnect signal. The connection itself stays
//! owned by the handler task; everyone else (registry, broadcaster) only ever
//! holds a `SessionHandle`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::error::DeliveryError;
use crate::message::Message;
use crate::types::ClientId;

/// Cloneable handle to a live session
///
/// Delivery is non-blocking: `deliver` uses `try_send` against the bounded
/// queue, so no sender ever waits on a slow recipient's socket.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Connection identifier, assigned at accept time
    pub id: ClientId,
    /// When the connection was accepted
    pub connected_at: Instant,
    outbound: mpsc::Sender<Message>,
    kick: Arc<Notify>,
}

impl SessionHandle {
    /// Create a handle around a session's outbound queue sender
    pub fn new(id: ClientId, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            outbound,
            kick: Arc::new(Notify::new()),
        }
    }

    /// Queue a message for this session without blocking
    pub fn deliver(&self, msg: Message) -> Result<(), DeliveryError> {
        self.outbound.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Tell the owning handler task to tear the connection down
    ///
    /// The notification is buffered, so it works even if the handler is not
    /// currently parked on the signal.
    pub fn force_disconnect(&self) {
        self.kick.notify_one();
    }

    /// The signal the handler task waits on for forced disconnects
    pub fn kick_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.kick)
    }
}
