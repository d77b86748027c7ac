//! Message fan-out
//!
//! Delivers a message to every registered session, or to exactly one, over a
//! registry snapshot taken atomically. Delivery never blocks: each recipient
//! has a bounded outbound queue, and a recipient whose queue is full is
//! force-disconnected rather than allowed to stall everyone else.
//!
//! Because delivery happens synchronously in the sender's task, two messages
//! sent by the same session land in every recipient's queue in that same
//! relative order.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ChatError, DeliveryError};
use crate::message::Message;
use crate::registry::Registry;
use crate::session::SessionHandle;

/// Fan-out delivery over the registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster over the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Deliver a message to every registered session except `exclude`
    ///
    /// Sessions joining or leaving mid-broadcast are simply absent from or
    /// present in the snapshot; nobody receives a duplicate.
    pub fn broadcast(&self, message: Message, exclude: Option<&str>) {
        for (name, handle) in self.registry.snapshot() {
            if Some(name.as_str()) == exclude {
                continue;
            }
            self.deliver_or_kick(&name, &handle, message.clone());
        }
    }

    /// Deliver a private message to the named session only
    ///
    /// Returns `UserNotFound` if `to` is not registered — including the case
    /// where the target had to be force-disconnected for a full queue.
    pub fn whisper(&self, from: &str, to: &str, body: &str) -> Result<(), ChatError> {
        let Some(handle) = self.registry.lookup(to) else {
            return Err(ChatError::UserNotFound(to.to_string()));
        };

        if self.deliver_or_kick(to, &handle, Message::whisper(from, body)) {
            Ok(())
        } else {
            Err(ChatError::UserNotFound(to.to_string()))
        }
    }

    /// Queue a message for one recipient, evicting it on overflow
    ///
    /// A full queue means the reader is too slow to keep: the session is
    /// unregistered and its handler told to tear down. A closed queue is a
    /// session already on its way out; the stale entry is pruned.
    fn deliver_or_kick(&self, name: &str, handle: &SessionHandle, message: Message) -> bool {
        match handle.deliver(message) {
            Ok(()) => true,
            Err(DeliveryError::QueueFull) => {
                warn!("'{}' is not keeping up, force-disconnecting", name);
                self.registry.unregister(name);
                handle.force_disconnect();
                false
            }
            Err(DeliveryError::Closed) => {
                debug!("'{}' already gone, pruning registry entry", name);
                self.registry.unregister(name);
                false
            }
        }
    }
}
