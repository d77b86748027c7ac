//! Error types for the chat server
//!
//! Defines the error taxonomy: protocol violations and I/O faults terminate
//! a session, name and whisper errors are recoverable and reported back to
//! the client. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// `Io` and `Protocol` are fatal to the session that raised them.
/// `NameTaken`, `InvalidName`, and `UserNotFound` are business errors whose
/// Display text is sent back to the client as a `[SYSTEM]` line.
#[derive(Debug, Error)]
pub enum ChatError {
    /// IO error on the connection or listener (fatal to the session)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed inbound frame (fatal to the session)
    #[error("protocol violation: {0}")]
    Protocol(#[from] FrameError),

    /// Registration failed: another live session owns the name
    #[error("name '{0}' is already taken")]
    NameTaken(String),

    /// Registration failed: empty or whitespace-only name
    #[error("invalid name: '{0}'")]
    InvalidName(String),

    /// Whisper target is not registered
    #[error("user not found: {0}")]
    UserNotFound(String),
}

/// Framing errors
///
/// Any of these is a protocol violation: the offending session is
/// disconnected and the bad frame is never routed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Frame longer than the configured maximum
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    /// Frame is not valid UTF-8
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Message delivery errors
///
/// Raised by `SessionHandle::deliver` when a recipient's bounded outbound
/// queue cannot take the message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient's outbound queue is full (slow or stalled reader)
    #[error("outbound queue is full")]
    QueueFull,

    /// The recipient's session has already gone away
    #[error("outbound channel closed")]
    Closed,
}
