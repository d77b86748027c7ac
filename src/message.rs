//! Message definitions and wire rendering
//!
//! A `Message` is built once by the router or broadcaster, then rendered to a
//! single text line for delivery. The line tags (`[SYSTEM]`, `[WHISPER from
//! X]`, `name: body`, `*** ... ***`) are the contract clients parse.

use std::time::SystemTime;

/// What kind of traffic a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Regular chat line, broadcast to the room
    Chat,
    /// Server-generated notice, usually unicast
    System,
    /// Private message for exactly one recipient
    Whisper,
    /// A user entered the room
    Join,
    /// A user left the room
    Leave,
}

/// One routed message
///
/// Immutable once constructed; cloned per recipient by the broadcaster.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message category, drives the wire tag
    pub kind: MessageKind,
    /// Originating user, None for server-generated traffic
    pub sender: Option<String>,
    /// Message text, never contains the frame delimiter
    pub body: String,
    /// When the message was constructed
    pub timestamp: SystemTime,
}

impl Message {
    fn new(kind: MessageKind, sender: Option<String>, body: String) -> Self {
        Self {
            kind,
            sender,
            body,
            timestamp: SystemTime::now(),
        }
    }

    /// Chat line from a registered user
    pub fn chat(sender: &str, body: &str) -> Self {
        Self::new(MessageKind::Chat, Some(sender.to_string()), body.to_string())
    }

    /// Server notice
    pub fn system(body: impl Into<String>) -> Self {
        Self::new(MessageKind::System, None, body.into())
    }

    /// Private message from `from`
    pub fn whisper(from: &str, body: &str) -> Self {
        Self::new(
            MessageKind::Whisper,
            Some(from.to_string()),
            body.to_string(),
        )
    }

    /// Join notice for `name`
    pub fn join(name: &str) -> Self {
        Self::new(MessageKind::Join, None, format!("{name} has joined"))
    }

    /// Leave notice for `name`
    pub fn leave(name: &str) -> Self {
        Self::new(MessageKind::Leave, None, format!("{name} has left"))
    }

    /// Render to the wire line (without the trailing delimiter)
    pub fn to_line(&self) -> String {
        match self.kind {
            MessageKind::Chat => {
                format!("{}: {}", self.sender.as_deref().unwrap_or("?"), self.body)
            }
            MessageKind::System => format!("[SYSTEM] {}", self.body),
            MessageKind::Whisper => format!(
                "[WHISPER from {}] {}",
                self.sender.as_deref().unwrap_or("?"),
                self.body
            ),
            MessageKind::Join | MessageKind::Leave => format!("*** {} ***", self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_line() {
        let msg = Message::chat("Alice", "hello there");
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.sender.as_deref(), Some("Alice"));
        assert_eq!(msg.to_line(), "Alice: hello there");
    }

    #[test]
    fn test_system_line() {
        let msg = Message::system("user not found: Bob");
        assert!(msg.sender.is_none());
        assert_eq!(msg.to_line(), "[SYSTEM] user not found: Bob");
    }

    #[test]
    fn test_whisper_line() {
        let msg = Message::whisper("Alice", "psst");
        assert_eq!(msg.to_line(), "[WHISPER from Alice] psst");
    }

    #[test]
    fn test_join_and_leave_lines() {
        assert_eq!(Message::join("Alice").to_line(), "*** Alice has joined ***");
        assert_eq!(Message::leave("Alice").to_line(), "*** Alice has left ***");
    }
}
