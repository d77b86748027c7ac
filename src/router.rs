//! Command routing
//!
//! Interprets inbound lines for one session. A session starts unregistered:
//! its first line is a display-name candidate. Once registered it is active,
//! and each line is either a `/command` or a chat message for the room.
//! Termination (via `/quit`, end of stream, or a fault) unregisters the name
//! and announces the departure exactly once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::error::DeliveryError;
use crate::message::Message;
use crate::registry::Registry;
use crate::session::SessionHandle;

/// Help reply, sent as a single line
const HELP_TEXT: &str = "commands: /help, /users, /whisper <name> <text>, /quit";

/// Where a session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No display name yet; inbound lines are name candidates
    Unregistered {
        /// Failed registration attempts so far
        attempts: u8,
    },
    /// Registered and chatting
    Active {
        /// The session's display name, immutable once set
        name: String,
    },
    /// Torn down; terminal
    Terminating,
}

/// What the handler should do after dispatching a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading
    Continue,
    /// Tear the session down
    Terminate,
}

/// Per-session command router
///
/// Owns the session's state machine. All dispatching is synchronous: registry
/// calls are short lock-held sections and delivery is non-blocking, so no
/// lock is ever held across I/O.
#[derive(Debug)]
pub struct CommandRouter {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
    handle: SessionHandle,
    state: SessionState,
    max_register_attempts: u8,
}

impl CommandRouter {
    /// Create a router for a fresh, unregistered session
    pub fn new(
        registry: Arc<Registry>,
        broadcaster: Broadcaster,
        handle: SessionHandle,
        max_register_attempts: u8,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            handle,
            state: SessionState::Unregistered { attempts: 0 },
            max_register_attempts,
        }
    }

    /// The session's display name, if registered
    pub fn display_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Active { name } => Some(name),
            _ => None,
        }
    }

    /// Route one inbound line
    pub fn dispatch(&mut self, line: &str) -> Disposition {
        let line = line.trim();
        match &self.state {
            SessionState::Unregistered { attempts } => {
                let attempts = *attempts;
                self.handle_registration(line, attempts)
            }
            SessionState::Active { name } => {
                let name = name.clone();
                self.handle_active(&name, line)
            }
            SessionState::Terminating => Disposition::Terminate,
        }
    }

    /// Tear the session down; idempotent
    ///
    /// A registered session is removed from the registry first, then the
    /// leave notice goes out to everyone still present. A session that never
    /// registered just goes quiet.
    pub fn terminate(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Terminating);
        if let SessionState::Active { name } = previous {
            self.registry.unregister(&name);
            self.broadcaster.broadcast(Message::leave(&name), None);
            info!("'{}' left the chat", name);
        }
    }

    /// First-line handshake: try to claim the candidate name
    fn handle_registration(&mut self, candidate: &str, attempts: u8) -> Disposition {
        match self.registry.register(candidate, self.handle.clone()) {
            Ok(()) => {
                self.state = SessionState::Active {
                    name: candidate.to_string(),
                };
                info!("client {} registered as '{}'", self.handle.id, candidate);

                self.unicast(Message::system(format!(
                    "welcome, {candidate}! type /help for commands"
                )));
                self.broadcaster
                    .broadcast(Message::join(candidate), Some(candidate));
                Disposition::Continue
            }
            Err(err) => {
                let attempts = attempts + 1;
                debug!(
                    "client {} registration attempt {} failed: {}",
                    self.handle.id, attempts, err
                );
                self.unicast(Message::system(err.to_string()));

                if attempts >= self.max_register_attempts {
                    self.unicast(Message::system("too many failed attempts, goodbye"));
                    self.state = SessionState::Terminating;
                    Disposition::Terminate
                } else {
                    self.state = SessionState::Unregistered { attempts };
                    Disposition::Continue
                }
            }
        }
    }

    /// Classify a line from a registered session
    fn handle_active(&mut self, name: &str, line: &str) -> Disposition {
        if line.is_empty() {
            return Disposition::Continue;
        }
        if line.starts_with('/') {
            return self.handle_command(name, line);
        }

        self.broadcaster
            .broadcast(Message::chat(name, line), Some(name));
        Disposition::Continue
    }

    /// Execute a `/command` line
    fn handle_command(&mut self, name: &str, line: &str) -> Disposition {
        let mut parts = line.splitn(3, ' ');
        let command = parts.next().unwrap_or_default().to_ascii_lowercase();

        match command.as_str() {
            "/help" => {
                self.unicast(Message::system(HELP_TEXT));
                Disposition::Continue
            }
            "/users" => {
                let names = self.registry.list_names();
                self.unicast(Message::system(format!(
                    "online ({}): {}",
                    names.len(),
                    names.join(", ")
                )));
                Disposition::Continue
            }
            "/whisper" => {
                let target = parts.next();
                let body = parts.next().map(str::trim).filter(|body| !body.is_empty());
                match (target, body) {
                    (Some(target), Some(_)) if target == name => {
                        self.unicast(Message::system("you can't whisper to yourself"));
                    }
                    (Some(target), Some(body)) => match self.broadcaster.whisper(name, target, body)
                    {
                        Ok(()) => {
                            self.unicast(Message::system(format!("whisper to {target}: {body}")));
                        }
                        Err(err) => self.unicast(Message::system(err.to_string())),
                    },
                    _ => self.unicast(Message::system("usage: /whisper <name> <text>")),
                }
                Disposition::Continue
            }
            "/quit" => {
                self.unicast(Message::system("goodbye"));
                Disposition::Terminate
            }
            other => {
                self.unicast(Message::system(format!(
                    "unknown command: {other}, type /help"
                )));
                Disposition::Continue
            }
        }
    }

    /// Reply to this session only
    ///
    /// A full queue gets the same treatment here as in broadcast delivery:
    /// the session is unresponsive, so it is made undiscoverable and its
    /// handler told to tear down rather than losing replies silently.
    fn unicast(&mut self, message: Message) {
        match self.handle.deliver(message) {
            Ok(()) => {}
            Err(DeliveryError::QueueFull) => {
                warn!(
                    "client {} is not reading replies, force-disconnecting",
                    self.handle.id
                );
                if let SessionState::Active { name } = &self.state {
                    self.registry.unregister(name);
                }
                self.handle.force_disconnect();
            }
            Err(DeliveryError::Closed) => {
                debug!("client {}: dropping reply, session closing", self.handle.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::types::ClientId;

    struct Peer {
        router: CommandRouter,
        rx: mpsc::Receiver<Message>,
    }

    impl Peer {
        fn recv_line(&mut self) -> String {
            self.rx.try_recv().expect("expected a message").to_line()
        }

        fn assert_silent(&mut self) {
            assert!(self.rx.try_recv().is_err());
        }
    }

    fn fixture() -> (Arc<Registry>, Broadcaster) {
        let registry = Arc::new(Registry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        (registry, broadcaster)
    }

    fn peer(registry: &Arc<Registry>, broadcaster: &Broadcaster) -> Peer {
        let (tx, rx) = mpsc::channel(32);
        let handle = SessionHandle::new(ClientId::new(), tx);
        let router = CommandRouter::new(Arc::clone(registry), broadcaster.clone(), handle, 3);
        Peer { router, rx }
    }

    fn active_peer(registry: &Arc<Registry>, broadcaster: &Broadcaster, name: &str) -> Peer {
        let mut peer = peer(registry, broadcaster);
        assert_eq!(peer.router.dispatch(name), Disposition::Continue);
        // Drain the private welcome.
        peer.recv_line();
        peer
    }

    #[tokio::test]
    async fn test_first_line_registers_name() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");
        let mut bob = peer(&registry, &broadcaster);

        assert_eq!(bob.router.dispatch("Bob"), Disposition::Continue);

        assert_eq!(
            bob.recv_line(),
            "[SYSTEM] welcome, Bob! type /help for commands"
        );
        assert_eq!(alice.recv_line(), "*** Bob has joined ***");
        // The joiner never sees their own join notice.
        bob.assert_silent();
        assert_eq!(registry.list_names(), ["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_stays_unregistered() {
        let (registry, broadcaster) = fixture();
        let _alice = active_peer(&registry, &broadcaster, "Alice");
        let mut imposter = peer(&registry, &broadcaster);

        assert_eq!(imposter.router.dispatch("Alice"), Disposition::Continue);

        assert_eq!(imposter.recv_line(), "[SYSTEM] name 'Alice' is already taken");
        assert!(imposter.router.display_name().is_none());
        assert_eq!(registry.len(), 1);

        // A different name still works on retry.
        assert_eq!(imposter.router.dispatch("Bob"), Disposition::Continue);
        assert_eq!(imposter.router.display_name(), Some("Bob"));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (registry, broadcaster) = fixture();
        let mut nameless = peer(&registry, &broadcaster);

        assert_eq!(nameless.router.dispatch("   "), Disposition::Continue);

        assert_eq!(nameless.recv_line(), "[SYSTEM] invalid name: ''");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_registration_attempts_bounded() {
        let (registry, broadcaster) = fixture();
        let _alice = active_peer(&registry, &broadcaster, "Alice");
        let mut imposter = peer(&registry, &broadcaster);

        assert_eq!(imposter.router.dispatch("Alice"), Disposition::Continue);
        assert_eq!(imposter.router.dispatch("Alice"), Disposition::Continue);
        assert_eq!(imposter.router.dispatch("Alice"), Disposition::Terminate);

        imposter.recv_line();
        imposter.recv_line();
        imposter.recv_line();
        assert_eq!(
            imposter.recv_line(),
            "[SYSTEM] too many failed attempts, goodbye"
        );
    }

    #[tokio::test]
    async fn test_help_command() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/help");

        assert_eq!(
            alice.recv_line(),
            "[SYSTEM] commands: /help, /users, /whisper <name> <text>, /quit"
        );
    }

    #[tokio::test]
    async fn test_users_command_sorted() {
        let (registry, broadcaster) = fixture();
        let _carol = active_peer(&registry, &broadcaster, "carol");
        let _bob = active_peer(&registry, &broadcaster, "bob");
        let mut alice = active_peer(&registry, &broadcaster, "alice");

        // Drain the join notices alice saw.
        while alice.rx.try_recv().is_ok() {}
        alice.router.dispatch("/users");

        assert_eq!(alice.recv_line(), "[SYSTEM] online (3): alice, bob, carol");
    }

    #[tokio::test]
    async fn test_chat_broadcast_excludes_sender() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");
        let mut bob = active_peer(&registry, &broadcaster, "Bob");
        assert_eq!(alice.recv_line(), "*** Bob has joined ***");

        alice.router.dispatch("hello room");

        assert_eq!(bob.recv_line(), "Alice: hello room");
        alice.assert_silent();
    }

    #[tokio::test]
    async fn test_whisper_delivery_and_echo() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");
        let mut bob = active_peer(&registry, &broadcaster, "Bob");
        let mut carol = active_peer(&registry, &broadcaster, "Carol");
        while alice.rx.try_recv().is_ok() {}
        while bob.rx.try_recv().is_ok() {}

        alice.router.dispatch("/whisper Bob secret plans");

        assert_eq!(bob.recv_line(), "[WHISPER from Alice] secret plans");
        assert_eq!(alice.recv_line(), "[SYSTEM] whisper to Bob: secret plans");
        carol.assert_silent();
    }

    #[tokio::test]
    async fn test_whisper_unknown_target() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/whisper Bob hi");

        assert_eq!(alice.recv_line(), "[SYSTEM] user not found: Bob");
    }

    #[tokio::test]
    async fn test_whisper_usage_errors() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/whisper");
        assert_eq!(alice.recv_line(), "[SYSTEM] usage: /whisper <name> <text>");

        alice.router.dispatch("/whisper Bob");
        assert_eq!(alice.recv_line(), "[SYSTEM] usage: /whisper <name> <text>");

        alice.router.dispatch("/whisper Bob   ");
        assert_eq!(alice.recv_line(), "[SYSTEM] usage: /whisper <name> <text>");
    }

    #[tokio::test]
    async fn test_whisper_to_self_rejected() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/whisper Alice hi me");

        assert_eq!(alice.recv_line(), "[SYSTEM] you can't whisper to yourself");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/dance");

        assert_eq!(alice.recv_line(), "[SYSTEM] unknown command: /dance, type /help");
        assert_eq!(alice.router.display_name(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_command_token_case_insensitive() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        alice.router.dispatch("/HELP");

        assert_eq!(
            alice.recv_line(),
            "[SYSTEM] commands: /help, /users, /whisper <name> <text>, /quit"
        );
    }

    #[tokio::test]
    async fn test_quit_terminates() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");

        assert_eq!(alice.router.dispatch("/quit"), Disposition::Terminate);
        assert_eq!(alice.recv_line(), "[SYSTEM] goodbye");
    }

    #[tokio::test]
    async fn test_terminate_announces_leave_once() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");
        let mut bob = active_peer(&registry, &broadcaster, "Bob");
        assert_eq!(alice.recv_line(), "*** Bob has joined ***");

        bob.router.terminate();
        bob.router.terminate();

        assert!(registry.lookup("Bob").is_none());
        assert_eq!(alice.recv_line(), "*** Bob has left ***");
        alice.assert_silent();
    }

    #[tokio::test]
    async fn test_unresponsive_session_kicked_on_reply_overflow() {
        let (registry, broadcaster) = fixture();
        // Room for exactly one reply, and nothing draining it.
        let (tx, _rx) = mpsc::channel(1);
        let handle = SessionHandle::new(ClientId::new(), tx);
        let kick = handle.kick_signal();
        let mut router = CommandRouter::new(Arc::clone(&registry), broadcaster, handle, 3);

        // The welcome line takes the only slot.
        assert_eq!(router.dispatch("Alice"), Disposition::Continue);
        assert_eq!(registry.list_names(), ["Alice"]);

        // The next reply cannot be queued: same policy as broadcast
        // delivery, the session is evicted instead of losing the line.
        router.dispatch("/help");

        assert!(registry.lookup("Alice").is_none());
        timeout(Duration::from_secs(1), kick.notified())
            .await
            .expect("unresponsive session should be kicked");
    }

    #[tokio::test]
    async fn test_terminate_unregistered_is_silent() {
        let (registry, broadcaster) = fixture();
        let mut alice = active_peer(&registry, &broadcaster, "Alice");
        let mut nameless = peer(&registry, &broadcaster);

        nameless.router.terminate();

        alice.assert_silent();
        assert_eq!(registry.len(), 1);
    }
}
