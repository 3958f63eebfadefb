//! Connection lifecycle state machine.
//!
//! Owns keep-alive, reconnect policy, room membership and the event router,
//! and exposes the small API the rest of the client talks to. Uses the action
//! pattern: methods take time as input and return actions for the driver to
//! execute, so no I/O or clock access happens here.
//!
//! # State Machine
//!
//! ```text
//!                 connect()              transport open
//! ┌──────────────┐─────────>┌────────────┐───────────────>┌───────────┐
//! │ Disconnected │          │ Connecting │                │ Connected │
//! └──────────────┘<─────────└────────────┘<──────┐        └───────────┘
//!        ^        disconnect()   │   ^   retry due│              │
//!        │                       │   │            │              │ abnormal close
//!        │            abnormal   │   │    ┌──────────────┐       │
//!        │            close      └───┼───>│ Reconnecting │<──────┘
//!        │                           │    └──────────────┘
//!        │ disconnect()              │           │ budget spent
//!        │                  connect()│           ↓
//!        │                           │     ┌────────┐
//!        └───────────────────────────┴─────│ Failed │
//!                                          └────────┘
//! ```
//!
//! A normal closure (code 1000) initiated by the server lands in
//! `Disconnected` without scheduling a retry. `disconnect()` is accepted from
//! every state except `Disconnected`.

use std::time::Duration;

use parley_proto::{InboundEvent, OutboundFrame, RoomId, UserId};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, error, info, warn};

use crate::{
    error::ConnectionError,
    keepalive::{KeepAlive, KeepAliveConfig},
    presence::PresenceBook,
    reconnect::{ReconnectConfig, ReconnectDecision, ReconnectPolicy},
    room::RoomMembership,
    router::{EventHandler, HandlerId, MessageRouter, RouterStats},
    time::Instant,
};

/// Close code for an intentional, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Default streaming endpoint. The credential is appended as a path segment.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000/ws";

/// Characters left unescaped in the credential path segment.
const CREDENTIAL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Actions returned by the connection state machine.
///
/// The driver executes these in order:
/// - `OpenTransport`: Open a new socket to `url`, replacing any previous one
/// - `SendFrame`: Encode and write the frame to the open socket
/// - `CloseTransport`: Close the socket with the given code
/// - `Deliver`: Hand a decoded event to the application (reconciler, UI)
/// - `Notify`: Publish a lifecycle notice
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Open the transport
    OpenTransport {
        /// Endpoint with the credential segment appended
        url: String,
    },

    /// Write this frame to the transport
    SendFrame(OutboundFrame),

    /// Close the transport
    CloseTransport {
        /// WebSocket close code
        code: u16,
        /// Close reason
        reason: String,
    },

    /// An inbound event that passed through routing
    Deliver(InboundEvent),

    /// Lifecycle notice for the application
    Notify(ConnectionNotice),
}

/// Lifecycle notices surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionNotice {
    /// The state machine moved to a new state
    StateChanged(ConnectionState),

    /// A retry was scheduled
    Reconnecting {
        /// 1-based attempt number
        attempt: u32,
        /// Delay until the attempt
        delay: Duration,
    },

    /// Reconnect budget spent; the connection will not come back on its own
    ConnectionLost {
        /// Attempts that were made
        attempts: u32,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, nothing scheduled
    Disconnected,
    /// Transport open requested, waiting for it to complete
    Connecting,
    /// Transport open
    Connected,
    /// Abnormal close seen, retry pending
    Reconnecting,
    /// Reconnect budget spent
    Failed,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Streaming endpoint without the credential segment
    pub endpoint: String,
    /// Keep-alive settings
    pub keepalive: KeepAliveConfig,
    /// Reconnect settings
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            keepalive: KeepAliveConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Connection composition root.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
///
/// # Invariants
///
/// - KeepAlive runs only in `Connected`.
/// - A retry is pending only in `Reconnecting`.
/// - `attempts()` is zero after every successful open.
/// - No `SendFrame` is ever produced outside `Connected`.
#[derive(Debug)]
pub struct ConnectionManager<I> {
    state: ConnectionState,
    config: ConnectionConfig,
    credential: Option<String>,
    keepalive: KeepAlive<I>,
    reconnect: ReconnectPolicy<I>,
    rooms: RoomMembership<I>,
    router: MessageRouter,
    presence: PresenceBook,
}

impl<I: Instant> ConnectionManager<I> {
    /// Create a manager in [`ConnectionState::Disconnected`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            keepalive: KeepAlive::new(config.keepalive),
            reconnect: ReconnectPolicy::new(config.reconnect),
            rooms: RoomMembership::new(),
            router: MessageRouter::new(),
            presence: PresenceBook::new(),
            credential: None,
            config,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether frames can be sent right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reconnect attempts spent since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// Remembered active room.
    #[must_use]
    pub fn active_room(&self) -> Option<RoomId> {
        self.rooms.active_room()
    }

    /// Whether `user_id` was last reported online.
    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.presence.is_online(user_id)
    }

    /// Router diagnostic counters.
    #[must_use]
    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Earliest time [`tick`](Self::tick) has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        match self.state {
            ConnectionState::Connected => self.keepalive.next_deadline(),
            ConnectionState::Reconnecting => self.reconnect.next_deadline(),
            _ => None,
        }
    }

    /// Register an event subscriber.
    pub fn subscribe(&mut self, handler: impl EventHandler + Send + 'static) -> HandlerId {
        self.router.subscribe(handler)
    }

    /// Register an already boxed event subscriber.
    pub fn subscribe_boxed(&mut self, handler: Box<dyn EventHandler + Send>) -> HandlerId {
        self.router.subscribe_boxed(handler)
    }

    /// Remove an event subscriber.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.router.unsubscribe(id)
    }

    /// Start connecting with `credential`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` unless `Disconnected` or `Failed`
    /// - `ConnectionError::EmptyCredential` if `credential` is empty
    pub fn connect(
        &mut self,
        credential: impl Into<String>,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if !matches!(self.state, ConnectionState::Disconnected | ConnectionState::Failed) {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "connect" });
        }

        let credential = credential.into();
        if credential.is_empty() {
            return Err(ConnectionError::EmptyCredential);
        }

        self.credential = Some(credential);
        self.reconnect.reset();

        Ok(self.open_transport())
    }

    /// The transport reported that it is open.
    ///
    /// Resets the attempt counter, starts keep-alive and re-joins the
    /// remembered room. Ignored outside `Connecting`.
    pub fn transport_opened(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "ignoring transport open");
            return Vec::new();
        }

        self.reconnect.reset();
        self.keepalive.start(now);

        let mut actions = self.transition(ConnectionState::Connected);
        info!("connected");

        if let Some(frame) = self.rooms.rejoin() {
            debug!(room_id = ?frame.room_id(), "rejoining room");
            actions.push(ConnectionAction::SendFrame(frame));
        }

        actions
    }

    /// The transport closed.
    ///
    /// `code` is the WebSocket close code if one was received. Anything but
    /// a normal closure counts as abnormal and goes to the reconnect policy.
    /// Ignored in `Disconnected`, `Failed` and `Reconnecting`.
    pub fn transport_closed(
        &mut self,
        code: Option<u16>,
        reason: &str,
        now: I,
    ) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {},
            _ => {
                debug!(state = ?self.state, ?code, "ignoring transport close");
                return Vec::new();
            },
        }

        self.keepalive.stop();

        if code == Some(NORMAL_CLOSURE) {
            info!(reason, "server closed connection normally");
            self.presence.clear();
            return self.transition(ConnectionState::Disconnected);
        }

        warn!(?code, reason, "connection closed abnormally");
        self.schedule_reconnect(now)
    }

    /// The transport failed without a close handshake.
    pub fn transport_error(&mut self, reason: &str, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {},
            _ => {
                debug!(state = ?self.state, reason, "ignoring transport error");
                return Vec::new();
            },
        }

        warn!(reason, "transport error");
        self.keepalive.stop();
        self.schedule_reconnect(now)
    }

    /// User-initiated shutdown. Never triggers a reconnect.
    ///
    /// Cancels any pending retry, stops keep-alive, forgets the credential and
    /// the active room.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if already `Disconnected`
    pub fn disconnect(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "disconnect",
            });
        }

        let transport_open =
            matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected);

        self.keepalive.stop();
        self.reconnect.reset();
        self.credential = None;
        self.rooms.clear();
        self.presence.clear();

        let mut actions = Vec::new();
        if transport_open {
            actions.push(ConnectionAction::CloseTransport {
                code: NORMAL_CLOSURE,
                reason: "User disconnected".to_string(),
            });
        }
        actions.extend(self.transition(ConnectionState::Disconnected));
        info!("disconnected by user");

        Ok(actions)
    }

    /// Drive timers: keep-alive probes while connected, due retries while
    /// reconnecting.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connected if self.keepalive.poll(now) => {
                debug!("sending keep-alive");
                vec![ConnectionAction::SendFrame(OutboundFrame::Ping)]
            },
            ConnectionState::Reconnecting if self.reconnect.poll(now) => {
                info!(attempt = self.reconnect.attempts(), "reconnecting");
                self.open_transport()
            },
            _ => Vec::new(),
        }
    }

    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless `Connected`; nothing is sent
    pub fn send(&mut self, frame: OutboundFrame) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.require_connected("send")?;
        Ok(vec![ConnectionAction::SendFrame(frame)])
    }

    /// Make `room_id` the active room.
    ///
    /// The room is remembered even when not connected, so the next successful
    /// open joins it.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless `Connected`; no frame is sent
    pub fn join_room(
        &mut self,
        room_id: RoomId,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let frames = self.rooms.join(room_id, now);
        self.require_connected("join_room")?;
        Ok(frames.into_iter().map(ConnectionAction::SendFrame).collect())
    }

    /// Leave the active room.
    ///
    /// The room is forgotten even when not connected.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` unless `Connected`; no frame is sent
    pub fn leave_room(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let frame = self.rooms.leave();
        self.require_connected("leave_room")?;
        Ok(frame.into_iter().map(ConnectionAction::SendFrame).collect())
    }

    /// Process one raw inbound frame.
    ///
    /// Built-in routing runs first (presence, kicks, keep-alive replies), then
    /// every subscriber. The decoded event is returned as `Deliver`. Frames
    /// that do not decode produce no actions.
    pub fn handle_frame(&mut self, raw: &str) -> Vec<ConnectionAction> {
        let Some(event) = self.router.parse(raw) else {
            return Vec::new();
        };

        match &event {
            InboundEvent::UserPresenceChanged { user_id, online } => {
                self.presence.set(*user_id, *online);
            },
            InboundEvent::KickedFromRoom { room_id, reason } => {
                if self.rooms.forget(*room_id) {
                    info!(room_id, reason = reason.as_str(), "removed from active room");
                }
            },
            InboundEvent::KeepAliveAck => debug!("keep-alive acknowledged"),
            InboundEvent::Unknown { event_type, .. } => {
                debug!(event_type = event_type.as_str(), "unknown event type");
            },
            _ => {},
        }

        self.router.dispatch(&event);
        vec![ConnectionAction::Deliver(event)]
    }

    fn require_connected(&self, operation: &'static str) -> Result<(), ConnectionError> {
        if self.is_connected() {
            Ok(())
        } else {
            warn!(state = ?self.state, operation, "rejected while not connected");
            Err(ConnectionError::NotConnected { state: self.state, operation })
        }
    }

    fn open_transport(&mut self) -> Vec<ConnectionAction> {
        let Some(credential) = self.credential.as_deref() else {
            error!("no credential to connect with");
            return self.transition(ConnectionState::Failed);
        };

        let url = format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            utf8_percent_encode(credential, CREDENTIAL_SEGMENT)
        );

        let mut actions = self.transition(ConnectionState::Connecting);
        actions.push(ConnectionAction::OpenTransport { url });
        actions
    }

    fn schedule_reconnect(&mut self, now: I) -> Vec<ConnectionAction> {
        match self.reconnect.on_abnormal_close(now) {
            ReconnectDecision::Retry { attempt, .. } => {
                let delay = self.reconnect.interval();
                info!(attempt, ?delay, "scheduling reconnect");

                let mut actions = self.transition(ConnectionState::Reconnecting);
                actions.push(ConnectionAction::Notify(ConnectionNotice::Reconnecting {
                    attempt,
                    delay,
                }));
                actions
            },
            ReconnectDecision::Exhausted { attempts } => {
                error!(attempts, "reconnect attempts exhausted, giving up");
                self.presence.clear();

                let mut actions = self.transition(ConnectionState::Failed);
                actions.push(ConnectionAction::Notify(ConnectionNotice::ConnectionLost { attempts }));
                actions
            },
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Vec<ConnectionAction> {
        if self.state == next {
            return Vec::new();
        }
        debug!(from = ?self.state, to = ?next, "connection state change");
        self.state = next;
        vec![ConnectionAction::Notify(ConnectionNotice::StateChanged(next))]
    }
}
