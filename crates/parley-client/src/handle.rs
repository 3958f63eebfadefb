//! Cloneable front door to a running client.
//!
//! Every method sends one command to the runtime task and awaits its reply,
//! so calls from one handle are applied in the order they were made.

use parley_core::{ConnectionNotice, ConnectionState, EventHandler, HandlerId, RouterStats, ViewUpdate};
use parley_proto::{Message, OutboundFrame, RoomId, UserId};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::ClientError;

type Reply<T> = oneshot::Sender<T>;

/// Runtime commands.
pub(crate) enum Command {
    Connect { credential: String, reply: Reply<Result<(), ClientError>> },
    Disconnect { reply: Reply<Result<(), ClientError>> },
    JoinRoom { room_id: RoomId, reply: Reply<Result<(), ClientError>> },
    LeaveRoom { reply: Reply<Result<(), ClientError>> },
    Send { frame: OutboundFrame, reply: Reply<Result<(), ClientError>> },
    SendMessage { content: String, reply: Reply<Result<Message, ClientError>> },
    LoadOlder { reply: Reply<bool> },
    RefreshRooms,
    Subscribe { handler: Box<dyn EventHandler + Send>, reply: Reply<HandlerId> },
    Unsubscribe { id: HandlerId, reply: Reply<bool> },
    Status { reply: Reply<ClientStatus> },
    IsOnline { user_id: UserId, reply: Reply<bool> },
    IsAdmin { room_id: RoomId, user_id: UserId, reply: Reply<bool> },
    Shutdown,
}

/// Pushed from the runtime to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    /// Visible state changed
    View(ViewUpdate),
    /// Connection lifecycle changed
    Status(ConnectionNotice),
}

/// Point-in-time view of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    /// Connection state
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    /// Remembered active room
    pub active_room: Option<RoomId>,
    /// Router counters
    pub router: RouterStats,
}

/// Handle for driving a client runtime.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect { .. } => "Connect",
            Self::Disconnect { .. } => "Disconnect",
            Self::JoinRoom { .. } => "JoinRoom",
            Self::LeaveRoom { .. } => "LeaveRoom",
            Self::Send { .. } => "Send",
            Self::SendMessage { .. } => "SendMessage",
            Self::LoadOlder { .. } => "LoadOlder",
            Self::RefreshRooms => "RefreshRooms",
            Self::Subscribe { .. } => "Subscribe",
            Self::Unsubscribe { .. } => "Unsubscribe",
            Self::Status { .. } => "Status",
            Self::IsOnline { .. } => "IsOnline",
            Self::IsAdmin { .. } => "IsAdmin",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl ClientHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| ClientError::RuntimeClosed)?;
        response.await.map_err(|_| ClientError::RuntimeClosed)
    }

    /// Open the connection, authenticating with `credential`.
    pub async fn connect(&self, credential: impl Into<String>) -> Result<(), ClientError> {
        let credential = credential.into();
        self.request(|reply| Command::Connect { credential, reply }).await?
    }

    /// Close the connection. No reconnect follows.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::Disconnect { reply }).await?
    }

    /// Display and subscribe to `room_id`.
    ///
    /// History is fetched even when not connected; the subscription itself
    /// is remembered and sent on the next successful open, and the call
    /// reports `NotConnected`.
    pub async fn join_room(&self, room_id: RoomId) -> Result<(), ClientError> {
        self.request(|reply| Command::JoinRoom { room_id, reply }).await?
    }

    /// Leave the active room.
    pub async fn leave_room(&self) -> Result<(), ClientError> {
        self.request(|reply| Command::LeaveRoom { reply }).await?
    }

    /// Send a raw control frame. `payload` must be an object with a string
    /// `type`.
    pub async fn send(&self, payload: Value) -> Result<(), ClientError> {
        let frame = OutboundFrame::custom(payload)?;
        self.send_frame(frame).await
    }

    /// Send a control frame.
    pub async fn send_frame(&self, frame: OutboundFrame) -> Result<(), ClientError> {
        self.request(|reply| Command::Send { frame, reply }).await?
    }

    /// Post a message to the active room. The message shows up in the view
    /// when its push arrives, not when this returns.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<Message, ClientError> {
        let content = content.into();
        self.request(|reply| Command::SendMessage { content, reply }).await?
    }

    /// Fetch the page before everything visible. Returns false if there is
    /// nothing to fetch right now.
    pub async fn load_older(&self) -> Result<bool, ClientError> {
        self.request(|reply| Command::LoadOlder { reply }).await
    }

    /// Re-fetch the room list.
    pub async fn refresh_rooms(&self) -> Result<(), ClientError> {
        self.commands.send(Command::RefreshRooms).await.map_err(|_| ClientError::RuntimeClosed)
    }

    /// Register an event subscriber. It runs on the runtime task.
    pub async fn subscribe(
        &self,
        handler: impl EventHandler + Send + 'static,
    ) -> Result<HandlerId, ClientError> {
        let handler: Box<dyn EventHandler + Send> = Box::new(handler);
        self.request(|reply| Command::Subscribe { handler, reply }).await
    }

    /// Remove an event subscriber.
    pub async fn unsubscribe(&self, id: HandlerId) -> Result<bool, ClientError> {
        self.request(|reply| Command::Unsubscribe { id, reply }).await
    }

    /// Snapshot of the connection.
    pub async fn status(&self) -> Result<ClientStatus, ClientError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Whether frames can be sent right now.
    pub async fn is_connected(&self) -> bool {
        self.status().await.is_ok_and(|s| s.state == ConnectionState::Connected)
    }

    /// Whether `user_id` was last reported online.
    pub async fn is_online(&self, user_id: UserId) -> Result<bool, ClientError> {
        self.request(|reply| Command::IsOnline { user_id, reply }).await
    }

    /// Whether `user_id` may moderate `room_id`, from the fetched member list.
    pub async fn is_admin(&self, room_id: RoomId, user_id: UserId) -> Result<bool, ClientError> {
        self.request(|reply| Command::IsAdmin { room_id, user_id, reply }).await
    }

    /// Stop the runtime task. Closes the connection if open.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}
