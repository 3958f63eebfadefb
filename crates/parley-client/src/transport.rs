//! Transport seam.
//!
//! The runtime never touches a socket directly. It asks a [`Connector`] to
//! open one and gets back a [`TransportHandle`] for writing; everything the
//! socket observes comes back as [`TransportEvent`]s on a channel the runtime
//! owns. Each open is tagged with a generation number so events from a socket
//! that has since been replaced can be recognized and dropped.

use tokio::{sync::mpsc, task::AbortHandle};

use crate::error::TransportError;

/// Monotonic id of one transport open.
pub type Generation = u64;

/// Something the socket observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed.
    Opened,
    /// One text frame.
    Frame(String),
    /// Close handshake seen, or the stream ended.
    Closed {
        /// Close code, if the peer sent one
        code: Option<u16>,
        /// Close reason
        reason: String,
    },
    /// The socket failed.
    Error(TransportError),
}

/// A transport observation tagged with the open it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Which open produced this
    pub generation: Generation,
    /// What happened
    pub kind: TransportEventKind,
}

/// Instructions for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write one text frame.
    Send(String),
    /// Send a close frame and stop.
    Close {
        /// Close code
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Write side of an open transport.
///
/// Frames are queued in order; the queue is unbounded so writing never
/// blocks the runtime loop.
#[derive(Debug)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
    abort_handle: Option<AbortHandle>,
}

impl TransportHandle {
    /// Wrap the command queue of a socket task.
    pub fn new(
        commands: mpsc::UnboundedSender<TransportCommand>,
        abort_handle: Option<AbortHandle>,
    ) -> Self {
        Self { commands, abort_handle }
    }

    /// Queue one text frame.
    ///
    /// # Errors
    ///
    /// - `TransportError::Closed` if the socket task has exited
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.commands.send(TransportCommand::Send(text)).map_err(|_| TransportError::Closed)
    }

    /// Ask the socket task to close cleanly.
    pub fn close(&self, code: u16, reason: String) {
        let _ = self.commands.send(TransportCommand::Close { code, reason });
    }

    /// Stop the socket task immediately.
    pub fn stop(&self) {
        if let Some(handle) = &self.abort_handle {
            handle.abort();
        }
    }
}

/// Opens transports.
///
/// Implementations spawn whatever task drives the socket and report back
/// through `events`. `open` itself must not block; connection failures are
/// reported as [`TransportEventKind::Error`].
pub trait Connector: Send + 'static {
    /// Start opening a transport to `url`.
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::Sender<TransportEvent>,
    ) -> TransportHandle;
}
