//! Parley client core
//!
//! Pure state machines for the real-time side of the chat client: connection
//! lifecycle, keep-alive, bounded reconnect, room subscription, inbound event
//! routing, and reconciliation of pushed messages against fetched history.
//!
//! # Architecture
//!
//! Nothing in this crate performs I/O or reads a clock. Methods take the
//! current time as a parameter and return actions for a driver to execute:
//!
//! ```text
//! driver ──now, transport events──> ConnectionManager ──ConnectionAction──> driver
//!                                         │
//!                                         └─ Deliver(event) ──> StateReconciler ──ViewUpdate──> UI
//! ```
//!
//! The same code runs against `std::time::Instant` in production and against
//! a virtual clock in tests.
//!
//! # Components
//!
//! - [`ConnectionManager`]: Composition root owning the pieces below
//! - [`KeepAlive`]: Periodic ping timer
//! - [`ReconnectPolicy`]: Fixed-interval retry with an attempt budget
//! - [`RoomMembership`]: The single active room subscription
//! - [`MessageRouter`]: Frame parsing and isolated handler fan-out
//! - [`StateReconciler`]: Duplicate-free merge of history and live messages
//! - [`PresenceBook`], [`Roster`]: Online users and per-room membership

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod error;
pub mod keepalive;
pub mod presence;
pub mod reconciler;
pub mod reconnect;
pub mod room;
pub mod roster;
pub mod router;
pub mod time;

pub use connection::{ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionNotice, ConnectionState};
pub use error::{ConnectionError, HandlerError};
pub use keepalive::{KeepAlive, KeepAliveConfig};
pub use presence::PresenceBook;
pub use reconciler::{HistoryRequest, HistoryToken, ReconcilerConfig, RoomPreview, StateReconciler, ViewUpdate};
pub use reconnect::{ReconnectConfig, ReconnectDecision, ReconnectPolicy};
pub use room::{RoomMembership, RoomSubscription};
pub use roster::Roster;
pub use router::{EventHandler, HandlerId, MessageRouter, RouterStats};
pub use time::Instant;
