//! Parley wire protocol
//!
//! JSON control frames exchanged over the persistent chat connection, and the
//! value types they carry.
//!
//! # Framing
//!
//! Every frame is one WebSocket text message holding a JSON object with a
//! top-level `type` discriminator. The client sends a small fixed set of
//! control frames ([`OutboundFrame`]); the server pushes events that decode
//! into [`InboundEvent`]. Event types this crate does not know are preserved as
//! [`InboundEvent::Unknown`] instead of being rejected, so newer servers do not
//! break older clients.
//!
//! # Components
//!
//! - [`OutboundFrame`]: Client-to-server control frames
//! - [`InboundEvent`]: Typed server push events
//! - [`Message`], [`Conversation`], [`Member`], [`UserRef`]: Payload values

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod event;
mod frame;
mod types;

pub use errors::{ProtocolError, Result};
pub use event::InboundEvent;
pub use frame::OutboundFrame;
pub use types::{Conversation, Member, Message, MessageId, RoomId, UserId, UserRef};
