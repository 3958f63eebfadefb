//! Parley client runtime
//!
//! Drives the `parley-core` state machines against real I/O. One tokio task
//! owns all client state; applications talk to it through a cloneable
//! [`ClientHandle`] and receive [`ClientUpdate`]s on a channel.
//!
//! # Seams
//!
//! - [`Connector`]: opens the push connection. [`WsConnector`] speaks
//!   WebSocket; tests plug in an in-memory connector.
//! - [`ChatApi`]: history, sends, room and member lists. [`HttpChatApi`]
//!   calls the REST endpoints.
//!
//! The production implementations are behind the `transport` feature.
//!
//! # Example
//!
//! ```ignore
//! let api = HttpChatApi::new(DEFAULT_API_URL, &token);
//! let (client, mut updates, _task) = parley_client::spawn(ClientConfig::default(), WsConnector, api);
//!
//! client.connect(&token).await?;
//! client.join_room(7).await?;
//! while let Some(update) = updates.recv().await {
//!     // render
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
pub mod config;
pub mod error;
pub mod handle;
#[cfg(feature = "transport")]
pub mod http;
mod runtime;
pub mod transport;
#[cfg(feature = "transport")]
pub mod ws;

pub use api::ChatApi;
pub use config::{ClientConfig, RuntimeConfig};
pub use error::{ApiError, ClientError, TransportError};
pub use handle::{ClientHandle, ClientStatus, ClientUpdate};
#[cfg(feature = "transport")]
pub use http::{DEFAULT_API_URL, HttpChatApi};
pub use transport::{
    Connector, Generation, TransportCommand, TransportEvent, TransportEventKind, TransportHandle,
};
#[cfg(feature = "transport")]
pub use ws::WsConnector;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::runtime::Runtime;

/// Start a client runtime on the current tokio runtime.
///
/// Returns the command handle, the update stream and the task running the
/// loop. The loop stops on [`ClientHandle::shutdown`] or when every handle
/// has been dropped.
pub fn spawn<C, A>(
    config: ClientConfig,
    connector: C,
    api: A,
) -> (ClientHandle, mpsc::UnboundedReceiver<ClientUpdate>, JoinHandle<()>)
where
    C: Connector,
    A: ChatApi,
{
    let (commands_tx, commands_rx) = mpsc::channel(config.runtime.command_buffer);
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();

    let runtime = Runtime::new(config, connector, api, commands_rx, updates_tx);
    let task = tokio::spawn(runtime.run());

    (ClientHandle::new(commands_tx), updates_rx, task)
}
