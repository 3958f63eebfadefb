//! WebSocket transport over `tokio-tungstenite`.
//!
//! One task per open: it connects, reports `Opened`, then bridges between the
//! command queue and the socket until either side closes.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, warn};

use crate::{
    error::TransportError,
    transport::{
        Connector, Generation, TransportCommand, TransportEvent, TransportEventKind,
        TransportHandle,
    },
};

/// Production [`Connector`] for `ws://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::Sender<TransportEvent>,
    ) -> TransportHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(url.to_string(), generation, commands_rx, events));
        TransportHandle::new(commands_tx, Some(task.abort_handle()))
    }
}

async fn run_socket(
    url: String,
    generation: Generation,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::Sender<TransportEvent>,
) {
    let emit = |kind| {
        let events = events.clone();
        async move {
            let _ = events.send(TransportEvent { generation, kind }).await;
        }
    };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            emit(TransportEventKind::Error(TransportError::Connect(e.to_string()))).await;
            return;
        },
    };
    emit(TransportEventKind::Opened).await;

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        emit(TransportEventKind::Error(TransportError::Socket(e.to_string()))).await;
                        return;
                    }
                },
                Some(TransportCommand::Close { code, reason }) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    return;
                },
                None => {
                    let _ = write.close().await;
                    return;
                },
            },

            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Frame(text.as_str().to_owned())).await;
                },
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => emit(TransportEventKind::Frame(text)).await,
                    Err(_) => warn!(len = data.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    emit(TransportEventKind::Closed { code, reason }).await;
                    return;
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    emit(TransportEventKind::Error(TransportError::Socket(e.to_string()))).await;
                    return;
                },
                None => {
                    emit(TransportEventKind::Closed { code: None, reason: "stream ended".to_string() }).await;
                    return;
                },
            },
        }
    }
}
