//! Async runtime
//!
//! Event loop that owns the core state machines and executes their actions.
//! Uses `tokio::select!` over four sources:
//!
//! - Commands from [`ClientHandle`](crate::ClientHandle)s
//! - Transport events, tagged with the generation of the open that produced
//!   them
//! - Results of HTTP calls, which run on their own tasks
//! - A periodic tick that drives keep-alive and reconnect timers
//!
//! All state is touched from this one task, so handlers and state machines
//! need no locking.

use std::{future::Future, sync::Arc, time::Duration};

use parley_core::{
    ConnectionAction, ConnectionManager, ConnectionNotice, ConnectionState, HistoryRequest,
    HistoryToken, Roster, StateReconciler, ViewUpdate,
};
use parley_proto::{Conversation, Member, Message, RoomId};
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    api::ChatApi,
    config::ClientConfig,
    error::{ApiError, ClientError},
    handle::{ClientStatus, ClientUpdate, Command},
    transport::{Connector, Generation, TransportEvent, TransportEventKind, TransportHandle},
};

/// Completed HTTP call.
enum FetchResult {
    History { token: HistoryToken, result: Result<Vec<Message>, ApiError> },
    Rooms(Result<Vec<Conversation>, ApiError>),
    Members { room_id: RoomId, result: Result<Vec<Member>, ApiError> },
    Sent { result: Result<Message, ApiError>, reply: oneshot::Sender<Result<Message, ClientError>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Runtime<C, A> {
    config: ClientConfig,
    manager: ConnectionManager<Instant>,
    reconciler: StateReconciler,
    roster: Roster,
    connector: C,
    api: Arc<A>,
    transport: Option<TransportHandle>,
    generation: Generation,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    fetch_tx: mpsc::UnboundedSender<FetchResult>,
    fetch_rx: mpsc::UnboundedReceiver<FetchResult>,
    updates: mpsc::UnboundedSender<ClientUpdate>,
}

impl<C: Connector, A: ChatApi> Runtime<C, A> {
    pub(crate) fn new(
        config: ClientConfig,
        connector: C,
        api: A,
        commands: mpsc::Receiver<Command>,
        updates: mpsc::UnboundedSender<ClientUpdate>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.runtime.command_buffer);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        Self {
            manager: ConnectionManager::new(config.connection.clone()),
            reconciler: StateReconciler::new(config.reconciler),
            roster: Roster::new(),
            connector,
            api: Arc::new(api),
            transport: None,
            generation: 0,
            commands,
            events_tx,
            events_rx,
            fetch_tx,
            fetch_rx,
            updates,
            config,
        }
    }

    /// Run until shut down or every handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.runtime.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => Flow::Stop,
                },

                Some(event) = self.events_rx.recv() => {
                    self.handle_transport_event(event);
                    Flow::Continue
                }

                Some(result) = self.fetch_rx.recv() => {
                    self.handle_fetch(result);
                    Flow::Continue
                }

                _ = ticker.tick() => {
                    let actions = self.manager.tick(Instant::now());
                    self.execute(actions);
                    Flow::Continue
                }
            };

            if flow == Flow::Stop {
                break;
            }
        }

        self.stop();
        info!("client runtime stopped");
    }

    fn stop(&mut self) {
        if self.manager.state() != ConnectionState::Disconnected {
            if let Ok(actions) = self.manager.disconnect() {
                self.execute(actions);
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.stop();
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        debug!(?command, "command");
        match command {
            Command::Connect { credential, reply } => {
                let result = self.manager.connect(credential).map(|actions| self.execute(actions));
                let _ = reply.send(result.map_err(Into::into));
            },
            Command::Disconnect { reply } => {
                let result = self.manager.disconnect().map(|actions| self.execute(actions));
                if result.is_ok() {
                    self.reconciler.clear_room();
                }
                let _ = reply.send(result.map_err(Into::into));
            },
            Command::JoinRoom { room_id, reply } => {
                let request = self.reconciler.select_room(room_id);
                self.fetch_history(request);
                self.fetch_members(room_id);
                let result =
                    self.manager.join_room(room_id, Instant::now()).map(|actions| self.execute(actions));
                let _ = reply.send(result.map_err(Into::into));
            },
            Command::LeaveRoom { reply } => {
                let result = self.manager.leave_room();
                self.reconciler.clear_room();
                let result = result.map(|actions| self.execute(actions));
                let _ = reply.send(result.map_err(Into::into));
            },
            Command::Send { frame, reply } => {
                let result = self.manager.send(frame).map(|actions| self.execute(actions));
                let _ = reply.send(result.map_err(Into::into));
            },
            Command::SendMessage { content, reply } => match self.reconciler.active_room() {
                Some(room_id) => self.post_message(room_id, content, reply),
                None => {
                    let _ = reply.send(Err(ClientError::NoActiveRoom));
                },
            },
            Command::LoadOlder { reply } => {
                let request = self.reconciler.load_older();
                let started = request.is_some();
                if let Some(request) = request {
                    self.fetch_history(request);
                }
                let _ = reply.send(started);
            },
            Command::RefreshRooms => self.fetch_rooms(),
            Command::Subscribe { handler, reply } => {
                let _ = reply.send(self.manager.subscribe_boxed(handler));
            },
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.manager.unsubscribe(id));
            },
            Command::Status { reply } => {
                let _ = reply.send(ClientStatus {
                    state: self.manager.state(),
                    attempts: self.manager.attempts(),
                    active_room: self.manager.active_room(),
                    router: self.manager.router_stats(),
                });
            },
            Command::IsOnline { user_id, reply } => {
                let _ = reply.send(self.manager.is_online(user_id));
            },
            Command::IsAdmin { room_id, user_id, reply } => {
                let _ = reply.send(self.roster.is_admin(room_id, user_id));
            },
            Command::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation {
            debug!(
                generation = event.generation,
                current = self.generation,
                "ignoring event from replaced transport"
            );
            return;
        }

        let now = Instant::now();
        let actions = match event.kind {
            TransportEventKind::Opened => self.manager.transport_opened(now),
            TransportEventKind::Frame(text) => self.manager.handle_frame(&text),
            TransportEventKind::Closed { code, reason } => {
                self.transport = None;
                self.manager.transport_closed(code, &reason, now)
            },
            TransportEventKind::Error(error) => {
                self.transport = None;
                self.manager.transport_error(&error.to_string(), now)
            },
        };
        self.execute(actions);
    }

    fn handle_fetch(&mut self, result: FetchResult) {
        match result {
            FetchResult::History { token, result } => {
                let updates = match result {
                    Ok(messages) => self.reconciler.apply_history(token, messages),
                    Err(error) => {
                        warn!(%error, "history fetch failed");
                        self.reconciler.history_failed(token)
                    },
                };
                self.publish_view(updates);
            },
            FetchResult::Rooms(Ok(conversations)) => {
                let updates = self.reconciler.seed_rooms(conversations);
                self.publish_view(updates);
            },
            FetchResult::Rooms(Err(error)) => warn!(%error, "room list fetch failed"),
            FetchResult::Members { room_id, result: Ok(members) } => {
                self.roster.set_members(room_id, members);
            },
            FetchResult::Members { room_id, result: Err(error) } => {
                warn!(room_id, %error, "member list fetch failed");
            },
            FetchResult::Sent { result, reply } => {
                if let Ok(message) = &result {
                    let updates = self.reconciler.confirm_sent(message);
                    self.publish_view(updates);
                }
                let _ = reply.send(result.map_err(Into::into));
            },
        }
    }

    fn execute(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::OpenTransport { url } => {
                    if let Some(old) = self.transport.take() {
                        old.stop();
                    }
                    self.generation += 1;
                    debug!(generation = self.generation, "opening transport");
                    self.transport =
                        Some(self.connector.open(&url, self.generation, self.events_tx.clone()));
                },
                ConnectionAction::SendFrame(frame) => {
                    let Some(transport) = &self.transport else {
                        warn!(frame_type = frame.type_tag(), "no transport for outbound frame");
                        continue;
                    };
                    match frame.encode() {
                        Ok(text) => {
                            if let Err(error) = transport.send(text) {
                                warn!(%error, frame_type = frame.type_tag(), "frame not sent");
                            }
                        },
                        Err(error) => warn!(%error, "frame did not encode"),
                    }
                },
                ConnectionAction::CloseTransport { code, reason } => {
                    if let Some(transport) = self.transport.take() {
                        transport.close(code, reason);
                    }
                    self.generation += 1;
                },
                ConnectionAction::Deliver(event) => {
                    let updates = self.reconciler.apply(&event);
                    self.publish_view(updates);
                    self.roster.apply(&event);
                },
                ConnectionAction::Notify(notice) => {
                    if notice == ConnectionNotice::StateChanged(ConnectionState::Connected) {
                        self.fetch_rooms();
                    }
                    let _ = self.updates.send(ClientUpdate::Status(notice));
                },
            }
        }
    }

    fn publish_view(&self, updates: Vec<ViewUpdate>) {
        for update in updates {
            let _ = self.updates.send(ClientUpdate::View(update));
        }
    }

    fn fetch_history(&self, request: HistoryRequest) {
        let api = Arc::clone(&self.api);
        let results = self.fetch_tx.clone();
        let limit = self.config.runtime.request_timeout;
        tokio::spawn(async move {
            let call = api.fetch_messages(request.room_id, request.skip, request.limit);
            let result = bounded(limit, call).await;
            let _ = results.send(FetchResult::History { token: request.token, result });
        });
    }

    fn fetch_members(&self, room_id: RoomId) {
        let api = Arc::clone(&self.api);
        let results = self.fetch_tx.clone();
        let limit = self.config.runtime.request_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, api.fetch_members(room_id)).await;
            let _ = results.send(FetchResult::Members { room_id, result });
        });
    }

    fn fetch_rooms(&self) {
        let api = Arc::clone(&self.api);
        let results = self.fetch_tx.clone();
        let limit = self.config.runtime.request_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, api.fetch_conversations()).await;
            let _ = results.send(FetchResult::Rooms(result));
        });
    }

    fn post_message(
        &self,
        room_id: RoomId,
        content: String,
        reply: oneshot::Sender<Result<Message, ClientError>>,
    ) {
        let api = Arc::clone(&self.api);
        let results = self.fetch_tx.clone();
        let limit = self.config.runtime.request_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, api.send_message(room_id, content)).await;
            let _ = results.send(FetchResult::Sent { result, reply });
        });
    }
}

/// Await an API call, failing it with [`ApiError::Timeout`] after `limit`.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(limit, call).await.unwrap_or(Err(ApiError::Timeout))
}
