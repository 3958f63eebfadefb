//! Runtime tests against an in-memory transport and API.
//!
//! Time is paused, so reconnect delays and keep-alive intervals elapse as
//! soon as every task is idle.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use parley_client::{
    ApiError, ChatApi, ClientConfig, ClientError, ClientHandle, ClientUpdate, Connector,
    Generation, TransportCommand, TransportError, TransportEvent, TransportEventKind,
    TransportHandle,
};
use parley_core::{
    ConnectionError, ConnectionNotice, ConnectionState, HandlerError, ViewUpdate,
};
use parley_proto::{Conversation, InboundEvent, Member, Message, RoomId};
use serde_json::{Value, json};
use tokio::sync::mpsc;

const ROOM: RoomId = 7;

fn message(id: u64, room_id: RoomId) -> Message {
    Message {
        id,
        room_id,
        sender_id: 1,
        sender_display_name: Some("alice".to_string()),
        content: format!("message {id}"),
        created_at: format!("2024-01-01T00:00:{:02}", id % 60),
    }
}

fn new_message_frame(id: u64, room_id: RoomId) -> Value {
    json!({ "type": "new_message", "message": message(id, room_id) })
}

/// One socket opened by the runtime, as seen from the server side.
struct FakeSocket {
    url: String,
    generation: Generation,
    events: mpsc::Sender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
}

impl FakeSocket {
    async fn emit(&self, kind: TransportEventKind) {
        self.events.send(TransportEvent { generation: self.generation, kind }).await.unwrap();
    }

    async fn open(&self) {
        self.emit(TransportEventKind::Opened).await;
    }

    async fn push(&self, frame: Value) {
        self.emit(TransportEventKind::Frame(frame.to_string())).await;
    }

    async fn drop_abnormally(&self) {
        self.emit(TransportEventKind::Closed { code: Some(1006), reason: "gone".to_string() }).await;
    }

    async fn refuse(&self) {
        self.emit(TransportEventKind::Error(TransportError::Connect("refused".to_string()))).await;
    }

    /// Next frame the client wrote, skipping keep-alive probes.
    async fn next_frame(&mut self) -> Value {
        loop {
            match self.commands.recv().await.expect("socket command queue closed") {
                TransportCommand::Send(text) => {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame["type"] != "ping" {
                        return frame;
                    }
                },
                TransportCommand::Close { code, reason } => {
                    panic!("unexpected close {code}: {reason}")
                },
            }
        }
    }
}

struct FakeConnector {
    sockets: mpsc::UnboundedSender<FakeSocket>,
}

impl Connector for FakeConnector {
    fn open(
        &mut self,
        url: &str,
        generation: Generation,
        events: mpsc::Sender<TransportEvent>,
    ) -> TransportHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let _ = self.sockets.send(FakeSocket {
            url: url.to_string(),
            generation,
            events,
            commands: commands_rx,
        });
        TransportHandle::new(commands_tx, None)
    }
}

/// Server-side history semantics: newest first, skip and limit, then
/// returned oldest first.
#[derive(Clone, Default)]
struct FakeApi {
    history: Arc<Mutex<HashMap<RoomId, Vec<Message>>>>,
    posted: Arc<Mutex<Vec<(RoomId, String)>>>,
    /// History requests never answer
    stall_history: bool,
}

impl FakeApi {
    fn with_history(room_id: RoomId, ids: impl IntoIterator<Item = u64>) -> Self {
        let api = Self::default();
        api.history
            .lock()
            .unwrap()
            .insert(room_id, ids.into_iter().map(|id| message(id, room_id)).collect());
        api
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn fetch_messages(
        &self,
        room_id: RoomId,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        if self.stall_history {
            return std::future::pending().await;
        }
        let history = self.history.lock().unwrap();
        let all = history.get(&room_id).cloned().unwrap_or_default();
        let mut page: Vec<Message> = all.into_iter().rev().skip(skip).take(limit).collect();
        page.reverse();
        Ok(page)
    }

    async fn send_message(&self, room_id: RoomId, content: String) -> Result<Message, ApiError> {
        self.posted.lock().unwrap().push((room_id, content.clone()));
        Ok(Message { content, ..message(1000, room_id) })
    }

    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        Ok(vec![Conversation {
            id: ROOM,
            name: Some("general".to_string()),
            kind: "group".to_string(),
            member_ids: vec![1, 2],
        }])
    }

    async fn fetch_members(&self, room_id: RoomId) -> Result<Vec<Member>, ApiError> {
        if room_id != ROOM {
            return Err(ApiError::Status { status: 403, body: "not a member".to_string() });
        }
        Ok(vec![
            Member { id: 1, username: Some("alice".to_string()), role: None, is_owner: true },
            Member {
                id: 2,
                username: Some("bob".to_string()),
                role: Some("member".to_string()),
                is_owner: false,
            },
        ])
    }
}

struct Harness {
    client: ClientHandle,
    updates: mpsc::UnboundedReceiver<ClientUpdate>,
    sockets: mpsc::UnboundedReceiver<FakeSocket>,
}

impl Harness {
    fn start(api: FakeApi) -> Self {
        let (sockets_tx, sockets) = mpsc::unbounded_channel();
        let (client, updates, _task) =
            parley_client::spawn(ClientConfig::default(), FakeConnector { sockets: sockets_tx }, api);
        Self { client, updates, sockets }
    }

    async fn next_socket(&mut self) -> FakeSocket {
        tokio::time::timeout(Duration::from_secs(60), self.sockets.recv())
            .await
            .expect("no socket opened")
            .expect("connector dropped")
    }

    /// Skip updates until one matches.
    async fn wait_for(&mut self, matches: impl Fn(&ClientUpdate) -> bool) -> ClientUpdate {
        let wait = async {
            loop {
                let update = self.updates.recv().await.expect("runtime stopped");
                if matches(&update) {
                    return update;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait).await.expect("update never arrived")
    }

    async fn wait_for_state(&mut self, state: ConnectionState) {
        self.wait_for(|u| *u == ClientUpdate::Status(ConnectionNotice::StateChanged(state))).await;
    }

    async fn connected(&mut self) -> FakeSocket {
        self.client.connect("secret token").await.unwrap();
        let socket = self.next_socket().await;
        socket.open().await;
        self.wait_for_state(ConnectionState::Connected).await;
        socket
    }

    async fn history_loaded(&mut self) -> Vec<u64> {
        match self.wait_for(|u| matches!(u, ClientUpdate::View(ViewUpdate::HistoryLoaded { .. }))).await
        {
            ClientUpdate::View(ViewUpdate::HistoryLoaded { messages, .. }) => {
                messages.iter().map(|m| m.id).collect()
            },
            _ => unreachable!(),
        }
    }

    async fn next_appended(&mut self) -> u64 {
        match self.wait_for(|u| matches!(u, ClientUpdate::View(ViewUpdate::MessageAppended(_)))).await
        {
            ClientUpdate::View(ViewUpdate::MessageAppended(message)) => message.id,
            _ => unreachable!(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn connect_join_and_deduplicate_pushes() {
    let mut h = Harness::start(FakeApi::with_history(ROOM, 1..=3));
    let mut socket = h.connected().await;
    assert_eq!(socket.url, "ws://127.0.0.1:8000/ws/secret%20token");

    h.client.join_room(ROOM).await.unwrap();
    assert_eq!(socket.next_frame().await, json!({ "type": "join_conversation", "conversation_id": 7 }));
    assert_eq!(h.history_loaded().await, vec![1, 2, 3]);

    // Already fetched, then new
    socket.push(new_message_frame(3, ROOM)).await;
    socket.push(new_message_frame(4, ROOM)).await;
    assert_eq!(h.next_appended().await, 4);

    socket.push(new_message_frame(4, ROOM)).await;
    socket.push(new_message_frame(5, ROOM)).await;
    assert_eq!(h.next_appended().await, 5);
}

#[tokio::test(start_paused = true)]
async fn switching_rooms_leaves_before_joining() {
    let mut h = Harness::start(FakeApi::default());
    let mut socket = h.connected().await;

    h.client.join_room(ROOM).await.unwrap();
    h.client.join_room(8).await.unwrap();

    assert_eq!(socket.next_frame().await["type"], "join_conversation");
    assert_eq!(socket.next_frame().await, json!({ "type": "leave_conversation", "conversation_id": 7 }));
    assert_eq!(socket.next_frame().await, json!({ "type": "join_conversation", "conversation_id": 8 }));
}

#[tokio::test(start_paused = true)]
async fn reconnect_rejoins_active_room_once() {
    let mut h = Harness::start(FakeApi::default());
    let mut first = h.connected().await;
    h.client.join_room(ROOM).await.unwrap();
    assert_eq!(first.next_frame().await["conversation_id"], 7);

    first.drop_abnormally().await;
    let update = h
        .wait_for(|u| matches!(u, ClientUpdate::Status(ConnectionNotice::Reconnecting { .. })))
        .await;
    assert_eq!(
        update,
        ClientUpdate::Status(ConnectionNotice::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(3000),
        })
    );

    let mut second = h.next_socket().await;
    assert!(second.generation > first.generation);
    second.open().await;
    h.wait_for_state(ConnectionState::Connected).await;

    assert_eq!(second.next_frame().await, json!({ "type": "join_conversation", "conversation_id": 7 }));
    let status = h.client.status().await.unwrap();
    assert_eq!(status.attempts, 0);
    assert_eq!(status.active_room, Some(ROOM));

    // Exactly one join per reconnect
    let extra = tokio::time::timeout(Duration::from_secs(29), second.next_frame()).await;
    assert!(extra.is_err(), "unexpected frame {extra:?}");
}

#[tokio::test(start_paused = true)]
async fn sending_requires_a_connection() {
    let h = Harness::start(FakeApi::default());

    let result = h.client.send(json!({ "type": "typing", "conversation_id": 7 })).await;
    assert!(matches!(
        result,
        Err(ClientError::Connection(ConnectionError::NotConnected {
            state: ConnectionState::Disconnected,
            ..
        }))
    ));

    let result = h.client.send(json!({ "no_type": true })).await;
    assert!(matches!(result, Err(ClientError::Protocol(_))));

    let result = h.client.send_message("hello").await;
    assert!(matches!(result, Err(ClientError::NoActiveRoom)));
}

#[tokio::test(start_paused = true)]
async fn join_while_disconnected_is_sent_on_connect() {
    let mut h = Harness::start(FakeApi::with_history(ROOM, [1]));

    let result = h.client.join_room(ROOM).await;
    assert!(matches!(result, Err(ClientError::Connection(ConnectionError::NotConnected { .. }))));
    assert_eq!(h.history_loaded().await, vec![1]);

    let mut socket = h.connected().await;
    assert_eq!(socket.next_frame().await, json!({ "type": "join_conversation", "conversation_id": 7 }));
}

#[tokio::test(start_paused = true)]
async fn connection_lost_after_retry_budget() {
    let mut h = Harness::start(FakeApi::default());
    h.client.connect("token").await.unwrap();

    let mut opened = 0;
    let attempts = loop {
        tokio::select! {
            Some(socket) = h.sockets.recv() => {
                opened += 1;
                socket.refuse().await;
            }
            Some(update) = h.updates.recv() => {
                if let ClientUpdate::Status(ConnectionNotice::ConnectionLost { attempts }) = update {
                    break attempts;
                }
            }
        }
    };

    assert_eq!(attempts, 5);
    assert_eq!(opened, 6);
    assert_eq!(h.client.status().await.unwrap().state, ConnectionState::Failed);

    // Nothing else is scheduled
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.sockets.try_recv().is_err());

    // A fresh connect starts a new budget
    h.client.connect("token").await.unwrap();
    h.next_socket().await.open().await;
    h.wait_for_state(ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn events_from_replaced_socket_are_ignored() {
    let mut h = Harness::start(FakeApi::default());
    let first = h.connected().await;
    h.client.join_room(ROOM).await.unwrap();
    h.history_loaded().await;

    first.drop_abnormally().await;
    let second = h.next_socket().await;
    second.open().await;
    h.wait_for_state(ConnectionState::Connected).await;

    first.push(new_message_frame(40, ROOM)).await;
    first.drop_abnormally().await;
    second.push(new_message_frame(41, ROOM)).await;

    assert_eq!(h.next_appended().await, 41);
    assert_eq!(h.client.status().await.unwrap().state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn normal_server_close_does_not_reconnect() {
    let mut h = Harness::start(FakeApi::default());
    let socket = h.connected().await;

    socket
        .emit(TransportEventKind::Closed { code: Some(1000), reason: "bye".to_string() })
        .await;
    h.wait_for_state(ConnectionState::Disconnected).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.sockets.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_with_normal_code() {
    let mut h = Harness::start(FakeApi::default());
    let mut socket = h.connected().await;

    h.client.disconnect().await.unwrap();
    let command = socket.commands.recv().await;
    assert_eq!(
        command,
        Some(TransportCommand::Close { code: 1000, reason: "User disconnected".to_string() })
    );
    assert!(!h.client.is_connected().await);

    let result = h.client.disconnect().await;
    assert!(matches!(result, Err(ClientError::Connection(ConnectionError::InvalidState { .. }))));
}

#[tokio::test(start_paused = true)]
async fn disconnect_forgets_displayed_room() {
    let api = FakeApi::with_history(ROOM, 1..=2);
    let posted = Arc::clone(&api.posted);
    let mut h = Harness::start(api);
    let mut socket = h.connected().await;

    h.client.join_room(ROOM).await.unwrap();
    assert_eq!(socket.next_frame().await["type"], "join_conversation");
    assert_eq!(h.history_loaded().await, vec![1, 2]);

    h.client.disconnect().await.unwrap();
    let mut socket = h.connected().await;

    let rejoin = tokio::time::timeout(Duration::from_secs(29), socket.next_frame()).await;
    assert!(rejoin.is_err(), "unexpected frame {rejoin:?}");
    assert_eq!(h.client.status().await.unwrap().active_room, None);

    let result = h.client.send_message("still here?").await;
    assert!(matches!(result, Err(ClientError::NoActiveRoom)));
    assert!(posted.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_history_releases_held_pushes() {
    let api = FakeApi { stall_history: true, ..FakeApi::default() };
    let mut h = Harness::start(api);
    let socket = h.connected().await;

    h.client.join_room(ROOM).await.unwrap();
    socket.push(new_message_frame(5, ROOM)).await;

    // Held until the history request times out
    assert_eq!(h.next_appended().await, 5);

    socket.push(new_message_frame(6, ROOM)).await;
    assert_eq!(h.next_appended().await, 6);
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_while_connected() {
    let mut h = Harness::start(FakeApi::default());
    let mut socket = h.connected().await;

    tokio::time::sleep(Duration::from_millis(30_100)).await;
    let command = socket.commands.recv().await;
    assert_eq!(command, Some(TransportCommand::Send(r#"{"type":"ping"}"#.to_string())));
}

#[tokio::test(start_paused = true)]
async fn send_message_posts_to_active_room() {
    let api = FakeApi::default();
    let posted = Arc::clone(&api.posted);
    let mut h = Harness::start(api);
    let _socket = h.connected().await;

    h.client.join_room(ROOM).await.unwrap();
    let sent = h.client.send_message("hi there").await.unwrap();
    assert_eq!(sent.room_id, ROOM);
    assert_eq!(*posted.lock().unwrap(), vec![(ROOM, "hi there".to_string())]);

    let update = h
        .wait_for(|u| {
            matches!(u, ClientUpdate::View(ViewUpdate::PreviewUpdated(p)) if p.last_message.as_deref() == Some("hi there"))
        })
        .await;
    assert!(matches!(update, ClientUpdate::View(ViewUpdate::PreviewUpdated(_))));
}

#[tokio::test(start_paused = true)]
async fn subscribers_presence_and_roles() {
    let mut h = Harness::start(FakeApi::default());
    let socket = h.connected().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    h.client
        .subscribe(move |event: &InboundEvent| -> Result<(), HandlerError> {
            log.lock().unwrap().push(event.type_tag().to_string());
            Ok(())
        })
        .await
        .unwrap();
    h.client
        .subscribe(|_: &InboundEvent| -> Result<(), HandlerError> { panic!("bad handler") })
        .await
        .unwrap();

    h.client.join_room(ROOM).await.unwrap();
    socket.push(json!({ "type": "user_online", "user_id": 2 })).await;
    socket.push(json!({ "type": "typing_started", "user_id": 2 })).await;
    socket.push(json!("not an object")).await;

    let mut online = false;
    let mut admin = false;
    for _ in 0..100 {
        online = h.client.is_online(2).await.unwrap();
        admin = h.client.is_admin(ROOM, 1).await.unwrap();
        let parsed = h.client.status().await.unwrap().router.parse_failures == 1;
        if online && admin && parsed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(online);
    assert!(admin);
    assert!(!h.client.is_admin(ROOM, 2).await.unwrap());
    assert_eq!(*seen.lock().unwrap(), vec!["user_online", "typing_started"]);

    let stats = h.client.status().await.unwrap().router;
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.parse_failures, 1);
    assert_eq!(stats.handler_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn kick_clears_active_room() {
    let mut h = Harness::start(FakeApi::with_history(ROOM, [1, 2]));
    let socket = h.connected().await;
    h.client.join_room(ROOM).await.unwrap();
    h.history_loaded().await;

    socket
        .push(json!({
            "type": "kicked_from_conversation",
            "conversation_id": 7,
            "message": "You were removed",
        }))
        .await;

    let update = h
        .wait_for(|u| matches!(u, ClientUpdate::View(ViewUpdate::RoomCleared { .. })))
        .await;
    assert_eq!(
        update,
        ClientUpdate::View(ViewUpdate::RoomCleared {
            room_id: ROOM,
            reason: "You were removed".to_string(),
        })
    );
    assert_eq!(h.client.status().await.unwrap().active_room, None);
}

#[tokio::test(start_paused = true)]
async fn room_list_is_fetched_on_connect() {
    let mut h = Harness::start(FakeApi::default());
    let _socket = h.connected().await;

    let update = h.wait_for(|u| matches!(u, ClientUpdate::View(ViewUpdate::RoomsReset(_)))).await;
    let ClientUpdate::View(ViewUpdate::RoomsReset(rooms)) = update else { unreachable!() };
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name.as_deref(), Some("general"));
}

#[tokio::test(start_paused = true)]
async fn handle_reports_closed_runtime() {
    let h = Harness::start(FakeApi::default());
    h.client.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let result = h.client.status().await;
    assert!(matches!(result, Err(ClientError::RuntimeClosed)));
}
