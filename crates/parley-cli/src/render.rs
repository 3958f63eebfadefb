//! Text rendering of client updates.

use parley_client::{ClientStatus, ClientUpdate};
use parley_core::{ConnectionNotice, ViewUpdate};
use parley_proto::Message;

/// One chat line.
pub fn message_line(message: &Message) -> String {
    let sender = message
        .sender_display_name
        .clone()
        .unwrap_or_else(|| format!("user {}", message.sender_id));
    format!("[{}] {sender}: {}", message.created_at, message.content)
}

/// Lines to print for one update. Empty when there is nothing to show.
pub fn update_lines(update: &ClientUpdate) -> Vec<String> {
    match update {
        ClientUpdate::View(view) => view_lines(view),
        ClientUpdate::Status(notice) => vec![notice_line(notice)],
    }
}

/// One-line summary of [`ClientStatus`].
pub fn status_line(status: &ClientStatus) -> String {
    let room = status.active_room.map_or_else(|| "none".to_string(), |id| id.to_string());
    format!(
        "* {:?}, room {room}, {} reconnect attempts, {} events, {} bad frames, {} handler failures",
        status.state,
        status.attempts,
        status.router.dispatched,
        status.router.parse_failures,
        status.router.handler_failures,
    )
}

fn view_lines(update: &ViewUpdate) -> Vec<String> {
    match update {
        ViewUpdate::HistoryLoaded { room_id, messages } => {
            let mut lines = vec![format!("-- room {room_id}: {} messages --", messages.len())];
            lines.extend(messages.iter().map(message_line));
            lines
        },
        ViewUpdate::OlderLoaded { messages, .. } => {
            let mut lines = vec![format!("-- {} older messages --", messages.len())];
            lines.extend(messages.iter().map(message_line));
            lines
        },
        ViewUpdate::MessageAppended(message) => vec![message_line(message)],
        ViewUpdate::RoomsReset(rooms) => rooms
            .iter()
            .map(|room| {
                let name = room.name.as_deref().unwrap_or("(direct)");
                match &room.last_message {
                    Some(last) => format!("#{} {name}: {last}", room.room_id),
                    None => format!("#{} {name}", room.room_id),
                }
            })
            .collect(),
        ViewUpdate::RoomRemoved { room_id } => vec![format!("* room {room_id} removed")],
        ViewUpdate::RoomCleared { reason, .. } => vec![format!("! {reason}")],
        ViewUpdate::PreviewUpdated(_) => Vec::new(),
    }
}

fn notice_line(notice: &ConnectionNotice) -> String {
    match notice {
        ConnectionNotice::StateChanged(state) => format!("* {state:?}"),
        ConnectionNotice::Reconnecting { attempt, delay } => {
            format!("* reconnecting in {}s (attempt {attempt})", delay.as_secs())
        },
        ConnectionNotice::ConnectionLost { attempts } => {
            format!("! connection lost after {attempts} attempts, use /quit and restart")
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::{ConnectionState, RoomPreview};

    use super::*;

    fn message(id: u64, name: Option<&str>) -> Message {
        Message {
            id,
            room_id: 7,
            sender_id: 3,
            sender_display_name: name.map(str::to_string),
            content: "hi".to_string(),
            created_at: "2024-05-01T10:00:00".to_string(),
        }
    }

    #[test]
    fn history_render() {
        let update = ClientUpdate::View(ViewUpdate::HistoryLoaded {
            room_id: 7,
            messages: vec![message(1, Some("alice")), message(2, None)],
        });
        insta::assert_snapshot!(update_lines(&update).join("\n"), @r"
        -- room 7: 2 messages --
        [2024-05-01T10:00:00] alice: hi
        [2024-05-01T10:00:00] user 3: hi
        ");
    }

    #[test]
    fn room_list_render() {
        let update = ClientUpdate::View(ViewUpdate::RoomsReset(vec![
            RoomPreview {
                room_id: 7,
                name: Some("general".to_string()),
                last_message: Some("hi".to_string()),
                last_activity: None,
            },
            RoomPreview { room_id: 9, name: None, last_message: None, last_activity: None },
        ]));
        insta::assert_snapshot!(update_lines(&update).join("\n"), @r"
        #7 general: hi
        #9 (direct)
        ");
    }

    #[test]
    fn notices() {
        let lines: Vec<String> = [
            ConnectionNotice::StateChanged(ConnectionState::Connected),
            ConnectionNotice::Reconnecting { attempt: 2, delay: Duration::from_millis(3000) },
            ConnectionNotice::ConnectionLost { attempts: 5 },
        ]
        .iter()
        .map(notice_line)
        .collect();
        insta::assert_snapshot!(lines.join("\n"), @r"
        * Connected
        * reconnecting in 3s (attempt 2)
        ! connection lost after 5 attempts, use /quit and restart
        ");
    }

    #[test]
    fn previews_are_silent() {
        let update = ClientUpdate::View(ViewUpdate::PreviewUpdated(RoomPreview {
            room_id: 7,
            name: None,
            last_message: None,
            last_activity: None,
        }));
        assert!(update_lines(&update).is_empty());
    }
}
