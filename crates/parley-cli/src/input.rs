//! Input line parsing.

use parley_proto::RoomId;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/join <room>`
    Join(RoomId),
    /// `/leave`
    Leave,
    /// `/older`
    Older,
    /// `/rooms`
    Rooms,
    /// `/status`
    Status,
    /// `/quit`
    Quit,
    /// Anything not starting with `/`
    Message(String),
    /// Blank line
    Empty,
    /// A command that did not parse; carries a usage hint
    Invalid(String),
}

const USAGE: &str = "commands: /join <room>, /leave, /older, /rooms, /status, /quit";

impl Input {
    /// Parse one line of user input.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let mut words = command.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("join" | "j"), Some(room), None) => match room.parse() {
                Ok(room_id) => Self::Join(room_id),
                Err(_) => Self::Invalid(format!("not a room id: {room}")),
            },
            (Some("join" | "j"), None, None) => Self::Invalid("usage: /join <room>".to_string()),
            (Some("leave"), None, None) => Self::Leave,
            (Some("older"), None, None) => Self::Older,
            (Some("rooms"), None, None) => Self::Rooms,
            (Some("status"), None, None) => Self::Status,
            (Some("quit" | "q"), None, None) => Self::Quit,
            _ => Self::Invalid(USAGE.to_string()),
        }
    }
}
