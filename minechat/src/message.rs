use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Layout of the optional `[...]` stamp in front of chat lines.
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M";

pub const UNRECOGNIZED_LINE: &str = "unrecognized line";

/// Credentials issued by the chat server.
///
/// The field names match the JSON object the server sends back from the
/// handshake, which is also how the credential file stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nickname: String,
    #[serde(rename = "account_hash")]
    pub token: String,
}

/// A line received from the server, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    TextMessage {
        timestamp: Option<NaiveDateTime>,
        sender: Option<String>,
        body: String,
    },
    AuthResult {
        success: bool,
        account: Option<Account>,
    },
    ProtocolError {
        reason: String,
    },
}

impl ChatEvent {
    fn unrecognized() -> Self {
        ChatEvent::ProtocolError {
            reason: UNRECOGNIZED_LINE.to_string(),
        }
    }
}

/// Lines the client is allowed to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Token(String),
    /// An empty line in place of a token asks the server for a new account.
    RegisterRequest,
    Nickname(String),
    /// One line of chat text. Never empty on the wire, since an empty line
    /// is the end-of-message marker.
    Message(String),
    EndOfMessage,
}

impl Outbound {
    pub fn token(token: &str) -> Self {
        Outbound::Token(sanitize_field(token.trim()))
    }

    pub fn nickname(nickname: &str) -> Self {
        Outbound::Nickname(sanitize_field(nickname))
    }

    pub fn message(text: &str) -> Self {
        Outbound::Message(sanitize_field(text))
    }
}

/// What the server expects next from a send-port client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    AwaitingToken,
    AwaitingNickname,
    Chatting,
}

/// Decodes one server line. Never fails: unknown shapes become
/// [`ChatEvent::ProtocolError`].
pub fn decode_line(line: &str) -> ChatEvent {
    let line = printable(line.trim_end_matches(LINE_ENDINGS));
    if line.trim().is_empty() {
        return ChatEvent::unrecognized();
    }
    let line = line.as_str();

    if line == "null" {
        return ChatEvent::AuthResult {
            success: false,
            account: None,
        };
    }

    if line.starts_with('{') {
        return match serde_json::from_str::<Account>(line) {
            Ok(account) => ChatEvent::AuthResult {
                success: true,
                account: Some(account),
            },
            Err(_) => ChatEvent::unrecognized(),
        };
    }

    let (timestamp, rest) = split_timestamp(line);
    let (sender, body) = split_sender(rest);
    ChatEvent::TextMessage {
        timestamp,
        sender: sender.map(str::to_string),
        body: body.to_string(),
    }
}

/// Renders an outbound line without its trailing newline.
pub fn encode_line(message: &Outbound) -> String {
    match message {
        Outbound::Token(token) => token.clone(),
        Outbound::RegisterRequest | Outbound::EndOfMessage => String::new(),
        Outbound::Nickname(nickname) => nickname.clone(),
        Outbound::Message(text) => text.clone(),
    }
}

/// Server-side reading of a client line; the inverse of [`encode_line`].
pub fn decode_client_line(phase: ServerPhase, line: &str) -> Outbound {
    let line = line.trim_end_matches(LINE_ENDINGS);
    match phase {
        ServerPhase::AwaitingToken if line.is_empty() => Outbound::RegisterRequest,
        ServerPhase::AwaitingToken => Outbound::Token(line.to_string()),
        ServerPhase::AwaitingNickname => Outbound::Nickname(line.to_string()),
        ServerPhase::Chatting if line.is_empty() => Outbound::EndOfMessage,
        ServerPhase::Chatting => Outbound::Message(line.to_string()),
    }
}

/// Makes free text safe to send as a single protocol field.
///
/// Line breaks become spaces so words stay apart; other control characters
/// are dropped. Whitespace-only input is left alone.
pub fn sanitize_field(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            '\n' | '\r' => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect()
}

/// Keeps tabs, turns stray line breaks into spaces and drops other control
/// characters, so one received line stays one transcript line.
fn printable(line: &str) -> String {
    line.chars()
        .filter_map(|ch| match ch {
            '\t' => Some(ch),
            '\n' | '\r' => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect()
}

fn split_timestamp(line: &str) -> (Option<NaiveDateTime>, &str) {
    let Some(stamped) = line.strip_prefix('[') else {
        return (None, line);
    };
    let Some((stamp, rest)) = stamped.split_once("] ") else {
        return (None, line);
    };
    match NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT) {
        Ok(timestamp) => (Some(timestamp), rest),
        Err(_) => (None, line),
    }
}

fn split_sender(line: &str) -> (Option<&str>, &str) {
    match line.split_once(": ") {
        Some((name, body)) if is_sender_name(name) => (Some(name), body),
        _ => (None, line),
    }
}

fn is_sender_name(name: &str) -> bool {
    !name.is_empty() && name.trim() == name && !name.starts_with('[')
}
