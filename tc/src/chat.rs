//! Chat messages and transcript
//!
//! The transcript is append-only by arrival. The only in-place change is an
//! optimistic local message being replaced by its server echo.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Chat message identifier
///
/// Messages sent from this client carry a temporary local id until the
/// server echo (with its numeric id) replaces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Local(Uuid),
}

impl MessageId {
    pub fn new_local() -> Self {
        Self::Local(Uuid::now_v7())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{}", id),
            Self::Local(uuid) => write!(f, "local-{}", uuid),
        }
    }
}

/// Author of a human message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,

    #[serde(rename = "nickname")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,

    #[serde(rename = "message")]
    pub text: String,

    #[serde(rename = "is_from_gpt", default)]
    pub is_from_assistant: bool,

    /// Only meaningful for human messages
    #[serde(rename = "sent_to_gpt", default)]
    pub sent_to_assistant: bool,

    /// Absent for assistant messages
    #[serde(default)]
    pub sender: Option<Sender>,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Optimistic message authored on this client
    pub fn local(text: impl Into<String>, sender: Option<Sender>, sent_to_assistant: bool) -> Self {
        Self {
            id: MessageId::new_local(),
            text: text.into(),
            is_from_assistant: false,
            sent_to_assistant,
            sender,
            created_at: Some(Utc::now()),
        }
    }

    pub fn is_from(&self, user_id: i64) -> bool {
        !self.is_from_assistant && self.sender.as_ref().is_some_and(|sender| sender.id == user_id)
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601 timestamps (read as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// How an inbound message landed in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Appended,
    /// Replaced the message at this index
    Replaced(usize),
}

/// Ordered chat history of one trip
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Local messages still waiting for a server echo
    pub fn unconfirmed(&self) -> usize {
        self.messages.iter().filter(|message| message.id.is_local()).count()
    }

    /// Append an optimistic message sent from this client
    pub fn push_local(&mut self, message: ChatMessage) -> MessageId {
        debug!(id = %message.id, "push_local: called");
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Take in a message from the realtime channel
    ///
    /// Same id replaces; an echo of our own message replaces the oldest local
    /// message with the same text; anything else is appended.
    pub fn receive(&mut self, message: ChatMessage, me: Option<i64>) -> Received {
        debug!(id = %message.id, "receive: called");
        if let Some(at) = self.messages.iter().position(|existing| existing.id == message.id) {
            self.messages[at] = message;
            return Received::Replaced(at);
        }

        let own_echo = me.is_some_and(|me| message.is_from(me));
        if own_echo {
            let local = self
                .messages
                .iter()
                .position(|existing| existing.id.is_local() && existing.text == message.text);
            if let Some(at) = local {
                debug!(at, "receive: replacing local echo");
                self.messages[at] = message;
                return Received::Replaced(at);
            }
        }

        self.messages.push(message);
        Received::Appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_server(id: i64, sender: Option<(i64, &str)>, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::Server(id),
            text: text.to_string(),
            is_from_assistant: sender.is_none(),
            sent_to_assistant: false,
            sender: sender.map(|(id, name)| Sender {
                id,
                display_name: name.to_string(),
            }),
            created_at: None,
        }
    }

    fn me() -> Sender {
        Sender {
            id: 1,
            display_name: "mina".to_string(),
        }
    }

    #[test]
    fn test_deserialize_server_payload_with_naive_timestamp() {
        let json = r#"{
            "id": 55,
            "trip_id": 3,
            "sender": {"id": 2, "nickname": "jun"},
            "message": "meet at the station?",
            "is_from_gpt": false,
            "created_at": "2024-05-01T09:15:30.123456"
        }"#;

        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, MessageId::Server(55));
        assert_eq!(message.sender.as_ref().map(|s| s.display_name.as_str()), Some("jun"));
        assert!(!message.sent_to_assistant);
        assert_eq!(
            message.created_at.map(|ts| ts.to_rfc3339()),
            Some("2024-05-01T09:15:30.123456+00:00".to_string())
        );
    }

    #[test]
    fn test_deserialize_assistant_message() {
        let json = r#"{"id": 9, "sender": null, "message": "Plan updated", "is_from_gpt": true, "created_at": "2024-05-01T09:15:30+09:00"}"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert!(message.is_from_assistant);
        assert!(message.sender.is_none());
        assert_eq!(message.created_at.map(|ts| ts.to_rfc3339()), Some("2024-05-01T00:15:30+00:00".to_string()));
    }

    #[test]
    fn test_local_ids_are_distinct() {
        let a = ChatMessage::local("hi", Some(me()), false);
        let b = ChatMessage::local("hi", Some(me()), false);
        assert_ne!(a.id, b.id);
        assert!(a.id.is_local());
    }

    #[test]
    fn test_receive_appends_messages_from_others() {
        let mut transcript = Transcript::new();
        transcript.push_local(ChatMessage::local("hello", Some(me()), false));

        assert_eq!(transcript.receive(from_server(10, Some((2, "jun")), "hello"), Some(1)), Received::Appended);
        assert_eq!(transcript.receive(from_server(11, None, "Sure!"), Some(1)), Received::Appended);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.unconfirmed(), 1);
    }

    #[test]
    fn test_receive_replaces_same_id() {
        let mut transcript = Transcript::from_history(vec![from_server(10, Some((2, "jun")), "draft")]);
        let edited = from_server(10, Some((2, "jun")), "final");
        assert_eq!(transcript.receive(edited, Some(1)), Received::Replaced(0));
        assert_eq!(transcript.messages()[0].text, "final");
    }

    #[test]
    fn test_own_echo_replaces_oldest_local() {
        let mut transcript = Transcript::new();
        transcript.push_local(ChatMessage::local("go left", Some(me()), true));
        transcript.push_local(ChatMessage::local("go left", Some(me()), true));

        let echo = from_server(20, Some((1, "mina")), "go left");
        assert_eq!(transcript.receive(echo, Some(1)), Received::Replaced(0));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].id, MessageId::Server(20));
        assert!(transcript.messages()[1].id.is_local());
    }

    #[test]
    fn test_echo_without_known_user_appends() {
        let mut transcript = Transcript::new();
        transcript.push_local(ChatMessage::local("go left", Some(me()), true));
        let echo = from_server(20, Some((1, "mina")), "go left");
        assert_eq!(transcript.receive(echo, None), Received::Appended);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_message_id_wire_forms() {
        let server: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(server, MessageId::Server(42));
        let local = MessageId::new_local();
        let back: MessageId = serde_json::from_str(&serde_json::to_string(&local).unwrap()).unwrap();
        assert_eq!(back, local);
    }
}
