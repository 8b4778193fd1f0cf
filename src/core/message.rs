use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
    Error,
    /// Status lines shown while work is in flight; never persisted
    System,
}

impl MessageKind {
    pub fn is_persistent(self) -> bool {
        !matches!(self, MessageKind::System)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::Error => "error",
            MessageKind::System => "system",
        };
        f.write_str(name)
    }
}

/// One chat turn as stored under `chat_history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Entries written by older clients may lack a timestamp
    #[serde(rename = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(text: impl Into<String>, kind: MessageKind) -> Self {
        let created_at = Utc::now();
        Self {
            id: generate_id(created_at),
            text: text.into(),
            kind,
            created_at: Some(created_at),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, MessageKind::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, MessageKind::Assistant)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, MessageKind::Error)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, MessageKind::System)
    }
}

/// Millisecond timestamp followed by a random base-36 suffix
fn generate_id(created_at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", created_at.timestamp_millis(), suffix)
}

/// Stable sort by creation time
///
/// Only entries carrying a timestamp are reordered, among the slots they
/// already occupy; entries without one keep their position.
pub fn sort_by_created_at(messages: &mut [Message]) {
    let slots: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.created_at.is_some())
        .map(|(i, _)| i)
        .collect();

    let mut timed: Vec<Message> = slots.iter().map(|&i| messages[i].clone()).collect();
    timed.sort_by_key(|m| m.created_at);

    for (slot, message) in slots.into_iter().zip(timed) {
        messages[slot] = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(text: &str, secs: Option<i64>) -> Message {
        Message {
            id: text.to_string(),
            text: text.to_string(),
            kind: MessageKind::User,
            created_at: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn test_ids_are_unique_and_prefixed_by_time() {
        let a = Message::user("a");
        let b = Message::user("b");
        assert_ne!(a.id, b.id);

        let millis = a.created_at.unwrap().timestamp_millis().to_string();
        assert!(a.id.starts_with(&millis));
        assert_eq!(a.id.len(), millis.len() + ID_SUFFIX_LEN);
    }

    #[test]
    fn test_stored_layout() {
        let message = Message::assistant("Form 1040 is the individual return.");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], json!("ai"));
        assert_eq!(value["message"], json!("Form 1040 is the individual return."));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_accepts_assistant_alias_and_missing_timestamp() {
        let message: Message =
            serde_json::from_value(json!({"id": "1", "message": "hi", "type": "assistant"})).unwrap();
        assert_eq!(message.kind, MessageKind::Assistant);
        assert!(message.created_at.is_none());
    }

    #[test]
    fn test_system_kind_is_not_persistent() {
        assert!(!MessageKind::System.is_persistent());
        assert!(MessageKind::Error.is_persistent());
    }

    #[test]
    fn test_sort_keeps_untimed_entries_in_place() {
        let mut messages = vec![at("c", Some(30)), at("x", None), at("a", Some(10)), at("b", Some(20))];
        sort_by_created_at(&mut messages);

        let order: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(order, vec!["a", "x", "b", "c"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let mut messages = vec![at("first", Some(5)), at("second", Some(5)), at("early", Some(1))];
        sort_by_created_at(&mut messages);

        let order: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(order, vec!["early", "first", "second"]);
    }
}
