pub mod store;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
        }
    }

    fn parse(s: &str) -> MessageKind {
        match s {
            "file" => MessageKind::File,
            _ => MessageKind::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub identity_id: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    pub prior_content: String,
    pub edited_at: i64,
}

/// A durable chat message. `seq` is the room-local total order; it is
/// assigned at insert and never changes, so re-reads of history are stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender: Identity,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub file: Option<FileMeta>,
    pub created_at: i64,
    pub seq: i64,
    pub is_edited: bool,
    pub is_pinned: bool,
    pub edit_history: Vec<EditRecord>,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file: Option<FileMeta>,
}

impl MessageDraft {
    pub fn text(content: &str) -> Self {
        Self { kind: MessageKind::Text, content: Some(content.to_owned()), file: None }
    }
}
