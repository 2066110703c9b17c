//! Wire envelopes for the socket: outbound `{"event": …, "data": …}` and
//! inbound `{"op": …, …}` frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;
use crate::messages::{Message, MessageDraft};
use crate::rooms::Room;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Snapshot of the caller's durable rooms, pushed once on connect.
    #[serde(rename = "rooms:list")]
    RoomsList { rooms: Vec<Room> },
    #[serde(rename = "message:new")]
    MessageNew { message: Message },
    #[serde(rename = "message:edited")]
    MessageEdited { message: Message },
    #[serde(rename = "message:deleted")]
    MessageDeleted { room_id: Uuid, message_id: Uuid },
    #[serde(rename = "message:reaction")]
    MessageReaction { message: Message },
    #[serde(rename = "message:pinned")]
    MessagePinned { message: Message },
    #[serde(rename = "room:memberJoined")]
    MemberJoined { room_id: Uuid, member: Identity },
    #[serde(rename = "room:memberLeft")]
    MemberLeft { room_id: Uuid, member: Identity },
    #[serde(rename = "presence:online")]
    PresenceOnline { room_id: Uuid, identity: Identity, online: Vec<Identity> },
    #[serde(rename = "presence:offline")]
    PresenceOffline { room_id: Uuid, identity: Identity, online: Vec<Identity> },
    #[serde(rename = "typing:changed")]
    TypingChanged { room_id: Uuid, typing: Vec<Identity> },
    /// Rejection report, addressed to the failing caller only.
    #[serde(rename = "error")]
    Error { code: &'static str, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "joinRoom")]
    JoinRoom { room_id: Uuid },
    #[serde(rename = "leaveRoom")]
    LeaveRoom { room_id: Uuid },
    #[serde(rename = "sendMessage")]
    SendMessage {
        room_id: Uuid,
        #[serde(flatten)]
        draft: MessageDraft,
    },
    #[serde(rename = "typing:start")]
    TypingStart { room_id: Uuid },
    #[serde(rename = "typing:stop")]
    TypingStop { room_id: Uuid },
    #[serde(rename = "editMessage")]
    EditMessage { message_id: Uuid, content: String },
    #[serde(rename = "deleteMessage")]
    DeleteMessage { message_id: Uuid },
    #[serde(rename = "reactMessage")]
    ReactMessage {
        message_id: Uuid,
        reaction: String,
        #[serde(default)]
        remove: bool,
    },
    #[serde(rename = "pinMessage")]
    PinMessage {
        message_id: Uuid,
        #[serde(default)]
        unpin: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_envelope_shape() {
        let room_id = Uuid::now_v7();
        let event = ServerEvent::TypingChanged { room_id, typing: Vec::new() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "typing:changed");
        assert_eq!(json["data"]["roomId"], serde_json::json!(room_id));
        assert!(json["data"]["typing"].as_array().unwrap().is_empty());
    }

    #[test]
    fn inbound_ops_parse() {
        let room_id = Uuid::now_v7();
        let frame = format!(r#"{{"op":"typing:start","roomId":"{room_id}"}}"#);
        assert!(matches!(
            serde_json::from_str::<ClientEvent>(&frame).unwrap(),
            ClientEvent::TypingStart { room_id: r } if r == room_id
        ));

        let frame = format!(
            r#"{{"op":"sendMessage","roomId":"{room_id}","kind":"text","content":"hello"}}"#
        );
        let ClientEvent::SendMessage { draft, .. } = serde_json::from_str(&frame).unwrap() else {
            panic!("wrong op");
        };
        assert_eq!(draft.content.as_deref(), Some("hello"));
    }

    #[test]
    fn garbage_frames_fail_to_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"op":"shoutAtRoom"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }
}
