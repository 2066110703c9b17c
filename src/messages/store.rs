use sqlx::SqlitePool;
use uuid::Uuid;

use super::{EditRecord, FileMeta, Message, MessageDraft, MessageKind, Reaction};
use crate::db::{now_ms, parse_uuid};
use crate::error::{ChatError, ChatResult};
use crate::identity::{Identity, RoomAuthorizer};
use crate::rooms;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Appends a message to the room's log. `seq` is assigned inside the INSERT,
/// so concurrent posts to the same room linearize on the storage side.
pub async fn post_message(
    db_pool: &SqlitePool,
    identity: &Identity,
    room_id: Uuid,
    draft: MessageDraft,
) -> ChatResult<Message> {
    if !rooms::is_member(db_pool, room_id, &identity.id).await? {
        return Err(ChatError::NotAMember);
    }

    match draft.kind {
        MessageKind::Text => {
            if draft.content.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(ChatError::EmptyContent);
            }
        }
        MessageKind::File => {
            if draft.file.is_none() {
                return Err(ChatError::EmptyContent);
            }
        }
    }

    let id = Uuid::now_v7();
    let file_meta = match &draft.file {
        Some(meta) => Some(encode_file_meta(meta)?),
        None => None,
    };
    sqlx::query(
        "INSERT INTO messages (id,room_id,sender_id,sender_name,sender_avatar,kind,content,file_meta,created_at,seq)
         VALUES (?,?,?,?,?,?,?,?,?,(SELECT COALESCE(MAX(seq),0)+1 FROM messages WHERE room_id=?))",
    )
    .bind(id.to_string())
    .bind(room_id.to_string())
    .bind(&identity.id)
    .bind(&identity.display_name)
    .bind(&identity.avatar)
    .bind(draft.kind.as_str())
    .bind(&draft.content)
    .bind(&file_meta)
    .bind(now_ms())
    .bind(room_id.to_string())
    .execute(db_pool)
    .await?;

    load_message(db_pool, id).await
}

/// Rewrites the message body, keeping the prior content in the edit history.
/// `created_at` and `seq` never change, so the ordering position is stable.
pub async fn edit_message(
    db_pool: &SqlitePool,
    identity_id: &str,
    message_id: Uuid,
    new_content: &str,
) -> ChatResult<Message> {
    if new_content.trim().is_empty() {
        return Err(ChatError::EmptyContent);
    }

    let row: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT sender_id,content FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .fetch_optional(db_pool)
            .await?;
    let (sender_id, prior_content) = row.ok_or(ChatError::MessageNotFound)?;
    if sender_id != identity_id {
        return Err(ChatError::NotSender);
    }

    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO message_edits (message_id,prior_content,edited_at) VALUES (?,?,?)")
        .bind(message_id.to_string())
        .bind(prior_content.unwrap_or_default())
        .bind(now_ms())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE messages SET content=?, is_edited=1 WHERE id=?")
        .bind(new_content)
        .bind(message_id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    load_message(db_pool, message_id).await
}

/// Hard removal, reactions and edit history included. Returns the room the
/// message belonged to so the caller can address the delete broadcast.
pub async fn delete_message(
    db_pool: &SqlitePool,
    identity_id: &str,
    message_id: Uuid,
) -> ChatResult<Uuid> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT room_id,sender_id FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .fetch_optional(db_pool)
            .await?;
    let (room_id, sender_id) = row.ok_or(ChatError::MessageNotFound)?;
    if sender_id != identity_id {
        return Err(ChatError::NotSender);
    }

    let mut tx = db_pool.begin().await?;
    sqlx::query("DELETE FROM message_reactions WHERE message_id=?")
        .bind(message_id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM message_edits WHERE message_id=?")
        .bind(message_id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE id=?")
        .bind(message_id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(parse_uuid(&room_id)?)
}

/// Idempotent: a given identity holds at most one reaction of a given kind
/// per message (UNIQUE index + INSERT OR IGNORE).
pub async fn add_reaction(
    db_pool: &SqlitePool,
    identity_id: &str,
    message_id: Uuid,
    kind: &str,
) -> ChatResult<Message> {
    ensure_exists(db_pool, message_id).await?;
    sqlx::query(
        "INSERT OR IGNORE INTO message_reactions (message_id,identity_id,kind,reacted_at) VALUES (?,?,?,?)",
    )
    .bind(message_id.to_string())
    .bind(identity_id)
    .bind(kind)
    .bind(now_ms())
    .execute(db_pool)
    .await?;

    load_message(db_pool, message_id).await
}

pub async fn remove_reaction(
    db_pool: &SqlitePool,
    identity_id: &str,
    message_id: Uuid,
    kind: &str,
) -> ChatResult<Message> {
    ensure_exists(db_pool, message_id).await?;
    sqlx::query("DELETE FROM message_reactions WHERE message_id=? AND identity_id=? AND kind=?")
        .bind(message_id.to_string())
        .bind(identity_id)
        .bind(kind)
        .execute(db_pool)
        .await?;

    load_message(db_pool, message_id).await
}

/// Pin/unpin. Who may pin is the authorization collaborator's call.
pub async fn set_pinned(
    db_pool: &SqlitePool,
    authorizer: &dyn RoomAuthorizer,
    identity_id: &str,
    message_id: Uuid,
    pinned: bool,
) -> ChatResult<Message> {
    let row: Option<(String,)> = sqlx::query_as("SELECT room_id FROM messages WHERE id=?")
        .bind(message_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    let (room_id,) = row.ok_or(ChatError::MessageNotFound)?;
    let room_id = parse_uuid(&room_id)?;

    if !authorizer.may_pin(identity_id, room_id).await? {
        return Err(ChatError::NotAuthorized);
    }

    sqlx::query("UPDATE messages SET is_pinned=? WHERE id=?")
        .bind(pinned)
        .bind(message_id.to_string())
        .execute(db_pool)
        .await?;

    load_message(db_pool, message_id).await
}

/// Messages strictly older than `before` (or the newest `limit` when omitted),
/// returned oldest-first so callers render top-down.
pub async fn history(
    db_pool: &SqlitePool,
    room_id: Uuid,
    before: Option<Uuid>,
    limit: Option<i64>,
) -> ChatResult<Vec<Message>> {
    let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let before_seq = match before {
        Some(before_id) => {
            let row: Option<(i64,)> =
                sqlx::query_as("SELECT seq FROM messages WHERE id=? AND room_id=?")
                    .bind(before_id.to_string())
                    .bind(room_id.to_string())
                    .fetch_optional(db_pool)
                    .await?;
            Some(row.ok_or(ChatError::MessageNotFound)?.0)
        }
        None => None,
    };

    let ids: Vec<(String,)> = match before_seq {
        Some(seq) => {
            sqlx::query_as(
                "SELECT id FROM messages WHERE room_id=? AND seq<? ORDER BY seq DESC LIMIT ?",
            )
            .bind(room_id.to_string())
            .bind(seq)
            .bind(limit)
            .fetch_all(db_pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT id FROM messages WHERE room_id=? ORDER BY seq DESC LIMIT ?")
                .bind(room_id.to_string())
                .bind(limit)
                .fetch_all(db_pool)
                .await?
        }
    };

    let mut messages = Vec::with_capacity(ids.len());
    for (id,) in ids {
        messages.push(load_message(db_pool, parse_uuid(&id)?).await?);
    }
    messages.reverse();
    Ok(messages)
}

pub async fn load_message(db_pool: &SqlitePool, message_id: Uuid) -> ChatResult<Message> {
    type Row = (
        String,         // room_id
        String,         // sender_id
        String,         // sender_name
        Option<String>, // sender_avatar
        String,         // kind
        Option<String>, // content
        Option<String>, // file_meta
        i64,            // created_at
        i64,            // seq
        bool,           // is_edited
        bool,           // is_pinned
    );
    let row: Option<Row> = sqlx::query_as(
        "SELECT room_id,sender_id,sender_name,sender_avatar,kind,content,file_meta,created_at,seq,is_edited,is_pinned
         FROM messages WHERE id=?",
    )
    .bind(message_id.to_string())
    .fetch_optional(db_pool)
    .await?;
    let (room_id, sender_id, sender_name, sender_avatar, kind, content, file_meta, created_at, seq, is_edited, is_pinned) =
        row.ok_or(ChatError::MessageNotFound)?;

    let reactions: Vec<(String, String)> = sqlx::query_as(
        "SELECT identity_id,kind FROM message_reactions WHERE message_id=? ORDER BY reacted_at,rowid",
    )
    .bind(message_id.to_string())
    .fetch_all(db_pool)
    .await?;

    let edits: Vec<(String, i64)> = sqlx::query_as(
        "SELECT prior_content,edited_at FROM message_edits WHERE message_id=? ORDER BY rowid",
    )
    .bind(message_id.to_string())
    .fetch_all(db_pool)
    .await?;

    Ok(Message {
        id: message_id,
        room_id: parse_uuid(&room_id)?,
        sender: Identity { id: sender_id, display_name: sender_name, avatar: sender_avatar },
        kind: MessageKind::parse(&kind),
        content,
        file: match file_meta {
            Some(raw) => Some(decode_file_meta(&raw)?),
            None => None,
        },
        created_at,
        seq,
        is_edited,
        is_pinned,
        edit_history: edits
            .into_iter()
            .map(|(prior_content, edited_at)| EditRecord { prior_content, edited_at })
            .collect(),
        reactions: reactions
            .into_iter()
            .map(|(identity_id, kind)| Reaction { identity_id, kind })
            .collect(),
    })
}

async fn ensure_exists(db_pool: &SqlitePool, message_id: Uuid) -> ChatResult<()> {
    sqlx::query_as::<_, (i64,)>("SELECT 1 FROM messages WHERE id=?")
        .bind(message_id.to_string())
        .fetch_optional(db_pool)
        .await?
        .map(|_| ())
        .ok_or(ChatError::MessageNotFound)
}

fn encode_file_meta(meta: &FileMeta) -> ChatResult<String> {
    serde_json::to_string(meta).map_err(|e| ChatError::Storage(sqlx::Error::Encode(Box::new(e))))
}

fn decode_file_meta(raw: &str) -> ChatResult<FileMeta> {
    serde_json::from_str(raw).map_err(|e| ChatError::Storage(sqlx::Error::Decode(Box::new(e))))
}
