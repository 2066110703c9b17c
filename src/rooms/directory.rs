use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{now_ms, parse_uuid};
use crate::error::{ChatError, ChatResult};
use crate::identity::{Identity, RoomAuthorizer};

pub const MIN_MEMBERS: i64 = 2;
pub const MAX_MEMBERS: i64 = 1000;
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Public,
    Private,
    Team,
    Direct,
}

impl RoomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomKind::Public => "public",
            RoomKind::Private => "private",
            RoomKind::Team => "team",
            RoomKind::Direct => "direct",
        }
    }

    // columns are only ever written through as_str
    fn parse(s: &str) -> RoomKind {
        match s {
            "private" => RoomKind::Private,
            "team" => RoomKind::Team,
            "direct" => RoomKind::Direct,
            _ => RoomKind::Public,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub kind: RoomKind,
    pub max_members: i64,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoom {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: RoomKind,
    pub max_members: i64,
}

pub async fn create_room(
    db_pool: &SqlitePool,
    identity: &Identity,
    req: CreateRoom,
) -> ChatResult<Room> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ChatError::InvalidRoomName);
    }
    if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&req.max_members) {
        return Err(ChatError::InvalidMemberLimit);
    }

    let room = Room {
        id: Uuid::now_v7(),
        name: name.to_owned(),
        description: req.description,
        kind: req.kind,
        max_members: req.max_members,
        created_at: now_ms(),
    };

    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO rooms (id,name,description,kind,max_members,created_at) VALUES (?,?,?,?,?,?)")
        .bind(room.id.to_string())
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.kind.as_str())
        .bind(room.max_members)
        .bind(room.created_at)
        .execute(&mut *tx)
        .await?;
    // creator is member #1
    sqlx::query("INSERT INTO room_members (room_id,identity_id,display_name,avatar,joined_at) VALUES (?,?,?,?,?)")
        .bind(room.id.to_string())
        .bind(&identity.id)
        .bind(&identity.display_name)
        .bind(&identity.avatar)
        .bind(room.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(room)
}

pub async fn fetch_room(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<Room> {
    let row: Option<(String, String, String, i64, i64)> =
        sqlx::query_as("SELECT name,description,kind,max_members,created_at FROM rooms WHERE id=?")
            .bind(room_id.to_string())
            .fetch_optional(db_pool)
            .await?;
    let (name, description, kind, max_members, created_at) =
        row.ok_or(ChatError::RoomNotFound)?;
    Ok(Room {
        id: room_id,
        name,
        description,
        kind: RoomKind::parse(&kind),
        max_members,
        created_at,
    })
}

pub async fn is_member(db_pool: &SqlitePool, room_id: Uuid, identity_id: &str) -> ChatResult<bool> {
    Ok(
        sqlx::query_as::<_, (i64,)>("SELECT 1 FROM room_members WHERE room_id=? AND identity_id=?")
            .bind(room_id.to_string())
            .bind(identity_id)
            .fetch_optional(db_pool)
            .await?
            .is_some(),
    )
}

pub async fn member_count(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_members WHERE room_id=?")
        .bind(room_id.to_string())
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

/// Durable join. Returns the room and whether the identity is a new member;
/// re-joining an already-joined room is idempotent so reconnecting clients
/// can always re-issue their joins.
pub async fn join_room(
    db_pool: &SqlitePool,
    authorizer: &dyn RoomAuthorizer,
    identity: &Identity,
    room_id: Uuid,
) -> ChatResult<(Room, bool)> {
    let room = fetch_room(db_pool, room_id).await?;

    if is_member(db_pool, room_id, &identity.id).await? {
        return Ok((room, false));
    }

    if room.kind != RoomKind::Public
        && !authorizer.may_join(&identity.id, room_id, room.kind).await?
    {
        return Err(ChatError::NotAuthorized);
    }

    // the member-count guard lives inside the INSERT so concurrent joins
    // cannot push the room past max_members
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO room_members (room_id,identity_id,display_name,avatar,joined_at)
         SELECT ?,?,?,?,?
         WHERE (SELECT COUNT(*) FROM room_members WHERE room_id=?) < ?",
    )
    .bind(room_id.to_string())
    .bind(&identity.id)
    .bind(&identity.display_name)
    .bind(&identity.avatar)
    .bind(now_ms())
    .bind(room_id.to_string())
    .bind(room.max_members)
    .execute(db_pool)
    .await?
    .rows_affected();

    if inserted == 0 {
        // lost a race: either another device of this identity joined first
        // (fine) or the last seat went to someone else
        if is_member(db_pool, room_id, &identity.id).await? {
            return Ok((room, false));
        }
        return Err(ChatError::RoomFull);
    }

    Ok((room, true))
}

pub async fn leave_room(db_pool: &SqlitePool, room_id: Uuid, identity_id: &str) -> ChatResult<()> {
    let removed = sqlx::query("DELETE FROM room_members WHERE room_id=? AND identity_id=?")
        .bind(room_id.to_string())
        .bind(identity_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(ChatError::NotAMember);
    }
    Ok(())
}

pub async fn rooms_of(db_pool: &SqlitePool, identity_id: &str) -> ChatResult<Vec<Room>> {
    let rows: Vec<(String, String, String, String, i64, i64)> = sqlx::query_as(
        "SELECT r.id,r.name,r.description,r.kind,r.max_members,r.created_at
         FROM rooms r JOIN room_members m ON m.room_id = r.id
         WHERE m.identity_id=? ORDER BY r.created_at",
    )
    .bind(identity_id)
    .fetch_all(db_pool)
    .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for (id, name, description, kind, max_members, created_at) in rows {
        rooms.push(Room {
            id: parse_uuid(&id)?,
            name,
            description,
            kind: RoomKind::parse(&kind),
            max_members,
            created_at,
        });
    }
    Ok(rooms)
}

/// Durable members of the room (online or not).
pub async fn members_of(db_pool: &SqlitePool, room_id: Uuid) -> ChatResult<Vec<Identity>> {
    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT identity_id,display_name,avatar FROM room_members WHERE room_id=? ORDER BY joined_at,rowid",
    )
    .bind(room_id.to_string())
    .fetch_all(db_pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, display_name, avatar)| Identity { id, display_name, avatar })
        .collect())
}
