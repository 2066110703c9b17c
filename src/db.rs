use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new().max_connections(16).connect(url).await
}

pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL,
            max_members INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS room_members (
            room_id TEXT NOT NULL,
            identity_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            avatar TEXT,
            joined_at INTEGER NOT NULL,
            PRIMARY KEY (room_id, identity_id)
        )",
    )
    .execute(pool)
    .await?;

    // seq is assigned at insert; UNIQUE (room_id, seq) backs the per-room
    // total order that history() relies on.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_name TEXT NOT NULL,
            sender_avatar TEXT,
            kind TEXT NOT NULL,
            content TEXT,
            file_meta TEXT,
            created_at INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            is_edited INTEGER NOT NULL DEFAULT 0,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            UNIQUE (room_id, seq)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message_edits (
            message_id TEXT NOT NULL,
            prior_content TEXT NOT NULL,
            edited_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // one reaction of a given kind per identity per message
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS message_reactions (
            message_id TEXT NOT NULL,
            identity_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            reacted_at INTEGER NOT NULL,
            UNIQUE (message_id, identity_id, kind)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Wall-clock milliseconds, the crate's durable timestamp unit.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn parse_uuid(s: &str) -> Result<uuid::Uuid, sqlx::Error> {
    uuid::Uuid::parse_str(s).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
