mod directory;

pub use directory::{
    CreateRoom, MAX_MEMBERS, MAX_NAME_LEN, MIN_MEMBERS, Room, RoomKind, create_room, fetch_room,
    is_member, join_room, leave_room, member_count, members_of, rooms_of,
};

use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::AppState;
use crate::broker::DeliveryBroker;
use crate::error::{ChatError, ChatResult};
use crate::events::ServerEvent;
use crate::identity::{Identity, IdentityProvider, RoomAuthorizer, bearer_token};
use crate::messages::{Message, store};
use crate::presence::PresenceRegistry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list_mine))
        .route("/{id}/join", post(join))
        .route("/{id}/leave", post(leave))
        .route("/{id}/members", get(members))
        .route("/{id}/online", get(online))
        .route("/{id}/history", get(history))
}

async fn caller(
    provider: &Arc<dyn IdentityProvider>,
    headers: &HeaderMap,
) -> ChatResult<Identity> {
    provider.resolve(bearer_token(headers)?).await
}

#[debug_handler(state = AppState)]
async fn create(
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    headers: HeaderMap,
    Json(req): Json<CreateRoom>,
) -> ChatResult<Json<Room>> {
    let identity = caller(&provider, &headers).await?;
    let room = directory::create_room(&db_pool, &identity, req).await?;
    tracing::info!(room = %room.id, creator = %identity.id, "room created");
    Ok(Json(room))
}

#[debug_handler(state = AppState)]
async fn list_mine(
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    headers: HeaderMap,
) -> ChatResult<Json<Vec<Room>>> {
    let identity = caller(&provider, &headers).await?;
    Ok(Json(directory::rooms_of(&db_pool, &identity.id).await?))
}

#[debug_handler(state = AppState)]
async fn join(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    State(authorizer): State<Arc<dyn RoomAuthorizer>>,
    State(broker): State<Arc<DeliveryBroker>>,
    headers: HeaderMap,
) -> ChatResult<Json<Room>> {
    let identity = caller(&provider, &headers).await?;
    let (room, newly_joined) =
        directory::join_room(&db_pool, authorizer.as_ref(), &identity, room_id).await?;
    if newly_joined {
        broker.broadcast(room_id, ServerEvent::MemberJoined { room_id, member: identity }, None);
    }
    Ok(Json(room))
}

#[debug_handler(state = AppState)]
async fn leave(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    State(broker): State<Arc<DeliveryBroker>>,
    headers: HeaderMap,
) -> ChatResult<()> {
    let identity = caller(&provider, &headers).await?;
    directory::leave_room(&db_pool, room_id, &identity.id).await?;
    broker.broadcast(room_id, ServerEvent::MemberLeft { room_id, member: identity }, None);
    Ok(())
}

#[debug_handler(state = AppState)]
async fn members(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    headers: HeaderMap,
) -> ChatResult<Json<Vec<Identity>>> {
    let identity = caller(&provider, &headers).await?;
    if !directory::is_member(&db_pool, room_id, &identity.id).await? {
        return Err(ChatError::NotAMember);
    }
    Ok(Json(directory::members_of(&db_pool, room_id).await?))
}

#[debug_handler(state = AppState)]
async fn online(
    Path(room_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    State(registry): State<Arc<PresenceRegistry>>,
    headers: HeaderMap,
) -> ChatResult<Json<Vec<Identity>>> {
    let identity = caller(&provider, &headers).await?;
    if !directory::is_member(&db_pool, room_id, &identity.id).await? {
        return Err(ChatError::NotAMember);
    }
    Ok(Json(registry.online_members_of(room_id)))
}

#[derive(Deserialize)]
struct HistoryQuery {
    before: Option<Uuid>,
    limit: Option<i64>,
}

#[debug_handler(state = AppState)]
async fn history(
    Path(room_id): Path<Uuid>,
    Query(HistoryQuery { before, limit }): Query<HistoryQuery>,
    State(db_pool): State<SqlitePool>,
    State(provider): State<Arc<dyn IdentityProvider>>,
    headers: HeaderMap,
) -> ChatResult<Json<Vec<Message>>> {
    let identity = caller(&provider, &headers).await?;
    if !directory::is_member(&db_pool, room_id, &identity.id).await? {
        return Err(ChatError::NotAMember);
    }
    Ok(Json(store::history(&db_pool, room_id, before, limit).await?))
}
