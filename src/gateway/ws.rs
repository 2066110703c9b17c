use axum::{
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::dispatch;
use crate::AppState;
use crate::error::ChatResult;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity::Identity;
use crate::rooms;

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    token: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    Query(WsQuery { token }): Query<WsQuery>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> ChatResult<Response> {
    // resolve the identity before upgrading, so a bad token is a plain 401
    let identity = state.identity.resolve(&token).await?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let connection_id = Uuid::now_v7();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    state.registry.register(connection_id, identity.clone());
    state.broker.register_sink(connection_id, event_tx);
    tracing::info!(%connection_id, identity = %identity.id, "connection opened");

    // push the caller's room list so clients never poll for it on load
    match rooms::rooms_of(&state.db_pool, &identity.id).await {
        Ok(room_list) => state
            .broker
            .send_to(connection_id, ServerEvent::RoomsList { rooms: room_list }),
        Err(err) => tracing::warn!(%connection_id, %err, "room snapshot failed"),
    }

    let (mut sender, mut receiver) = socket.split();

    let forward_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Ok(frame) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
            continue;
        };

        state.registry.touch(connection_id);
        if let Err(err) = dispatch::handle(&state, connection_id, &identity, event).await {
            state.broker.send_to(
                connection_id,
                ServerEvent::Error { code: err.code(), message: err.to_string() },
            );
        }
    }

    forward_task.abort();
    dispatch::disconnect(&state, connection_id, &identity);
    tracing::info!(%connection_id, identity = %identity.id, "connection closed");
}
