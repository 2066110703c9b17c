//! Inbound-event dispatch: one arm per client op, durable write first,
//! broadcast only after the write has committed. A rejected op never
//! produces a partial broadcast.

use uuid::Uuid;

use crate::AppState;
use crate::error::ChatResult;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity::Identity;
use crate::messages::{MessageDraft, store};
use crate::rooms;

pub async fn handle(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    event: ClientEvent,
) -> ChatResult<()> {
    match event {
        ClientEvent::JoinRoom { room_id } => {
            join_room(state, connection_id, identity, room_id).await
        }
        ClientEvent::LeaveRoom { room_id } => {
            leave_room(state, connection_id, identity, room_id).await
        }
        ClientEvent::SendMessage { room_id, draft } => {
            send_message(state, identity, room_id, draft).await
        }
        ClientEvent::TypingStart { room_id } => {
            state.typing.start(room_id, identity.clone());
            broadcast_typing(state, room_id, &identity.id);
            Ok(())
        }
        ClientEvent::TypingStop { room_id } => {
            state.typing.stop(room_id, &identity.id);
            broadcast_typing(state, room_id, &identity.id);
            Ok(())
        }
        ClientEvent::EditMessage { message_id, content } => {
            let message =
                store::edit_message(&state.db_pool, &identity.id, message_id, &content).await?;
            let room_id = message.room_id;
            state.broker.broadcast(room_id, ServerEvent::MessageEdited { message }, None);
            Ok(())
        }
        ClientEvent::DeleteMessage { message_id } => {
            let room_id = store::delete_message(&state.db_pool, &identity.id, message_id).await?;
            state
                .broker
                .broadcast(room_id, ServerEvent::MessageDeleted { room_id, message_id }, None);
            Ok(())
        }
        ClientEvent::ReactMessage { message_id, reaction, remove } => {
            let message = if remove {
                store::remove_reaction(&state.db_pool, &identity.id, message_id, &reaction).await?
            } else {
                store::add_reaction(&state.db_pool, &identity.id, message_id, &reaction).await?
            };
            let room_id = message.room_id;
            state.broker.broadcast(room_id, ServerEvent::MessageReaction { message }, None);
            Ok(())
        }
        ClientEvent::PinMessage { message_id, unpin } => {
            let message = store::set_pinned(
                &state.db_pool,
                state.authorizer.as_ref(),
                &identity.id,
                message_id,
                !unpin,
            )
            .await?;
            let room_id = message.room_id;
            state.broker.broadcast(room_id, ServerEvent::MessagePinned { message }, None);
            Ok(())
        }
    }
}

async fn join_room(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: Uuid,
) -> ChatResult<()> {
    let (room, newly_joined) =
        rooms::join_room(&state.db_pool, state.authorizer.as_ref(), identity, room_id).await?;

    // live join happens only after the durable join committed
    state.registry.join_room(connection_id, room.id);

    if newly_joined {
        state.broker.broadcast(
            room_id,
            ServerEvent::MemberJoined { room_id, member: identity.clone() },
            None,
        );
    }
    let online = state.registry.online_members_of(room_id);
    state.broker.broadcast(
        room_id,
        ServerEvent::PresenceOnline { room_id, identity: identity.clone(), online },
        None,
    );
    Ok(())
}

async fn leave_room(
    state: &AppState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: Uuid,
) -> ChatResult<()> {
    rooms::leave_room(&state.db_pool, room_id, &identity.id).await?;
    state.registry.leave_room(connection_id, room_id);
    state.broker.broadcast(
        room_id,
        ServerEvent::MemberLeft { room_id, member: identity.clone() },
        None,
    );
    Ok(())
}

async fn send_message(
    state: &AppState,
    identity: &Identity,
    room_id: Uuid,
    draft: MessageDraft,
) -> ChatResult<()> {
    let message = store::post_message(&state.db_pool, identity, room_id, draft).await?;
    // echoed to the sender's own connections too, so other tabs stay in sync
    state.broker.broadcast(room_id, ServerEvent::MessageNew { message }, None);

    // sending implies the author stopped typing
    if state.typing.stop(room_id, &identity.id) {
        broadcast_typing(state, room_id, &identity.id);
    }
    Ok(())
}

fn broadcast_typing(state: &AppState, room_id: Uuid, originator: &str) {
    let typing = state.typing.typists_of(room_id);
    state
        .broker
        .broadcast(room_id, ServerEvent::TypingChanged { room_id, typing }, Some(originator));
}

/// Socket teardown: clear presence atomically, tell every affected room,
/// drop the identity's typing states, release the sink. Transport drops are
/// not errors anywhere in this path.
pub fn disconnect(state: &AppState, connection_id: Uuid, identity: &Identity) {
    let joined_rooms = state.registry.unregister(connection_id);
    state.broker.unregister_sink(connection_id);

    for room_id in joined_rooms {
        let online = state.registry.online_members_of(room_id);
        state.broker.broadcast(
            room_id,
            ServerEvent::PresenceOffline { room_id, identity: identity.clone(), online },
            None,
        );
    }

    for room_id in state.typing.clear_identity(&identity.id) {
        broadcast_typing(state, room_id, &identity.id);
    }
}
