use std::sync::Arc;

use huddle::AppState;
use huddle::db;
use huddle::error::ChatError;
use huddle::events::{ClientEvent, ServerEvent};
use huddle::gateway::dispatch;
use huddle::identity::{Identity, StaticIdentityProvider, StaticRoomAuthorizer};
use huddle::messages::MessageDraft;
use huddle::rooms::{self, CreateRoom, RoomKind};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

fn identity(id: &str) -> Identity {
    Identity { id: id.to_owned(), display_name: id.to_uppercase(), avatar: None }
}

async fn test_state() -> AppState {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init(&pool).await.unwrap();
    AppState::new(
        pool,
        Arc::new(StaticIdentityProvider::new()),
        Arc::new(StaticRoomAuthorizer { allow_join: true, allow_pin: true }),
    )
}

/// Stands in for an upgraded socket: a registered connection whose outbound
/// sink we can observe.
fn connect(state: &AppState, who: &Identity) -> (Uuid, UnboundedReceiver<ServerEvent>) {
    let connection_id = Uuid::now_v7();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    state.registry.register(connection_id, who.clone());
    state.broker.register_sink(connection_id, tx);
    (connection_id, rx)
}

async fn make_room(state: &AppState, creator: &Identity) -> Uuid {
    rooms::create_room(
        &state.db_pool,
        creator,
        CreateRoom {
            name: "general".to_owned(),
            description: String::new(),
            kind: RoomKind::Public,
            max_members: 10,
        },
    )
    .await
    .unwrap()
    .id
}

async fn join(state: &AppState, conn: Uuid, who: &Identity, room_id: Uuid) {
    dispatch::handle(state, conn, who, ClientEvent::JoinRoom { room_id }).await.unwrap();
}

fn next(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
    rx.try_recv().expect("expected a pending event")
}

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) {
    while rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn joining_announces_membership_and_presence() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (conn_a, mut rx_a) = connect(&state, &alice);
    let (conn_b, _rx_b) = connect(&state, &bob);
    join(&state, conn_a, &alice, room_id).await;
    drain(&mut rx_a);

    join(&state, conn_b, &bob, room_id).await;

    // alice sees the durable join, then bob coming online
    assert!(matches!(
        next(&mut rx_a),
        ServerEvent::MemberJoined { member, .. } if member.id == "bob"
    ));
    match next(&mut rx_a) {
        ServerEvent::PresenceOnline { identity: who, online, .. } => {
            assert_eq!(who.id, "bob");
            assert_eq!(online.len(), 2);
        }
        other => panic!("expected presence:online, got {other:?}"),
    }
}

#[tokio::test]
async fn typing_flows_to_others_and_clears_on_send() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (conn_a, mut rx_a) = connect(&state, &alice);
    let (conn_b, mut rx_b) = connect(&state, &bob);
    join(&state, conn_a, &alice, room_id).await;
    join(&state, conn_b, &bob, room_id).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // bob observes alice typing; alice gets no echo of her own indicator
    dispatch::handle(&state, conn_a, &alice, ClientEvent::TypingStart { room_id })
        .await
        .unwrap();
    match next(&mut rx_b) {
        ServerEvent::TypingChanged { typing, .. } => {
            assert_eq!(typing.len(), 1);
            assert_eq!(typing[0].id, "alice");
        }
        other => panic!("expected typing:changed, got {other:?}"),
    }
    assert!(rx_a.try_recv().is_err());

    // sending delivers the message and implicitly stops the typing indicator
    dispatch::handle(
        &state,
        conn_a,
        &alice,
        ClientEvent::SendMessage { room_id, draft: MessageDraft::text("hello") },
    )
    .await
    .unwrap();

    assert!(matches!(
        next(&mut rx_b),
        ServerEvent::MessageNew { message } if message.content.as_deref() == Some("hello")
    ));
    assert!(matches!(
        next(&mut rx_b),
        ServerEvent::TypingChanged { typing, .. } if typing.is_empty()
    ));

    // the sender's own connection receives the message echo but no typing event
    assert!(matches!(next(&mut rx_a), ServerEvent::MessageNew { .. }));
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn rejected_operations_broadcast_nothing() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (conn_a, mut rx_a) = connect(&state, &alice);
    let (conn_b, mut rx_b) = connect(&state, &bob);
    join(&state, conn_a, &alice, room_id).await;
    join(&state, conn_b, &bob, room_id).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    let err = dispatch::handle(
        &state,
        conn_b,
        &bob,
        ClientEvent::SendMessage { room_id, draft: MessageDraft::text("   ") },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ChatError::EmptyContent));
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_keeps_presence_until_the_last_device_drops() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (tab1, mut rx_tab1) = connect(&state, &alice);
    let (tab2, mut rx_tab2) = connect(&state, &alice);
    let (conn_b, mut rx_b) = connect(&state, &bob);
    join(&state, tab1, &alice, room_id).await;
    join(&state, tab2, &alice, room_id).await;
    join(&state, conn_b, &bob, room_id).await;
    drain(&mut rx_tab1);
    drain(&mut rx_tab2);
    drain(&mut rx_b);

    // first tab closes; alice is still online through the second one
    dispatch::disconnect(&state, tab1, &alice);
    match next(&mut rx_b) {
        ServerEvent::PresenceOffline { online, .. } => {
            assert!(online.iter().any(|i| i.id == "alice"));
        }
        other => panic!("expected presence:offline, got {other:?}"),
    }

    dispatch::disconnect(&state, tab2, &alice);
    match next(&mut rx_b) {
        ServerEvent::PresenceOffline { online, .. } => {
            assert!(online.iter().all(|i| i.id != "alice"));
        }
        other => panic!("expected presence:offline, got {other:?}"),
    }

    let online = state.registry.online_members_of(room_id);
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].id, "bob");
}

#[tokio::test]
async fn disconnect_expires_typing_state() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (conn_a, mut rx_a) = connect(&state, &alice);
    let (conn_b, mut rx_b) = connect(&state, &bob);
    join(&state, conn_a, &alice, room_id).await;
    join(&state, conn_b, &bob, room_id).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    dispatch::handle(&state, conn_a, &alice, ClientEvent::TypingStart { room_id })
        .await
        .unwrap();
    drain(&mut rx_b);

    dispatch::disconnect(&state, conn_a, &alice);

    assert!(matches!(next(&mut rx_b), ServerEvent::PresenceOffline { .. }));
    assert!(matches!(
        next(&mut rx_b),
        ServerEvent::TypingChanged { typing, .. } if typing.is_empty()
    ));
}

#[tokio::test]
async fn leaving_a_room_stops_delivery() {
    let state = test_state().await;
    let alice = identity("alice");
    let bob = identity("bob");
    let room_id = make_room(&state, &alice).await;

    let (conn_a, mut rx_a) = connect(&state, &alice);
    let (conn_b, mut rx_b) = connect(&state, &bob);
    join(&state, conn_a, &alice, room_id).await;
    join(&state, conn_b, &bob, room_id).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    dispatch::handle(&state, conn_b, &bob, ClientEvent::LeaveRoom { room_id })
        .await
        .unwrap();
    assert!(matches!(
        next(&mut rx_a),
        ServerEvent::MemberLeft { member, .. } if member.id == "bob"
    ));
    drain(&mut rx_b);

    dispatch::handle(
        &state,
        conn_a,
        &alice,
        ClientEvent::SendMessage { room_id, draft: MessageDraft::text("anyone?") },
    )
    .await
    .unwrap();
    assert!(matches!(next(&mut rx_a), ServerEvent::MessageNew { .. }));
    assert!(rx_b.try_recv().is_err());
}
