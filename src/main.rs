use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use huddle::events::ServerEvent;
use huddle::identity::{
    HttpIdentityProvider, HttpRoomAuthorizer, IdentityProvider, RoomAuthorizer,
    StaticRoomAuthorizer,
};
use huddle::{AppState, db, gateway, rooms};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db_pool = db::connect(&dotenv::var("DATABASE_URL")?).await?;
    db::init(&db_pool).await?;

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(dotenv::var("IDENTITY_URL")?));
    let authorizer: Arc<dyn RoomAuthorizer> = match dotenv::var("AUTHZ_URL") {
        Ok(url) => Arc::new(HttpRoomAuthorizer::new(url)),
        // without an authorization service, non-public rooms stay closed
        Err(_) => Arc::new(StaticRoomAuthorizer { allow_join: false, allow_pin: false }),
    };
    let app_state = AppState::new(db_pool, identity, authorizer);

    // typing indicators decay even when no further client traffic arrives
    let sweeper = app_state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            for (room_id, who) in sweeper.typing.sweep() {
                let typing = sweeper.typing.typists_of(room_id);
                sweeper.broker.broadcast(
                    room_id,
                    ServerEvent::TypingChanged { room_id, typing },
                    Some(&who.id),
                );
            }
        }
    });

    let app = Router::new()
        .nest("/rooms", rooms::router())
        .merge(gateway::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "chat core listening");
    axum::serve(listener, app).await?;
    Ok(())
}
