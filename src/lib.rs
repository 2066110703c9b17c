pub mod broker;
pub mod db;
pub mod error;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod messages;
pub mod presence;
pub mod rooms;
pub mod typing;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use broker::DeliveryBroker;
use identity::{IdentityProvider, RoomAuthorizer};
use presence::PresenceRegistry;
use typing::TypingCoordinator;

pub use error::{ChatError, ChatResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: Arc<PresenceRegistry>,
    pub typing: Arc<TypingCoordinator>,
    pub broker: Arc<DeliveryBroker>,
    pub identity: Arc<dyn IdentityProvider>,
    pub authorizer: Arc<dyn RoomAuthorizer>,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        authorizer: Arc<dyn RoomAuthorizer>,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let broker = Arc::new(DeliveryBroker::new(registry.clone()));
        Self {
            db_pool,
            registry,
            typing: Arc::new(TypingCoordinator::new()),
            broker,
            identity,
            authorizer,
        }
    }
}
