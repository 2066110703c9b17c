use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::rooms::RoomKind;

/// Externally-issued user reference. The chat core stores and forwards these,
/// it never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> ChatResult<Identity>;
}

#[async_trait]
pub trait RoomAuthorizer: Send + Sync {
    /// Whether `identity_id` may join a non-public room (e.g. holds an invite).
    async fn may_join(&self, identity_id: &str, room_id: Uuid, kind: RoomKind) -> ChatResult<bool>;
    /// Whether `identity_id` may pin/unpin messages in the room.
    async fn may_pin(&self, identity_id: &str, room_id: Uuid) -> ChatResult<bool>;
}

trait GetField {
    fn get_str_field(&self, field: &str) -> Option<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> Option<String> {
        self.get(field)?.as_str().map(str::to_owned)
    }
}

/// Resolves tokens against the platform's user service.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    userinfo_url: String,
}

impl HttpIdentityProvider {
    pub fn new(userinfo_url: String) -> Self {
        Self { client: reqwest::Client::new(), userinfo_url }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> ChatResult<Identity> {
        let resp = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|_| ChatError::Unauthenticated)?;
        if !resp.status().is_success() {
            return Err(ChatError::Unauthenticated);
        }
        let body: Value = resp.json().await.map_err(|_| ChatError::Unauthenticated)?;

        let id = body.get_str_field("id").ok_or(ChatError::Unauthenticated)?;
        let display_name = body
            .get_str_field("name")
            .unwrap_or_else(|| "Nameless User".to_owned());
        Ok(Identity { id, display_name, avatar: body.get_str_field("avatar") })
    }
}

/// Asks the platform's authorization service whether an action is allowed.
pub struct HttpRoomAuthorizer {
    client: reqwest::Client,
    check_url: String,
}

impl HttpRoomAuthorizer {
    pub fn new(check_url: String) -> Self {
        Self { client: reqwest::Client::new(), check_url }
    }

    async fn check(&self, identity_id: &str, room_id: Uuid, action: &str) -> ChatResult<bool> {
        let resp = self
            .client
            .post(&self.check_url)
            .json(&serde_json::json!({
                "identity_id": identity_id,
                "room_id": room_id,
                "action": action,
            }))
            .send()
            .await
            .map_err(|_| ChatError::NotAuthorized)?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: Value = resp.json().await.map_err(|_| ChatError::NotAuthorized)?;
        Ok(body.get("allowed").and_then(Value::as_bool).unwrap_or(false))
    }
}

#[async_trait]
impl RoomAuthorizer for HttpRoomAuthorizer {
    async fn may_join(&self, identity_id: &str, room_id: Uuid, _kind: RoomKind) -> ChatResult<bool> {
        self.check(identity_id, room_id, "join").await
    }

    async fn may_pin(&self, identity_id: &str, room_id: Uuid) -> ChatResult<bool> {
        self.check(identity_id, room_id, "pin").await
    }
}

/// Fixed token table, for tests and local development.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, identity: Identity) -> Self {
        self.tokens.insert(token.to_owned(), identity);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> ChatResult<Identity> {
        self.tokens.get(token).cloned().ok_or(ChatError::Unauthenticated)
    }
}

/// Blanket yes/no policy, for tests and local development.
pub struct StaticRoomAuthorizer {
    pub allow_join: bool,
    pub allow_pin: bool,
}

#[async_trait]
impl RoomAuthorizer for StaticRoomAuthorizer {
    async fn may_join(&self, _identity_id: &str, _room_id: Uuid, _kind: RoomKind) -> ChatResult<bool> {
        Ok(self.allow_join)
    }

    async fn may_pin(&self, _identity_id: &str, _room_id: Uuid) -> ChatResult<bool> {
        Ok(self.allow_pin)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> ChatResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ChatError::Unauthenticated)
}
