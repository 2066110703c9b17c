use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid or expired identity token")]
    Unauthenticated,
    #[error("room not found")]
    RoomNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("not authorized for this room")]
    NotAuthorized,
    #[error("not a member of this room")]
    NotAMember,
    #[error("only the sender may do that")]
    NotSender,
    #[error("room is full")]
    RoomFull,
    #[error("room name must be 1-64 characters")]
    InvalidRoomName,
    #[error("member limit must be between 2 and 1000")]
    InvalidMemberLimit,
    #[error("message content is empty")]
    EmptyContent,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ChatError {
    // stable wire code, sent in socket `error` frames
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::RoomNotFound => "room_not_found",
            ChatError::MessageNotFound => "message_not_found",
            ChatError::NotAuthorized => "not_authorized",
            ChatError::NotAMember => "not_a_member",
            ChatError::NotSender => "not_sender",
            ChatError::RoomFull => "room_full",
            ChatError::InvalidRoomName => "invalid_room_name",
            ChatError::InvalidMemberLimit => "invalid_member_limit",
            ChatError::EmptyContent => "empty_content",
            ChatError::Storage(_) => "storage",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ChatError::RoomNotFound | ChatError::MessageNotFound => StatusCode::NOT_FOUND,
            ChatError::NotAuthorized | ChatError::NotAMember | ChatError::NotSender => {
                StatusCode::FORBIDDEN
            }
            ChatError::RoomFull => StatusCode::CONFLICT,
            ChatError::InvalidRoomName
            | ChatError::InvalidMemberLimit
            | ChatError::EmptyContent => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if let ChatError::Storage(err) = &self {
            tracing::error!(%err, "storage failure");
        }
        (self.status(), self.to_string()).into_response()
    }
}
