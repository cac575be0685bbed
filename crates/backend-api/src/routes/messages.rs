use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        ConversationResponse, ConversationsResponse, MarkReadResponse, MessageResponse,
        MessagesResponse, OpenConversationRequest, PageQuery, SendMessageRequest,
        UnreadCountResponse,
    },
    services::messaging as messaging_service,
    util::require_bearer,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Conversations, most recently active first", body = ConversationsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let conversations =
        messaging_service::list_conversations(state.db_pool(), user.id, query.page()).await?;
    Ok(Json(ConversationsResponse { conversations }))
}

#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    request_body = OpenConversationRequest,
    responses(
        (status = 200, description = "The direct conversation with the user, created if needed", body = ConversationResponse),
        (status = 400, description = "Cannot message yourself", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn open_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OpenConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let conversation =
        messaging_service::open_conversation(state.db_pool(), &user, &payload.user_id).await?;
    Ok(Json(conversation))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/messages",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation public id"), PageQuery),
    responses(
        (status = 200, description = "Messages, newest first", body = MessagesResponse),
        (status = 403, description = "Not a participant", body = crate::error::ErrorResponse),
        (status = 404, description = "Conversation not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let messages =
        messaging_service::list_messages(state.db_pool(), user.id, &conversation_id, query.page())
            .await?;
    Ok(Json(MessagesResponse { messages }))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/messages",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation public id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Invalid message", body = crate::error::ErrorResponse),
        (status = 403, description = "Not a participant", body = crate::error::ErrorResponse),
        (status = 404, description = "Conversation not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let message = messaging_service::send_message(
        state.db_pool(),
        state.realtime(),
        state.notifier(),
        &user,
        &conversation_id,
        &payload.content,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/read",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    params(("conversation_id" = String, Path, description = "Conversation public id")),
    responses(
        (status = 200, description = "Incoming messages marked read", body = MarkReadResponse),
        (status = 403, description = "Not a participant", body = crate::error::ErrorResponse),
        (status = 404, description = "Conversation not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let result =
        messaging_service::mark_read(state.db_pool(), state.realtime(), &user, &conversation_id)
            .await?;
    Ok(Json(result))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    params(("message_id" = String, Path, description = "Message public id")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 403, description = "Not the sender", body = crate::error::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    messaging_service::delete_message(state.db_pool(), &user, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/messages/unread-count",
    tag = "Messaging",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Unread messages across all conversations", body = UnreadCountResponse)
    )
)]
pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let count = messaging_service::unread_total(state.db_pool(), user.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}
