use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    routes::models::{
        ConnectionDirection, ConnectionRequestBody, ConnectionResponse, ConnectionStatusResponse,
        ConnectionsResponse, PageQuery, SuggestionsResponse,
    },
    services::{self, connection as connection_service},
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SuggestionsQuery {
    /// At most 50 (default 10).
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Accepted connections of the caller", body = ConnectionsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let connections =
        connection_service::list_connections(state.db_pool(), user.id, query.page()).await?;
    Ok(Json(ConnectionsResponse { connections }))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/connections",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public id"), PageQuery),
    responses(
        (status = 200, description = "Accepted connections of the user", body = ConnectionsResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_user_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;
    let user_id = services::resolve_user_id(state.db_pool(), &user_id).await?;
    let connections =
        connection_service::list_connections(state.db_pool(), user_id, query.page()).await?;
    Ok(Json(ConnectionsResponse { connections }))
}

#[utoipa::path(
    get,
    path = "/api/connections/incoming",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Pending requests sent to the caller", body = ConnectionsResponse)
    )
)]
pub async fn list_incoming(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let connections = connection_service::list_pending(
        state.db_pool(),
        user.id,
        ConnectionDirection::Incoming,
        query.page(),
    )
    .await?;
    Ok(Json(ConnectionsResponse { connections }))
}

#[utoipa::path(
    get,
    path = "/api/connections/outgoing",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Pending requests sent by the caller", body = ConnectionsResponse)
    )
)]
pub async fn list_outgoing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let connections = connection_service::list_pending(
        state.db_pool(),
        user.id,
        ConnectionDirection::Outgoing,
        query.page(),
    )
    .await?;
    Ok(Json(ConnectionsResponse { connections }))
}

#[utoipa::path(
    get,
    path = "/api/connections/status/{user_id}",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public id")),
    responses(
        (status = 200, description = "Relationship between the caller and the user", body = ConnectionStatusResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn connection_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConnectionStatusResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let other = services::resolve_user_id(state.db_pool(), &user_id).await?;
    let (status, connection_id) =
        connection_service::status_between(state.db_pool(), user.id, other).await?;
    Ok(Json(ConnectionStatusResponse {
        status,
        connection_id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/connections/suggestions",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(SuggestionsQuery),
    responses(
        (status = 200, description = "People the caller may know", body = SuggestionsResponse)
    )
)]
pub async fn suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let suggestions =
        connection_service::suggestions(state.db_pool(), user.id, query.limit).await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

#[utoipa::path(
    post,
    path = "/api/connections/requests/{user_id}",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "Public id of the user to connect with")),
    request_body = ConnectionRequestBody,
    responses(
        (status = 201, description = "Request sent, or the reverse request accepted", body = ConnectionResponse),
        (status = 400, description = "Cannot connect with yourself", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already connected or requested", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_request(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    payload: Option<Json<ConnectionRequestBody>>,
) -> Result<(StatusCode, Json<ConnectionResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let Json(payload) = payload.unwrap_or_default();
    let connection = connection_service::send_request(
        state.db_pool(),
        state.notifier(),
        &user,
        &user_id,
        payload.note.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

#[utoipa::path(
    post,
    path = "/api/connections/{connection_id}/accept",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("connection_id" = String, Path, description = "Connection public id")),
    responses(
        (status = 200, description = "Request accepted", body = ConnectionResponse),
        (status = 403, description = "Only the recipient may accept", body = crate::error::ErrorResponse),
        (status = 404, description = "Connection not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already accepted", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_request(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let connection =
        connection_service::accept(state.db_pool(), state.notifier(), &user, &connection_id)
            .await?;
    Ok(Json(connection))
}

#[utoipa::path(
    post,
    path = "/api/connections/{connection_id}/decline",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("connection_id" = String, Path, description = "Connection public id")),
    responses(
        (status = 204, description = "Request declined and removed"),
        (status = 403, description = "Only the recipient may decline", body = crate::error::ErrorResponse),
        (status = 404, description = "Connection not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn decline_request(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    connection_service::decline(state.db_pool(), &user, &connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/connections/{connection_id}/cancel",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("connection_id" = String, Path, description = "Connection public id")),
    responses(
        (status = 204, description = "Request withdrawn"),
        (status = 403, description = "Only the requester may cancel", body = crate::error::ErrorResponse),
        (status = 404, description = "Connection not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    connection_service::cancel(state.db_pool(), &user, &connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/connections/{connection_id}",
    tag = "Network",
    security(("bearerAuth" = [])),
    params(("connection_id" = String, Path, description = "Connection public id")),
    responses(
        (status = 204, description = "Connection removed"),
        (status = 400, description = "Connection is still pending", body = crate::error::ErrorResponse),
        (status = 404, description = "Connection not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    connection_service::remove(state.db_pool(), &user, &connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
