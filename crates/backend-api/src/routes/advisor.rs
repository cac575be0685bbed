use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        AdvisorMessageRequest, AdvisorReplyResponse, AdvisorSessionDetailResponse,
        AdvisorSessionResponse, AdvisorSessionsResponse, CreateAdvisorSessionRequest, PageQuery,
        RenameAdvisorSessionRequest,
    },
    services::advisor as advisor_service,
    util::require_bearer,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/advisor/sessions",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "The caller's advisor sessions, most recent first", body = AdvisorSessionsResponse)
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<AdvisorSessionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let sessions = advisor_service::list_sessions(state.db_pool(), user.id, query.page()).await?;
    Ok(Json(AdvisorSessionsResponse { sessions }))
}

#[utoipa::path(
    post,
    path = "/api/advisor/sessions",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    request_body = CreateAdvisorSessionRequest,
    responses(
        (status = 201, description = "Session created", body = AdvisorSessionResponse),
        (status = 400, description = "Invalid title", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<CreateAdvisorSessionRequest>>,
) -> Result<(StatusCode, Json<AdvisorSessionResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let Json(payload) = payload.unwrap_or_default();
    let session =
        advisor_service::create_session(state.db_pool(), user.id, payload.title.as_deref())
            .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(
    get,
    path = "/api/advisor/sessions/{session_id}",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    params(("session_id" = String, Path, description = "Advisor session public id")),
    responses(
        (status = 200, description = "Session with its messages", body = AdvisorSessionDetailResponse),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AdvisorSessionDetailResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let session = advisor_service::get_session(state.db_pool(), user.id, &session_id).await?;
    Ok(Json(session))
}

#[utoipa::path(
    patch,
    path = "/api/advisor/sessions/{session_id}",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    params(("session_id" = String, Path, description = "Advisor session public id")),
    request_body = RenameAdvisorSessionRequest,
    responses(
        (status = 200, description = "Session renamed", body = AdvisorSessionResponse),
        (status = 400, description = "Invalid title", body = crate::error::ErrorResponse),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<RenameAdvisorSessionRequest>,
) -> Result<Json<AdvisorSessionResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let session =
        advisor_service::rename_session(state.db_pool(), user.id, &session_id, &payload.title)
            .await?;
    Ok(Json(session))
}

#[utoipa::path(
    delete,
    path = "/api/advisor/sessions/{session_id}",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    params(("session_id" = String, Path, description = "Advisor session public id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    advisor_service::delete_session(state.db_pool(), user.id, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/advisor/sessions/{session_id}/messages",
    tag = "Advisor",
    security(("bearerAuth" = [])),
    params(("session_id" = String, Path, description = "Advisor session public id")),
    request_body = AdvisorMessageRequest,
    responses(
        (status = 200, description = "The advisor's reply", body = AdvisorReplyResponse),
        (status = 400, description = "Invalid message", body = crate::error::ErrorResponse),
        (status = 404, description = "Session not found", body = crate::error::ErrorResponse),
        (status = 502, description = "Advisor upstream failed", body = crate::error::ErrorResponse),
        (status = 503, description = "Advisor is not configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<AdvisorMessageRequest>,
) -> Result<Json<AdvisorReplyResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let reply = advisor_service::send_message(
        state.db_pool(),
        state.advisor(),
        &user,
        &session_id,
        &payload.message,
    )
    .await?;
    Ok(Json(reply))
}
