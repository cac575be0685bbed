use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    routes::models::{ProfileResponse, UpdateProfileRequest, UsersResponse},
    services::profile as profile_service,
    util::{require_bearer, Page},
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Matched against name, headline, department and skills.
    pub q: Option<String>,
    pub department: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/profiles/me",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Own profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_own_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let profile = profile_service::get_profile(state.db_pool(), user.id, user.id).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    patch,
    path = "/api/profiles/me",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid profile field", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_own_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let profile = profile_service::update_profile(state.db_pool(), user.id, payload).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    get,
    path = "/api/profiles/search",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching users ordered by name", body = UsersResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_profiles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;

    let users = profile_service::search(
        state.db_pool(),
        query.q.as_deref(),
        query.department.as_deref(),
        Page::new(query.limit, query.offset),
    )
    .await?;
    Ok(Json(UsersResponse { users }))
}

#[utoipa::path(
    get,
    path = "/api/profiles/{user_id}",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    params(("user_id" = String, Path, description = "User public id")),
    responses(
        (status = 200, description = "Profile with the viewer's connection status", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let profile =
        profile_service::get_profile_by_public_id(state.db_pool(), user.id, &user_id).await?;
    Ok(Json(profile))
}
