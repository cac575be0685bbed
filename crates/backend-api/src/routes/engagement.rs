use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        CommentRequest, CommentResponse, CommentsResponse, LikeResponse, PageQuery, ShareRequest,
        ShareResponse, SharesResponse, UsersResponse,
    },
    services::engagement as engagement_service,
    util::require_bearer,
    ApiError, AppState,
};

#[utoipa::path(
    post,
    path = "/api/posts/{post_id}/like",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    responses(
        (status = 200, description = "Post liked (idempotent)", body = LikeResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LikeResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let like =
        engagement_service::like(state.db_pool(), state.notifier(), &user, &post_id).await?;
    Ok(Json(like))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{post_id}/like",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    responses(
        (status = 200, description = "Like removed (idempotent)", body = LikeResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn unlike_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LikeResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let like = engagement_service::unlike(state.db_pool(), &user, &post_id).await?;
    Ok(Json(like))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}/likes",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id"), PageQuery),
    responses(
        (status = 200, description = "Users who liked the post, most recent first", body = UsersResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_likes(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let users =
        engagement_service::likers(state.db_pool(), user.id, &post_id, query.page()).await?;
    Ok(Json(UsersResponse { users }))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}/comments",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id"), PageQuery),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentsResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let comments =
        engagement_service::list_comments(state.db_pool(), user.id, &post_id, query.page())
            .await?;
    Ok(Json(CommentsResponse { comments }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{post_id}/comments",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Invalid comment", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let comment = engagement_service::create_comment(
        state.db_pool(),
        state.notifier(),
        &user,
        &post_id,
        &payload.content,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    patch,
    path = "/api/comments/{comment_id}",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("comment_id" = String, Path, description = "Comment public id")),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Comment edited", body = CommentResponse),
        (status = 403, description = "Not the author", body = crate::error::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let comment =
        engagement_service::update_comment(state.db_pool(), &user, &comment_id, &payload.content)
            .await?;
    Ok(Json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{comment_id}",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("comment_id" = String, Path, description = "Comment public id")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Not allowed to delete", body = crate::error::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    engagement_service::delete_comment(state.db_pool(), &user, &comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}/shares",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id"), PageQuery),
    responses(
        (status = 200, description = "Shares, most recent first", body = SharesResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_shares(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<SharesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let shares =
        engagement_service::list_shares(state.db_pool(), user.id, &post_id, query.page()).await?;
    Ok(Json(SharesResponse { shares }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{post_id}/shares",
    tag = "Engagement",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    request_body = ShareRequest,
    responses(
        (status = 201, description = "Post shared", body = ShareResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn share_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    payload: Option<Json<ShareRequest>>,
) -> Result<(StatusCode, Json<ShareResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let Json(payload) = payload.unwrap_or_default();
    let share = engagement_service::share_post(
        state.db_pool(),
        state.notifier(),
        &user,
        &post_id,
        payload.commentary.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(share)))
}
