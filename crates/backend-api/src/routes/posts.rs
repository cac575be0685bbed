use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        CreatePostRequest, PageQuery, PostResponse, PostsResponse, UpdatePostRequest,
    },
    services::post as post_service,
    util::require_bearer,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/posts/feed",
    tag = "Feed",
    security(("bearerAuth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Posts visible to the caller, newest first", body = PostsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let posts = post_service::feed(state.db_pool(), user.id, query.page()).await?;
    Ok(Json(PostsResponse { posts }))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "Feed",
    security(("bearerAuth" = [])),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Invalid post", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let post = post_service::create_post(state.db_pool(), &user, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[utoipa::path(
    get,
    path = "/api/posts/{post_id}",
    tag = "Feed",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    responses(
        (status = 200, description = "Post", body = PostResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found or not visible", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PostResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let post = post_service::get_post(state.db_pool(), user.id, &post_id).await?;
    Ok(Json(post))
}

#[utoipa::path(
    patch,
    path = "/api/posts/{post_id}",
    tag = "Feed",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 400, description = "Invalid post", body = crate::error::ErrorResponse),
        (status = 403, description = "Not the author", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let post = post_service::update_post(state.db_pool(), &user, &post_id, payload).await?;
    Ok(Json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{post_id}",
    tag = "Feed",
    security(("bearerAuth" = [])),
    params(("post_id" = String, Path, description = "Post public id")),
    responses(
        (status = 204, description = "Post and its engagement deleted"),
        (status = 403, description = "Not the author or an admin", body = crate::error::ErrorResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    post_service::delete_post(state.db_pool(), &user, &post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/posts",
    tag = "Feed",
    security(("bearerAuth" = [])),
    params(
        ("user_id" = String, Path, description = "Author public id"),
        PageQuery
    ),
    responses(
        (status = 200, description = "The user's posts visible to the caller", body = PostsResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let posts = post_service::user_posts(state.db_pool(), user.id, &user_id, query.page()).await?;
    Ok(Json(PostsResponse { posts }))
}
