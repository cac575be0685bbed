use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    routes::models::{NewsItemResponse, NewsListResponse, NewsSourcesResponse, ScrapeReportResponse},
    services::news as news_service,
    util::{require_bearer, Page},
    ApiError, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NewsQuery {
    /// Source name, case-insensitive.
    pub source: Option<String>,
    pub category: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/news",
    tag = "News",
    security(("bearerAuth" = [])),
    params(NewsQuery),
    responses(
        (status = 200, description = "News, newest published first", body = NewsListResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_news(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NewsQuery>,
) -> Result<Json<NewsListResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;

    let news = news_service::list_news(
        state.db_pool(),
        query.source.as_deref(),
        query.category.as_deref(),
        Page::new(query.limit, query.offset),
    )
    .await?;
    Ok(Json(NewsListResponse { news }))
}

#[utoipa::path(
    get,
    path = "/api/news/sources",
    tag = "News",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Configured and previously scraped sources with item counts", body = NewsSourcesResponse)
    )
)]
pub async fn list_sources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NewsSourcesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;
    let sources = news_service::list_sources(state.db_pool(), state.news()).await?;
    Ok(Json(NewsSourcesResponse { sources }))
}

#[utoipa::path(
    get,
    path = "/api/news/{news_id}",
    tag = "News",
    security(("bearerAuth" = [])),
    params(("news_id" = String, Path, description = "News item public id")),
    responses(
        (status = 200, description = "News item", body = NewsItemResponse),
        (status = 404, description = "News item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_news(
    State(state): State<AppState>,
    Path(news_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<NewsItemResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;
    Ok(Json(news_service::get_news(state.db_pool(), &news_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/news/scrape",
    tag = "News",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Scrape finished; per-source results", body = ScrapeReportResponse),
        (status = 403, description = "Admins only", body = crate::error::ErrorResponse)
    )
)]
pub async fn scrape_news(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ScrapeReportResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    if !user.role.is_admin() {
        return Err(ApiError::forbidden("only admins can trigger a scrape"));
    }

    Ok(Json(news_service::scrape_now(state.news()).await))
}
