mod error;
mod state;
mod util;

pub mod docs;
pub mod realtime;
pub mod routes;
pub mod services;

pub use error::ApiError;
pub use realtime::RealtimeHub;
pub use state::AppState;

use std::time::Instant;

use axum::{
    extract::Request,
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use campusnet_database::elapsed_millis;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth routes
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/logout-all", post(routes::auth::logout_all))
        .route("/api/auth/me", get(routes::auth::me))
        .route(
            "/api/auth/change-password",
            post(routes::auth::change_password),
        )
        .route("/api/auth/account", delete(routes::auth::delete_account))
        // Profile routes
        .route(
            "/api/profiles/me",
            get(routes::profiles::get_own_profile).patch(routes::profiles::update_own_profile),
        )
        .route(
            "/api/profiles/search",
            get(routes::profiles::search_profiles),
        )
        .route("/api/profiles/:user_id", get(routes::profiles::get_profile))
        // Feed routes
        .route("/api/posts", post(routes::posts::create_post))
        .route("/api/posts/feed", get(routes::posts::feed))
        .route(
            "/api/posts/:post_id",
            get(routes::posts::get_post)
                .patch(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route("/api/users/:user_id/posts", get(routes::posts::user_posts))
        // Engagement routes
        .route(
            "/api/posts/:post_id/like",
            post(routes::engagement::like_post).delete(routes::engagement::unlike_post),
        )
        .route(
            "/api/posts/:post_id/likes",
            get(routes::engagement::list_likes),
        )
        .route(
            "/api/posts/:post_id/comments",
            get(routes::engagement::list_comments).post(routes::engagement::create_comment),
        )
        .route(
            "/api/comments/:comment_id",
            patch(routes::engagement::update_comment).delete(routes::engagement::delete_comment),
        )
        .route(
            "/api/posts/:post_id/shares",
            get(routes::engagement::list_shares).post(routes::engagement::share_post),
        )
        // Network routes
        .route(
            "/api/connections",
            get(routes::connections::list_connections),
        )
        .route(
            "/api/connections/incoming",
            get(routes::connections::list_incoming),
        )
        .route(
            "/api/connections/outgoing",
            get(routes::connections::list_outgoing),
        )
        .route(
            "/api/connections/suggestions",
            get(routes::connections::suggestions),
        )
        .route(
            "/api/connections/status/:user_id",
            get(routes::connections::connection_status),
        )
        .route(
            "/api/connections/requests/:user_id",
            post(routes::connections::send_request),
        )
        .route(
            "/api/connections/:connection_id",
            delete(routes::connections::remove_connection),
        )
        .route(
            "/api/connections/:connection_id/accept",
            post(routes::connections::accept_request),
        )
        .route(
            "/api/connections/:connection_id/decline",
            post(routes::connections::decline_request),
        )
        .route(
            "/api/connections/:connection_id/cancel",
            post(routes::connections::cancel_request),
        )
        .route(
            "/api/users/:user_id/connections",
            get(routes::connections::list_user_connections),
        )
        // Messaging routes
        .route(
            "/api/conversations",
            get(routes::messages::list_conversations).post(routes::messages::open_conversation),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            get(routes::messages::list_messages).post(routes::messages::send_message),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            post(routes::messages::mark_read),
        )
        .route(
            "/api/messages/unread-count",
            get(routes::messages::unread_count),
        )
        .route(
            "/api/messages/:message_id",
            delete(routes::messages::delete_message),
        )
        // Notification routes
        .route(
            "/api/notifications",
            get(routes::notifications::get_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::get_unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:notification_id",
            patch(routes::notifications::mark_notification_read)
                .delete(routes::notifications::delete_notification),
        )
        // News routes
        .route("/api/news", get(routes::news::list_news))
        .route("/api/news/sources", get(routes::news::list_sources))
        .route("/api/news/scrape", post(routes::news::scrape_news))
        .route("/api/news/:news_id", get(routes::news::get_news))
        // Advisor routes
        .route(
            "/api/advisor/sessions",
            get(routes::advisor::list_sessions).post(routes::advisor::create_session),
        )
        .route(
            "/api/advisor/sessions/:session_id",
            get(routes::advisor::get_session)
                .patch(routes::advisor::rename_session)
                .delete(routes::advisor::delete_session),
        )
        .route(
            "/api/advisor/sessions/:session_id/messages",
            post(routes::advisor::send_message),
        )
        // Realtime routes
        .route("/api/presence", get(routes::websocket::presence))
        .route("/ws", get(routes::websocket::websocket_handler))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .layer(middleware::from_fn(log_request))
        .layer(cors_layer())
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        duration_ms = elapsed_millis(started.elapsed()),
        "request handled"
    );
    response
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
