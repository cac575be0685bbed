use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS,
            ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, CONTENT_TYPE, ORIGIN,
        },
        Method, Request, StatusCode,
    },
    response::IntoResponse,
    Router,
};
use campusnet_advisor::AdvisorClient;
use campusnet_api::{build_router, ApiError, AppState};
use campusnet_auth::Authenticator;
use campusnet_config::AppConfig;
use campusnet_database::initialize_database;
use campusnet_news::NewsScraper;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

type TestResult<T = ()> = anyhow::Result<T>;

const PASSWORD: &str = "correct horse battery";

struct TestContext {
    _temp_dir: TempDir,
    pool: SqlitePool,
    state: AppState,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_config(AppConfig::default()).await
    }

    async fn with_config(mut config: AppConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        config.database.url = format!(
            "sqlite://{}",
            temp_dir.path().join("campusnet.sqlite").display()
        );
        let pool = initialize_database(&config.database).await?;

        let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
        let advisor = Arc::new(AdvisorClient::new(&config.advisor)?);
        let news = NewsScraper::new(pool.clone(), &config.news)?;
        let state = AppState::new(
            pool.clone(),
            authenticator,
            advisor,
            news,
            config.notifications.retention_days,
        );

        Ok(Self {
            _temp_dir: temp_dir,
            pool,
            state,
        })
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResult<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, payload))
    }

    /// Registers an account and returns `(token, public id)`.
    async fn register(&self, email: &str, full_name: &str) -> TestResult<(String, String)> {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "full_name": full_name })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        Ok((
            body["token"].as_str().unwrap_or_default().to_owned(),
            body["user"]["id"].as_str().unwrap_or_default().to_owned(),
        ))
    }

    async fn connect(&self, from: &str, to_token: &str, to_id: &str) -> TestResult<()> {
        let (status, request) = self
            .send(
                Method::POST,
                &format!("/api/connections/requests/{to_id}"),
                Some(from),
                Some(json!({ "note": "Hi!" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "request failed: {request}");

        let connection_id = request["id"].as_str().unwrap_or_default();
        let (status, accepted) = self
            .send(
                Method::POST,
                &format!("/api/connections/{connection_id}/accept"),
                Some(to_token),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "accept failed: {accepted}");
        Ok(())
    }

    /// Polls the notification list until it holds `expected` entries.
    async fn wait_for_notifications(&self, token: &str, expected: usize) -> TestResult<Value> {
        let mut last = Value::Null;
        for _ in 0..50 {
            let (_, body) = self
                .send(Method::GET, "/api/notifications", Some(token), None)
                .await?;
            let count = body["notifications"].as_array().map_or(0, Vec::len);
            last = body;
            if count >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(last)
    }
}

mod router_tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_ok() -> TestResult {
        let ctx = TestContext::new().await?;
        let (status, body) = ctx.send(Method::GET, "/health", None, None).await?;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() -> TestResult {
        let ctx = TestContext::new().await?;
        let response = ctx
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await?.to_bytes();
        let document: Value = serde_json::from_slice(&body)?;
        assert!(document["paths"]["/api/posts/feed"].is_object());
        assert!(document["paths"]["/api/advisor/sessions/{session_id}/messages"].is_object());
        assert!(document["components"]["securitySchemes"]["bearerAuth"].is_object());
        Ok(())
    }

    #[tokio::test]
    async fn cors_layer_allows_configured_methods_and_headers() -> TestResult {
        let ctx = TestContext::new().await?;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/posts/feed")
            .header(ORIGIN, "https://campus.example.edu")
            .header(ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
            .header(ACCESS_CONTROL_REQUEST_HEADERS, "authorization, content-type")
            .body(Body::empty())?;

        let response = ctx.router().oneshot(request).await?;
        assert!(matches!(
            response.status(),
            StatusCode::NO_CONTENT | StatusCode::OK
        ));

        let header = |name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_ascii_lowercase()
        };
        assert_eq!(header(ACCESS_CONTROL_ALLOW_ORIGIN), "*");
        assert!(header(ACCESS_CONTROL_ALLOW_METHODS).contains("patch"));
        assert!(header(ACCESS_CONTROL_ALLOW_HEADERS).contains("authorization"));
        Ok(())
    }

    #[tokio::test]
    async fn api_error_renders_json_body() -> TestResult {
        let response = ApiError::conflict("already connected").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await?.to_bytes();
        let payload: Value = serde_json::from_slice(&body)?;
        assert_eq!(payload, json!({ "error": "already connected" }));
        Ok(())
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn register_login_and_logout() -> TestResult {
        let ctx = TestContext::new().await?;
        let (token, user_id) = ctx.register("Ada@Campus.edu", "Ada Lovelace").await?;

        let (status, me) = ctx.send(Method::GET, "/api/auth/me", Some(&token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["email"], "ada@campus.edu");
        assert_eq!(me["user"]["role"], "student");
        assert_eq!(me["profile"]["user"]["id"], user_id.as_str());

        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": "ada@campus.edu", "password": PASSWORD, "full_name": "Ada" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = ctx
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@campus.edu", "password": "wrong password" })),
            )
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, login) = ctx
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ada@campus.edu", "password": PASSWORD })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        let second = login["token"].as_str().unwrap_or_default().to_owned();

        let (status, _) = ctx
            .send(Method::POST, "/api/auth/logout", Some(&second), None)
            .await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = ctx.send(Method::GET, "/api/auth/me", Some(&second), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = ctx.send(Method::GET, "/api/auth/me", Some(&token), None).await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() -> TestResult {
        let ctx = TestContext::new().await?;
        for uri in ["/api/posts/feed", "/api/notifications", "/api/presence", "/ws"] {
            let (status, body) = ctx.send(Method::GET, uri, None, None).await?;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }

        let (status, _) = ctx
            .send(Method::GET, "/api/posts/feed", Some("not-a-session"), None)
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn admin_role_cannot_be_self_assigned() -> TestResult {
        let ctx = TestContext::new().await?;
        let (status, _) = ctx
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": "mallory@campus.edu",
                    "password": PASSWORD,
                    "full_name": "Mallory",
                    "role": "admin"
                })),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }
}

mod social_tests {
    use super::*;

    #[tokio::test]
    async fn connections_only_posts_follow_the_network() -> TestResult {
        let ctx = TestContext::new().await?;
        let (alice, _) = ctx.register("alice@campus.edu", "Alice").await?;
        let (bob, bob_id) = ctx.register("bob@campus.edu", "Bob").await?;

        let (status, post) = ctx
            .send(
                Method::POST,
                "/api/posts",
                Some(&alice),
                Some(json!({ "content": "Lab results are in", "visibility": "connections" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        let post_uri = format!("/api/posts/{}", post["id"].as_str().unwrap_or_default());

        let (status, _) = ctx.send(Method::GET, &post_uri, Some(&bob), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, feed) = ctx.send(Method::GET, "/api/posts/feed", Some(&bob), None).await?;
        assert_eq!(feed["posts"].as_array().map_or(0, Vec::len), 0);

        ctx.connect(&alice, &bob, &bob_id).await?;

        let (status, seen) = ctx.send(Method::GET, &post_uri, Some(&bob), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(seen["author"]["full_name"], "Alice");
        let (_, feed) = ctx.send(Method::GET, "/api/posts/feed", Some(&bob), None).await?;
        assert_eq!(feed["posts"].as_array().map_or(0, Vec::len), 1);
        Ok(())
    }

    #[tokio::test]
    async fn engagement_notifies_the_author_once() -> TestResult {
        let ctx = TestContext::new().await?;
        let (alice, _) = ctx.register("alice@campus.edu", "Alice").await?;
        let (bob, _) = ctx.register("bob@campus.edu", "Bob").await?;

        let (_, post) = ctx
            .send(
                Method::POST,
                "/api/posts",
                Some(&alice),
                Some(json!({ "content": "Hiring research assistants" })),
            )
            .await?;
        let post_id = post["id"].as_str().unwrap_or_default().to_owned();

        for _ in 0..2 {
            let (status, like) = ctx
                .send(Method::POST, &format!("/api/posts/{post_id}/like"), Some(&bob), None)
                .await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(like["like_count"], 1);
        }
        let (status, _) = ctx
            .send(
                Method::POST,
                &format!("/api/posts/{post_id}/comments"),
                Some(&bob),
                Some(json!({ "content": "Interested!" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        ctx.send(Method::POST, &format!("/api/posts/{post_id}/like"), Some(&alice), None)
            .await?;

        let listing = ctx.wait_for_notifications(&alice, 2).await?;
        let kinds: Vec<_> = listing["notifications"]
            .as_array()
            .map(|items| items.iter().map(|n| n["kind"].clone()).collect())
            .unwrap_or_default();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&json!("post_liked")));
        assert!(kinds.contains(&json!("post_commented")));

        let (_, unread) = ctx
            .send(Method::GET, "/api/notifications/unread-count", Some(&alice), None)
            .await?;
        assert_eq!(unread["count"], 2);
        let (_, updated) = ctx
            .send(Method::POST, "/api/notifications/read-all", Some(&alice), None)
            .await?;
        assert_eq!(updated["updated"], 2);

        let (_, seen) = ctx
            .send(Method::GET, &format!("/api/posts/{post_id}"), Some(&alice), None)
            .await?;
        assert_eq!(seen["like_count"], 2);
        assert_eq!(seen["comment_count"], 1);
        assert_eq!(seen["liked_by_me"], true);
        Ok(())
    }

    #[tokio::test]
    async fn direct_messages_track_unread_state() -> TestResult {
        let ctx = TestContext::new().await?;
        let (alice, _) = ctx.register("alice@campus.edu", "Alice").await?;
        let (bob, bob_id) = ctx.register("bob@campus.edu", "Bob").await?;

        let (status, conversation) = ctx
            .send(
                Method::POST,
                "/api/conversations",
                Some(&alice),
                Some(json!({ "user_id": bob_id })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        let conversation_id = conversation["id"].as_str().unwrap_or_default().to_owned();
        let messages_uri = format!("/api/conversations/{conversation_id}/messages");

        let (status, _) = ctx
            .send(
                Method::POST,
                &messages_uri,
                Some(&alice),
                Some(json!({ "content": "Coffee after the seminar?" })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);

        let (_, unread) = ctx
            .send(Method::GET, "/api/messages/unread-count", Some(&bob), None)
            .await?;
        assert_eq!(unread["count"], 1);

        let (_, listing) = ctx
            .send(Method::GET, "/api/conversations", Some(&bob), None)
            .await?;
        assert_eq!(listing["conversations"][0]["participant"]["full_name"], "Alice");
        assert_eq!(listing["conversations"][0]["unread_count"], 1);

        let (status, read) = ctx
            .send(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/read"),
                Some(&bob),
                None,
            )
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["updated"], 1);

        let (_, unread) = ctx
            .send(Method::GET, "/api/messages/unread-count", Some(&bob), None)
            .await?;
        assert_eq!(unread["count"], 0);

        let notifications = ctx.wait_for_notifications(&bob, 1).await?;
        assert_eq!(notifications["notifications"][0]["kind"], "message_received");
        Ok(())
    }

    #[tokio::test]
    async fn account_deletion_removes_everything_the_user_touched() -> TestResult {
        let ctx = TestContext::new().await?;
        let (alice, alice_id) = ctx.register("alice@campus.edu", "Alice").await?;
        let (bob, bob_id) = ctx.register("bob@campus.edu", "Bob").await?;
        ctx.connect(&alice, &bob, &bob_id).await?;

        let (_, post) = ctx
            .send(
                Method::POST,
                "/api/posts",
                Some(&alice),
                Some(json!({ "content": "Graduating next week!" })),
            )
            .await?;
        let post_id = post["id"].as_str().unwrap_or_default().to_owned();
        ctx.send(
            Method::POST,
            &format!("/api/posts/{post_id}/comments"),
            Some(&bob),
            Some(json!({ "content": "Congrats!" })),
        )
        .await?;
        let (_, conversation) = ctx
            .send(
                Method::POST,
                "/api/conversations",
                Some(&bob),
                Some(json!({ "user_id": alice_id })),
            )
            .await?;
        ctx.send(
            Method::POST,
            &format!(
                "/api/conversations/{}/messages",
                conversation["id"].as_str().unwrap_or_default()
            ),
            Some(&bob),
            Some(json!({ "content": "See you there" })),
        )
        .await?;
        // Bob holds the connection request notification from Alice.
        ctx.wait_for_notifications(&bob, 1).await?;

        let (status, _) = ctx
            .send(
                Method::DELETE,
                "/api/auth/account",
                Some(&alice),
                Some(json!({ "password": "wrong password" })),
            )
            .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = ctx
            .send(
                Method::DELETE,
                "/api/auth/account",
                Some(&alice),
                Some(json!({ "password": PASSWORD })),
            )
            .await?;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = ctx.send(Method::GET, "/api/auth/me", Some(&alice), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = ctx
            .send(Method::GET, &format!("/api/profiles/{alice_id}"), Some(&bob), None)
            .await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, feed) = ctx.send(Method::GET, "/api/posts/feed", Some(&bob), None).await?;
        assert_eq!(feed["posts"].as_array().map_or(1, Vec::len), 0);
        let (_, conversations) = ctx
            .send(Method::GET, "/api/conversations", Some(&bob), None)
            .await?;
        assert_eq!(conversations["conversations"].as_array().map_or(1, Vec::len), 0);
        let (_, connections) = ctx
            .send(Method::GET, "/api/connections", Some(&bob), None)
            .await?;
        assert_eq!(connections["connections"].as_array().map_or(1, Vec::len), 0);
        let (_, notifications) = ctx
            .send(Method::GET, "/api/notifications", Some(&bob), None)
            .await?;
        assert_eq!(notifications["notifications"].as_array().map_or(1, Vec::len), 0);

        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_comments")
            .fetch_one(&ctx.pool)
            .await?;
        assert_eq!(comments, 0);
        Ok(())
    }
}

mod news_and_advisor_tests {
    use super::*;

    #[tokio::test]
    async fn news_listing_and_admin_only_scrape() -> TestResult {
        let ctx = TestContext::new().await?;
        let (token, _) = ctx.register("alice@campus.edu", "Alice").await?;

        sqlx::query(
            "INSERT INTO news (public_id, source, category, title, link, scraped_at) VALUES ('n1', 'Campus Daily', 'campus', 'Library extends hours', 'https://news.example.edu/library', '2025-05-01T00:00:00.000Z')",
        )
        .execute(&ctx.pool)
        .await?;

        let (status, listing) = ctx
            .send(Method::GET, "/api/news?source=campus%20daily", Some(&token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["news"][0]["title"], "Library extends hours");

        let (status, item) = ctx.send(Method::GET, "/api/news/n1", Some(&token), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["link"], "https://news.example.edu/library");

        let (status, sources) = ctx
            .send(Method::GET, "/api/news/sources", Some(&token), None)
            .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sources["sources"][0]["name"], "Campus Daily");
        assert_eq!(sources["sources"][0]["item_count"], 1);

        let (status, _) = ctx
            .send(Method::POST, "/api/news/scrape", Some(&token), None)
            .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn advisor_without_api_key_is_unavailable() -> TestResult {
        let ctx = TestContext::new().await?;
        let (token, _) = ctx.register("alice@campus.edu", "Alice").await?;

        let (status, session) = ctx
            .send(Method::POST, "/api/advisor/sessions", Some(&token), None)
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["title"], "New conversation");
        let session_uri = format!(
            "/api/advisor/sessions/{}",
            session["id"].as_str().unwrap_or_default()
        );

        let (status, body) = ctx
            .send(
                Method::POST,
                &format!("{session_uri}/messages"),
                Some(&token),
                Some(json!({ "message": "Which electives suit a data science career?" })),
            )
            .await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());

        let (_, detail) = ctx.send(Method::GET, &session_uri, Some(&token), None).await?;
        assert_eq!(detail["messages"].as_array().map_or(1, Vec::len), 0);
        Ok(())
    }
}
