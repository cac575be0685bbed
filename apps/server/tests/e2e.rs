use std::sync::Arc;

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use campusnet_api::{build_router, AppState};
use campusnet_config::AppConfig;
use campusnet_database::{purge_expired, RetentionPolicy};
use campusnet_runtime::{BackendServices, BackgroundJobs};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    services: BackendServices,
    _db_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let db_dir = TempDir::new().expect("create temp dir");
        let db_path = db_dir.path().join("campusnet-test.db");

        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", db_path.to_string_lossy());
        config.database.max_connections = 5;
        config.news.sources = Vec::new();
        config.maintenance.purge_interval_seconds = 0;

        let services = BackendServices::initialise(&config)
            .await
            .expect("initialise backend services");

        let state = AppState::new(
            services.db_pool.clone(),
            services.authenticator.clone(),
            Arc::clone(&services.advisor),
            services.news.clone(),
            config.notifications.retention_days,
        );

        Self {
            router: build_router(state),
            services,
            _db_dir: db_dir,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let body = match body {
            Some(json_body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json_body).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("dispatch request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect response body")
            .to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap_or_default();
        let json = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        TestResponse { status, text, json }
    }

    async fn register(&self, email: &str, full_name: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/auth/register",
                Some(json!({
                    "email": email,
                    "password": "a long enough password",
                    "full_name": full_name
                })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        response.json["token"]
            .as_str()
            .expect("session token")
            .to_string()
    }
}

struct TestResponse {
    status: StatusCode,
    text: String,
    json: Value,
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["status"].as_str(), Some("ok"));
}

#[tokio::test]
async fn background_jobs_respect_disabled_schedules() {
    let app = TestApp::new().await;

    let jobs = BackgroundJobs::spawn(&app.services);
    assert!(jobs.is_empty());
    jobs.shutdown().await;
}

#[tokio::test]
async fn profile_edit_and_search_flow() {
    let app = TestApp::new().await;
    let grace = app.register("grace@campus.edu", "Grace Hopper").await;
    let alan = app.register("alan@campus.edu", "Alan Turing").await;

    let updated = app
        .request(
            Method::PATCH,
            "/api/profiles/me",
            Some(json!({
                "headline": "Compiler enthusiast",
                "department": "Computer Science",
                "skills": ["COBOL", "Leadership", "cobol"]
            })),
            Some(&grace),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.text);
    assert_eq!(updated.json["user"]["headline"], "Compiler enthusiast");
    assert_eq!(updated.json["skills"], json!(["COBOL", "Leadership"]));

    let search = app
        .request(
            Method::GET,
            "/api/profiles/search?q=hopper&department=computer%20science",
            None,
            Some(&alan),
        )
        .await;
    assert_eq!(search.status, StatusCode::OK);
    let users = search.json["users"].as_array().expect("users array");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["full_name"], "Grace Hopper");

    let profile_id = users[0]["id"].as_str().expect("profile id").to_string();
    let profile = app
        .request(
            Method::GET,
            &format!("/api/profiles/{profile_id}"),
            None,
            Some(&alan),
        )
        .await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.json["connection_status"], "none");
}

#[tokio::test]
async fn purge_keeps_live_sessions() {
    let app = TestApp::new().await;
    let token = app.register("ada@campus.edu", "Ada Lovelace").await;

    let report = purge_expired(
        &app.services.db_pool,
        RetentionPolicy::from_config(&app.services.config),
    )
    .await
    .expect("purge");
    assert_eq!(report.sessions, 0);

    let me = app
        .request(Method::GET, "/api/auth/me", None, Some(&token))
        .await;
    assert_eq!(me.status, StatusCode::OK);
}
