//! Test utilities for service layer testing

use campusnet_auth::{Authenticator, NewAccount, User};
use campusnet_config::{AuthConfig, DatabaseConfig};
use campusnet_database::{initialize_database, new_public_id, now_timestamp};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Temp-file database with the real migrations applied.
pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", temp_dir.path().join("test.db").display()),
        max_connections: 4,
    };
    let pool = initialize_database(&config)
        .await
        .expect("Failed to create test database");

    (pool, temp_dir)
}

pub fn authenticator(pool: &SqlitePool) -> Authenticator {
    Authenticator::new(pool.clone(), AuthConfig::default())
}

/// Registers a student account (with its empty profile).
pub async fn create_user(pool: &SqlitePool, email: &str, full_name: &str) -> User {
    let (user, _) = authenticator(pool)
        .register(NewAccount {
            email,
            password: "correct horse battery",
            full_name,
            role: None,
        })
        .await
        .expect("Failed to register test user");
    user
}

/// Inserts an accepted connection between two users.
pub async fn connect_users(pool: &SqlitePool, requester_id: i64, addressee_id: i64) {
    let now = now_timestamp();
    sqlx::query(
        "INSERT INTO connections (public_id, requester_id, addressee_id, status, created_at, updated_at) VALUES (?, ?, ?, 'accepted', ?, ?)",
    )
    .bind(new_public_id())
    .bind(requester_id)
    .bind(addressee_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to connect users");
}

async fn unread_notifications(pool: &SqlitePool, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count notifications")
}

/// Polls until the background fan-out stored `expected` unread notifications
/// for the user, or gives up after half a second. Returns the final count.
pub async fn wait_for_notifications(pool: &SqlitePool, user_id: i64, expected: i64) -> i64 {
    for _ in 0..50 {
        if unread_notifications(pool, user_id).await >= expected {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    unread_notifications(pool, user_id).await
}
