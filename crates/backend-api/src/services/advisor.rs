use campusnet_advisor::{
    title_from_message, AdvisorClient, AdvisorError, AdvisorProfile, ChatMessage, ChatRole,
    DEFAULT_SESSION_TITLE,
};
use campusnet_auth::User;
use campusnet_database::{new_public_id, now_timestamp};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use super::profile::stored_profile;
use super::ServiceError;
use crate::routes::models::{
    AdvisorMessageResponse, AdvisorReplyResponse, AdvisorSessionDetailResponse,
    AdvisorSessionResponse,
};
use crate::util::{optional_text, required_text, Page};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_ADVISOR_MESSAGE_LENGTH: usize = 4000;

#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    public_id: String,
    title: String,
    message_count: i64,
    created_at: String,
    updated_at: String,
}

impl From<SessionRow> for AdvisorSessionResponse {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.public_id,
            title: row.title,
            message_count: row.message_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    role: String,
    content: String,
    created_at: String,
}

impl From<MessageRow> for AdvisorMessageResponse {
    fn from(row: MessageRow) -> Self {
        Self {
            role: row.role,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

const SESSION_SELECT: &str = r#"
    SELECT s.id, s.public_id, s.title, s.created_at, s.updated_at,
           (SELECT COUNT(*) FROM advisor_messages m WHERE m.session_id = s.id) AS message_count
    FROM advisor_sessions s
"#;

/// Sessions belonging to someone else are reported as missing.
async fn owned_session(
    pool: &SqlitePool,
    user_id: i64,
    session_id: &str,
) -> Result<SessionRow, ServiceError> {
    sqlx::query_as(&format!(
        "{SESSION_SELECT} WHERE s.public_id = ? AND s.user_id = ?"
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("advisor session not found"))
}

pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    title: Option<&str>,
) -> Result<AdvisorSessionResponse, ServiceError> {
    let title = optional_text("title", title, MAX_TITLE_LENGTH)?
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
    let public_id = new_public_id();
    let now = now_timestamp();

    sqlx::query(
        "INSERT INTO advisor_sessions (public_id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(user_id)
    .bind(&title)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(user_id, session = %public_id, "advisor session created");
    Ok(owned_session(pool, user_id, &public_id).await?.into())
}

/// Most recently active first.
pub async fn list_sessions(
    pool: &SqlitePool,
    user_id: i64,
    page: Page,
) -> Result<Vec<AdvisorSessionResponse>, ServiceError> {
    let rows: Vec<SessionRow> = sqlx::query_as(&format!(
        "{SESSION_SELECT} WHERE s.user_id = ? ORDER BY s.updated_at DESC, s.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn session_messages(
    pool: &SqlitePool,
    session_id: i64,
) -> Result<Vec<MessageRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT role, content, created_at FROM advisor_messages WHERE session_id = ? ORDER BY id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

pub async fn get_session(
    pool: &SqlitePool,
    user_id: i64,
    session_id: &str,
) -> Result<AdvisorSessionDetailResponse, ServiceError> {
    let session = owned_session(pool, user_id, session_id).await?;
    let messages = session_messages(pool, session.id).await?;

    Ok(AdvisorSessionDetailResponse {
        session: session.into(),
        messages: messages.into_iter().map(Into::into).collect(),
    })
}

pub async fn rename_session(
    pool: &SqlitePool,
    user_id: i64,
    session_id: &str,
    title: &str,
) -> Result<AdvisorSessionResponse, ServiceError> {
    let title = required_text("title", title, MAX_TITLE_LENGTH)?;
    let session = owned_session(pool, user_id, session_id).await?;

    sqlx::query("UPDATE advisor_sessions SET title = ?, updated_at = ? WHERE id = ?")
        .bind(&title)
        .bind(now_timestamp())
        .bind(session.id)
        .execute(pool)
        .await?;

    Ok(owned_session(pool, user_id, session_id).await?.into())
}

pub async fn delete_session(
    pool: &SqlitePool,
    user_id: i64,
    session_id: &str,
) -> Result<(), ServiceError> {
    let session = owned_session(pool, user_id, session_id).await?;
    sqlx::query("DELETE FROM advisor_sessions WHERE id = ?")
        .bind(session.id)
        .execute(pool)
        .await?;

    info!(user_id, session = %session_id, "advisor session deleted");
    Ok(())
}

async fn advisor_profile(pool: &SqlitePool, user: &User) -> Result<AdvisorProfile, ServiceError> {
    let stored = stored_profile(pool, user.id).await?;
    Ok(AdvisorProfile {
        full_name: user.full_name.clone(),
        role: user.role.as_str().to_string(),
        headline: stored.user.headline,
        department: stored.user.department,
        program: stored.program,
        graduation_year: stored.graduation_year,
        skills: stored.skills,
    })
}

fn chat_role(role: &str) -> ChatRole {
    match role {
        "assistant" => ChatRole::Assistant,
        _ => ChatRole::User,
    }
}

/// Sends the user's message with the session history and stores both turns
/// once the model has answered. Nothing is stored when the advisor fails.
pub async fn send_message(
    pool: &SqlitePool,
    client: &AdvisorClient,
    user: &User,
    session_id: &str,
    message: &str,
) -> Result<AdvisorReplyResponse, ServiceError> {
    let message = required_text("message", message, MAX_ADVISOR_MESSAGE_LENGTH)?;
    let session = owned_session(pool, user.id, session_id).await?;

    if !client.is_enabled() {
        return Err(AdvisorError::ApiKeyMissing.into());
    }

    let mut history: Vec<ChatMessage> = session_messages(pool, session.id)
        .await?
        .into_iter()
        .map(|row| ChatMessage::new(chat_role(&row.role), row.content))
        .collect();
    let first_message = history.is_empty();
    history.push(ChatMessage::new(ChatRole::User, message.clone()));

    let profile = advisor_profile(pool, user).await?;
    let reply = client.advise(&profile, &history).await.map_err(|error| {
        warn!(user_id = user.id, session = %session_id, %error, "advisor request failed");
        error
    })?;

    let asked_at = now_timestamp();
    let mut tx = pool.begin().await?;
    for (role, content) in [("user", &message), ("assistant", &reply)] {
        sqlx::query(
            "INSERT INTO advisor_messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(role)
        .bind(content)
        .bind(&asked_at)
        .execute(&mut *tx)
        .await?;
    }

    let title = if first_message && session.title == DEFAULT_SESSION_TITLE {
        title_from_message(&message)
    } else {
        session.title.clone()
    };
    sqlx::query("UPDATE advisor_sessions SET title = ?, updated_at = ? WHERE id = ?")
        .bind(&title)
        .bind(&asked_at)
        .bind(session.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(user_id = user.id, session = %session_id, model = client.model(), "advisor replied");

    Ok(AdvisorReplyResponse {
        session: owned_session(pool, user.id, session_id).await?.into(),
        user_message: AdvisorMessageResponse {
            role: "user".into(),
            content: message,
            created_at: asked_at.clone(),
        },
        reply: AdvisorMessageResponse {
            role: "assistant".into(),
            content: reply,
            created_at: asked_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_test_db, create_user};
    use campusnet_config::AdvisorConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base_url: Option<String>) -> AdvisorClient {
        let config = match base_url {
            Some(base_url) => AdvisorConfig {
                api_key: Some("test-key".into()),
                base_url,
                ..AdvisorConfig::default()
            },
            None => AdvisorConfig::default(),
        };
        AdvisorClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn sessions_are_private_to_their_owner() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@campus.edu", "Alice").await;
        let bob = create_user(&pool, "bob@campus.edu", "Bob").await;

        let session = create_session(&pool, alice.id, None).await.unwrap();
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
        assert_eq!(session.message_count, 0);

        assert!(matches!(
            get_session(&pool, bob.id, &session.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(list_sessions(&pool, bob.id, Page::default())
            .await
            .unwrap()
            .is_empty());

        let renamed = rename_session(&pool, alice.id, &session.id, "  Internships ")
            .await
            .unwrap();
        assert_eq!(renamed.title, "Internships");
        assert!(matches!(
            rename_session(&pool, alice.id, &session.id, "   ").await,
            Err(ServiceError::BadRequest(_))
        ));

        delete_session(&pool, alice.id, &session.id).await.unwrap();
        assert!(list_sessions(&pool, alice.id, Page::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn disabled_advisor_stores_nothing() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@campus.edu", "Alice").await;
        let session = create_session(&pool, alice.id, None).await.unwrap();

        let result = send_message(&pool, &client(None), &alice, &session.id, "Hello").await;
        assert!(matches!(
            result,
            Err(ServiceError::Advisor(AdvisorError::ApiKeyMissing))
        ));

        let detail = get_session(&pool, alice.id, &session.id).await.unwrap();
        assert!(detail.messages.is_empty());
    }

    #[tokio::test]
    async fn reply_is_stored_and_first_message_names_the_session() {
        let server = MockServer::start();
        let completion = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key")
                .body_contains("Name: Alice");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": " Try the career fair. "}}]
            }));
        });

        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@campus.edu", "Alice").await;
        let session = create_session(&pool, alice.id, None).await.unwrap();

        let reply = send_message(
            &pool,
            &client(Some(server.base_url())),
            &alice,
            &session.id,
            "How do I find an internship?",
        )
        .await
        .unwrap();

        completion.assert();
        assert_eq!(reply.reply.content, "Try the career fair.");
        assert_eq!(reply.session.title, "How do I find an internship?");
        assert_eq!(reply.session.message_count, 2);

        let detail = get_session(&pool, alice.id, &session.id).await.unwrap();
        let roles: Vec<_> = detail.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn upstream_failure_keeps_history_unchanged() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("boom");
        });

        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@campus.edu", "Alice").await;
        let session = create_session(&pool, alice.id, Some("Careers")).await.unwrap();

        let result = send_message(
            &pool,
            &client(Some(server.base_url())),
            &alice,
            &session.id,
            "Hello",
        )
        .await;
        assert!(matches!(
            result,
            Err(ServiceError::Advisor(AdvisorError::Upstream { status: 500, .. }))
        ));

        let detail = get_session(&pool, alice.id, &session.id).await.unwrap();
        assert!(detail.messages.is_empty());
        assert_eq!(detail.session.title, "Careers");
    }
}
