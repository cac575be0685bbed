use campusnet_auth::User;
use campusnet_database::{new_public_id, now_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::notification::{NewNotification, Notifier};
use super::{resolve_user_id, summary_columns, summary_from_row, ServiceError};
use crate::realtime::{RealtimeHub, ServerEvent};
use crate::routes::models::{
    ConversationResponse, MarkReadResponse, MessageResponse, NotificationKind,
};
use crate::util::{required_text, Page};

pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// A conversation the caller takes part in.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRef {
    pub id: i64,
    pub public_id: String,
    pub user_low_id: i64,
    pub user_high_id: i64,
}

impl ConversationRef {
    pub fn other_participant(&self, user_id: i64) -> i64 {
        if self.user_low_id == user_id {
            self.user_high_id
        } else {
            self.user_low_id
        }
    }

    fn includes(&self, user_id: i64) -> bool {
        self.user_low_id == user_id || self.user_high_id == user_id
    }
}

pub async fn conversation_for_participant(
    pool: &SqlitePool,
    user_id: i64,
    conversation_id: &str,
) -> Result<ConversationRef, ServiceError> {
    let conversation: ConversationRef = sqlx::query_as(
        "SELECT id, public_id, user_low_id, user_high_id FROM conversations WHERE public_id = ?",
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("conversation not found"))?;

    if !conversation.includes(user_id) {
        return Err(ServiceError::forbidden("not a participant of this conversation"));
    }
    Ok(conversation)
}

fn select_conversations(extra_filter: &str) -> String {
    format!(
        r#"
        SELECT c.public_id, c.created_at, c.last_message_at,
               {other},
               (SELECT COUNT(*) FROM messages um
                WHERE um.conversation_id = c.id AND um.sender_id <> ?1 AND um.read_at IS NULL) AS unread_count,
               lm.public_id AS last_public_id,
               lm.content AS last_content,
               lm.created_at AS last_created_at,
               lm.read_at AS last_read_at,
               ls.public_id AS last_sender_public_id
        FROM conversations c
        JOIN users o ON o.id = CASE WHEN c.user_low_id = ?1 THEN c.user_high_id ELSE c.user_low_id END
        LEFT JOIN user_profiles op ON op.user_id = o.id
        LEFT JOIN messages lm ON lm.id = (
            SELECT m2.id FROM messages m2
            WHERE m2.conversation_id = c.id
            ORDER BY m2.created_at DESC, m2.id DESC
            LIMIT 1
        )
        LEFT JOIN users ls ON ls.id = lm.sender_id
        WHERE (c.user_low_id = ?1 OR c.user_high_id = ?1) {extra_filter}
        "#,
        other = summary_columns("o", "op", "other"),
    )
}

fn conversation_from_row(row: &SqliteRow) -> Result<ConversationResponse, ServiceError> {
    let public_id: String = row.try_get("public_id")?;
    let last_public_id: Option<String> = row.try_get("last_public_id")?;
    let last_message = match last_public_id {
        Some(id) => Some(MessageResponse {
            id,
            conversation_id: public_id.clone(),
            sender_id: row.try_get("last_sender_public_id")?,
            content: row.try_get("last_content")?,
            created_at: row.try_get("last_created_at")?,
            read_at: row.try_get("last_read_at")?,
        }),
        None => None,
    };

    Ok(ConversationResponse {
        id: public_id,
        participant: summary_from_row(row, "other")?,
        last_message,
        unread_count: row.try_get("unread_count")?,
        last_message_at: row.try_get("last_message_at")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn conversation_view(
    pool: &SqlitePool,
    user_id: i64,
    conversation_id: &str,
) -> Result<ConversationResponse, ServiceError> {
    let row = sqlx::query(&select_conversations("AND c.public_id = ?2"))
        .bind(user_id)
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("conversation not found"))?;

    conversation_from_row(&row)
}

/// Get or create the direct conversation between the caller and `other_id`.
pub async fn open_conversation(
    pool: &SqlitePool,
    user: &User,
    other_id: &str,
) -> Result<ConversationResponse, ServiceError> {
    let other = resolve_user_id(pool, other_id).await?;
    if other == user.id {
        return Err(ServiceError::bad_request("cannot start a conversation with yourself"));
    }
    let (low, high) = if user.id < other { (user.id, other) } else { (other, user.id) };

    let created = sqlx::query(
        r#"
        INSERT INTO conversations (public_id, user_low_id, user_high_id, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_low_id, user_high_id) DO NOTHING
        "#,
    )
    .bind(new_public_id())
    .bind(low)
    .bind(high)
    .bind(now_timestamp())
    .execute(pool)
    .await?
    .rows_affected();

    let public_id: String = sqlx::query_scalar(
        "SELECT public_id FROM conversations WHERE user_low_id = ? AND user_high_id = ?",
    )
    .bind(low)
    .bind(high)
    .fetch_one(pool)
    .await?;

    if created > 0 {
        info!(conversation = %public_id, "conversation created");
    }
    conversation_view(pool, user.id, &public_id).await
}

/// Most recently active first.
pub async fn list_conversations(
    pool: &SqlitePool,
    user_id: i64,
    page: Page,
) -> Result<Vec<ConversationResponse>, ServiceError> {
    let sql = format!(
        "{} ORDER BY COALESCE(c.last_message_at, c.created_at) DESC, c.id DESC LIMIT ?2 OFFSET ?3",
        select_conversations("")
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(conversation_from_row).collect()
}

fn select_messages(filter: &str) -> String {
    format!(
        r#"
        SELECT m.public_id, c.public_id AS conversation_public_id, s.public_id AS sender_public_id,
               m.content, m.created_at, m.read_at
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        JOIN users s ON s.id = m.sender_id
        WHERE {filter}
        "#
    )
}

fn message_from_row(row: &SqliteRow) -> Result<MessageResponse, ServiceError> {
    Ok(MessageResponse {
        id: row.try_get("public_id")?,
        conversation_id: row.try_get("conversation_public_id")?,
        sender_id: row.try_get("sender_public_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}

/// Newest first.
pub async fn list_messages(
    pool: &SqlitePool,
    user_id: i64,
    conversation_id: &str,
    page: Page,
) -> Result<Vec<MessageResponse>, ServiceError> {
    let conversation = conversation_for_participant(pool, user_id, conversation_id).await?;
    let sql = format!(
        "{} ORDER BY m.created_at DESC, m.id DESC LIMIT ? OFFSET ?",
        select_messages("m.conversation_id = ?")
    );
    let rows = sqlx::query(&sql)
        .bind(conversation.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(message_from_row).collect()
}

/// Store the message, push `message_created` to both participants and
/// notify the recipient.
pub async fn send_message(
    pool: &SqlitePool,
    hub: &RealtimeHub,
    notifier: &Notifier,
    sender: &User,
    conversation_id: &str,
    content: &str,
) -> Result<MessageResponse, ServiceError> {
    let conversation = conversation_for_participant(pool, sender.id, conversation_id).await?;
    let content = required_text("content", content, MAX_MESSAGE_LENGTH)?;
    let recipient_id = conversation.other_participant(sender.id);

    let public_id = new_public_id();
    let now = now_timestamp();
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO messages (public_id, conversation_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(conversation.id)
    .bind(sender.id)
    .bind(&content)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
        .bind(&now)
        .bind(conversation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let message = MessageResponse {
        id: public_id,
        conversation_id: conversation.public_id.clone(),
        sender_id: sender.public_id.clone(),
        content,
        created_at: now,
        read_at: None,
    };

    for participant in [sender.id, recipient_id] {
        hub.send_to_user(
            participant,
            ServerEvent::MessageCreated {
                conversation_id: conversation.public_id.clone(),
                message: message.clone(),
            },
        );
    }
    notifier.notify(NewNotification {
        recipient_id,
        actor_id: Some(sender.id),
        kind: NotificationKind::MessageReceived,
        entity_type: Some("conversation"),
        entity_id: Some(conversation.public_id.clone()),
        message: format!("New message from {}", sender.full_name),
    });

    debug!(conversation = %conversation.public_id, message = %message.id, "message sent");
    Ok(message)
}

/// Mark the other participant's messages as read and tell them.
pub async fn mark_read(
    pool: &SqlitePool,
    hub: &RealtimeHub,
    reader: &User,
    conversation_id: &str,
) -> Result<MarkReadResponse, ServiceError> {
    let conversation = conversation_for_participant(pool, reader.id, conversation_id).await?;
    let read_at = now_timestamp();

    let updated = sqlx::query(
        "UPDATE messages SET read_at = ? WHERE conversation_id = ? AND sender_id <> ? AND read_at IS NULL",
    )
    .bind(&read_at)
    .bind(conversation.id)
    .bind(reader.id)
    .execute(pool)
    .await?
    .rows_affected();

    hub.send_to_user(
        conversation.other_participant(reader.id),
        ServerEvent::ConversationRead {
            conversation_id: conversation.public_id.clone(),
            reader_id: reader.public_id.clone(),
            read_at: read_at.clone(),
        },
    );

    Ok(MarkReadResponse { updated, read_at })
}

/// Relay a typing indicator to the other participant.
pub async fn typing(
    pool: &SqlitePool,
    hub: &RealtimeHub,
    user: &User,
    conversation_id: &str,
) -> Result<(), ServiceError> {
    let conversation = conversation_for_participant(pool, user.id, conversation_id).await?;
    hub.send_to_user(
        conversation.other_participant(user.id),
        ServerEvent::Typing {
            conversation_id: conversation.public_id,
            user_id: user.public_id.clone(),
        },
    );
    Ok(())
}

pub async fn delete_message(pool: &SqlitePool, user: &User, message_id: &str) -> Result<(), ServiceError> {
    let row: Option<(i64, i64, i64)> =
        sqlx::query_as("SELECT id, conversation_id, sender_id FROM messages WHERE public_id = ?")
            .bind(message_id)
            .fetch_optional(pool)
            .await?;
    let (id, conversation_id, sender_id) =
        row.ok_or_else(|| ServiceError::not_found("message not found"))?;
    if sender_id != user.id {
        return Err(ServiceError::forbidden("only the sender can delete this message"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM messages WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE conversations SET last_message_at = (SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1) WHERE id = ?1",
    )
    .bind(conversation_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    debug!(message = %message_id, "message deleted");
    Ok(())
}

pub async fn unread_total(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        WHERE (c.user_low_id = ?1 OR c.user_high_id = ?1)
          AND m.sender_id <> ?1
          AND m.read_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
