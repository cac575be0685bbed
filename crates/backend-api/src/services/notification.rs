//! Notification storage and fan-out.
//!
//! Domain actions hand a [`NewNotification`] to the [`Notifier`], which
//! persists it and pushes it to the recipient's sockets on a background task.
//! Failures are logged and never reach the caller.

use campusnet_database::{new_public_id, now_timestamp, timestamp_after};
use chrono::Duration;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{optional_summary_from_row, summary_columns, ServiceError};
use crate::realtime::{RealtimeHub, ServerEvent};
use crate::routes::models::{NotificationKind, NotificationResponse};
use crate::util::Page;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub actor_id: Option<i64>,
    pub kind: NotificationKind,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
    pub message: String,
}

#[derive(Clone)]
pub struct Notifier {
    pool: SqlitePool,
    hub: RealtimeHub,
    ttl: Duration,
}

impl Notifier {
    /// `retention_days` of 0 keeps notifications until deleted.
    pub fn new(pool: SqlitePool, hub: RealtimeHub, retention_days: u32) -> Self {
        let ttl = if retention_days == 0 {
            Duration::MAX
        } else {
            Duration::days(i64::from(retention_days))
        };
        Self { pool, hub, ttl }
    }

    /// Fire and forget. Returns `None` when the notification was skipped
    /// because the actor is the recipient.
    pub fn notify(&self, notification: NewNotification) -> Option<JoinHandle<()>> {
        if notification.actor_id == Some(notification.recipient_id) {
            return None;
        }

        let notifier = self.clone();
        Some(tokio::spawn(async move {
            let kind = notification.kind;
            let recipient = notification.recipient_id;
            if let Err(error) = notifier.deliver(notification).await {
                warn!(error = %error, kind = kind.as_str(), recipient, "notification fan-out failed");
            }
        }))
    }

    /// Persist and push. Self-notifications are skipped with `Ok(None)`.
    pub async fn deliver(
        &self,
        notification: NewNotification,
    ) -> Result<Option<NotificationResponse>, ServiceError> {
        if notification.actor_id == Some(notification.recipient_id) {
            return Ok(None);
        }

        let public_id = new_public_id();
        let created_at = now_timestamp();
        let expires_at = timestamp_after(self.ttl);

        sqlx::query(
            r#"
            INSERT INTO notifications
                (public_id, recipient_id, actor_id, kind, entity_type, entity_id, message, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(notification.recipient_id)
        .bind(notification.actor_id)
        .bind(notification.kind.as_str())
        .bind(notification.entity_type)
        .bind(&notification.entity_id)
        .bind(&notification.message)
        .bind(&created_at)
        .bind(&expires_at)
        .execute(&self.pool)
        .await?;

        let stored = get_notification(&self.pool, notification.recipient_id, &public_id).await?;
        let sockets = self.hub.send_to_user(
            notification.recipient_id,
            ServerEvent::Notification {
                notification: stored.clone(),
            },
        );
        debug!(
            notification = %public_id,
            kind = notification.kind.as_str(),
            sockets,
            "notification delivered"
        );

        Ok(Some(stored))
    }
}

fn select_notifications(filter: &str) -> String {
    format!(
        r#"
        SELECT n.public_id, n.kind, n.entity_type, n.entity_id, n.message, n.is_read,
               n.created_at, n.expires_at, {actor}
        FROM notifications n
        LEFT JOIN users a ON a.id = n.actor_id
        LEFT JOIN user_profiles ap ON ap.user_id = a.id
        WHERE {filter}
        "#,
        actor = summary_columns("a", "ap", "actor"),
    )
}

fn notification_from_row(row: &SqliteRow) -> Result<NotificationResponse, ServiceError> {
    let kind: String = row.try_get("kind")?;
    Ok(NotificationResponse {
        id: row.try_get("public_id")?,
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| ServiceError::internal(format!("unknown notification kind {kind}")))?,
        actor: optional_summary_from_row(row, "actor")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: row.try_get("entity_id")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: i64,
    unread_only: bool,
    page: Page,
) -> Result<Vec<NotificationResponse>, ServiceError> {
    let sql = format!(
        "{} ORDER BY n.created_at DESC, n.id DESC LIMIT ? OFFSET ?",
        select_notifications(
            "n.recipient_id = ? AND n.expires_at > ? AND (? = 0 OR n.is_read = 0)"
        )
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(now_timestamp())
        .bind(unread_only)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(notification_from_row).collect()
}

pub async fn get_notification(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: &str,
) -> Result<NotificationResponse, ServiceError> {
    let sql = select_notifications("n.recipient_id = ? AND n.public_id = ?");
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(notification_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("notification not found"))?;

    notification_from_row(&row)
}

pub async fn unread_count(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0 AND expires_at > ?",
    )
    .bind(user_id)
    .bind(now_timestamp())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn set_read(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: &str,
    read: bool,
) -> Result<NotificationResponse, ServiceError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = ? WHERE recipient_id = ? AND public_id = ?",
    )
    .bind(read)
    .bind(user_id)
    .bind(notification_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("notification not found"));
    }

    get_notification(pool, user_id, notification_id).await
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64, ServiceError> {
    let result =
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0")
            .bind(user_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

pub async fn delete_notification(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: &str,
) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM notifications WHERE recipient_id = ? AND public_id = ?")
        .bind(user_id)
        .bind(notification_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("notification not found"));
    }

    Ok(())
}

/// Remove notifications that point at an entity which no longer exists.
pub async fn delete_for_entity<'e, E>(
    executor: E,
    entity_type: &str,
    entity_id: &str,
) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("DELETE FROM notifications WHERE entity_type = ? AND entity_id = ?")
        .bind(entity_type)
        .bind(entity_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_test_db, create_user};

    fn liked(recipient_id: i64, actor_id: i64) -> NewNotification {
        NewNotification {
            recipient_id,
            actor_id: Some(actor_id),
            kind: NotificationKind::PostLiked,
            entity_type: Some("post"),
            entity_id: Some("p1".into()),
            message: "Someone liked your post".into(),
        }
    }

    #[tokio::test]
    async fn deliver_persists_and_pushes_to_live_sockets() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let hub = RealtimeHub::new();
        let mut socket = hub.connect(alice.id).receiver;
        let notifier = Notifier::new(pool.clone(), hub, 30);

        let stored = notifier
            .deliver(liked(alice.id, bob.id))
            .await
            .unwrap()
            .expect("stored");
        assert_eq!(stored.kind, NotificationKind::PostLiked);
        assert_eq!(stored.actor.as_ref().map(|a| a.full_name.as_str()), Some("Bob"));
        assert!(!stored.is_read);

        match socket.recv().await.unwrap() {
            ServerEvent::Notification { notification } => assert_eq!(notification.id, stored.id),
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(unread_count(&pool, alice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn self_notifications_are_skipped() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let notifier = Notifier::new(pool.clone(), RealtimeHub::new(), 30);

        assert!(notifier.notify(liked(alice.id, alice.id)).is_none());
        assert!(notifier.deliver(liked(alice.id, alice.id)).await.unwrap().is_none());
        assert_eq!(unread_count(&pool, alice.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn notify_runs_in_background() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let notifier = Notifier::new(pool.clone(), RealtimeHub::new(), 30);

        notifier
            .notify(liked(alice.id, bob.id))
            .expect("spawned")
            .await
            .unwrap();
        assert_eq!(unread_count(&pool, alice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn read_state_and_listing() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let notifier = Notifier::new(pool.clone(), RealtimeHub::new(), 30);

        let first = notifier.deliver(liked(alice.id, bob.id)).await.unwrap().unwrap();
        notifier.deliver(liked(alice.id, bob.id)).await.unwrap();

        let updated = set_read(&pool, alice.id, &first.id, true).await.unwrap();
        assert!(updated.is_read);

        let unread = list_notifications(&pool, alice.id, true, Page::default())
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);

        assert_eq!(mark_all_read(&pool, alice.id).await.unwrap(), 1);
        assert_eq!(unread_count(&pool, alice.id).await.unwrap(), 0);

        // Other users cannot touch it.
        assert!(matches!(
            set_read(&pool, bob.id, &first.id, false).await,
            Err(ServiceError::NotFound(_))
        ));

        delete_notification(&pool, alice.id, &first.id).await.unwrap();
        let all = list_notifications(&pool, alice.id, false, Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn expired_notifications_are_hidden() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;

        sqlx::query(
            "INSERT INTO notifications (public_id, recipient_id, kind, message, created_at, expires_at) VALUES ('old', ?, 'system', 'gone', '2020-01-01T00:00:00.000Z', '2020-02-01T00:00:00.000Z')",
        )
        .bind(alice.id)
        .execute(&pool)
        .await
        .unwrap();

        let listed = list_notifications(&pool, alice.id, false, Page::default())
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(unread_count(&pool, alice.id).await.unwrap(), 0);
    }
}
