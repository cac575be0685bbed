use campusnet_auth::User;
use campusnet_database::{is_unique_violation, new_public_id, now_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::notification::{delete_for_entity, NewNotification, Notifier};
use super::{resolve_user_id, summary_columns, summary_from_row, ServiceError};
use crate::routes::models::{
    ConnectionDirection, ConnectionResponse, ConnectionStatus, NotificationKind,
    SuggestionResponse,
};
use crate::util::{optional_text, Page};

pub const MAX_NOTE_LENGTH: usize = 300;
pub const DEFAULT_SUGGESTIONS: i64 = 10;
pub const MAX_SUGGESTIONS: i64 = 50;

/// Raw connection row for the pair checks.
#[derive(Debug, sqlx::FromRow)]
struct PairRow {
    id: i64,
    public_id: String,
    requester_id: i64,
    addressee_id: i64,
    status: String,
}

/// Connection rows as seen from `?1`: the joined user is the other party.
fn select_connections(filter: &str) -> String {
    format!(
        r#"
        SELECT c.public_id, c.requester_id, c.status, c.note, c.created_at, c.updated_at,
               {other}
        FROM connections c
        JOIN users o ON o.id = CASE WHEN c.requester_id = ?1 THEN c.addressee_id ELSE c.requester_id END
        LEFT JOIN user_profiles op ON op.user_id = o.id
        WHERE {filter}
        "#,
        other = summary_columns("o", "op", "other"),
    )
}

fn connection_from_row(row: &SqliteRow, perspective_id: i64) -> Result<ConnectionResponse, ServiceError> {
    let requester_id: i64 = row.try_get("requester_id")?;
    Ok(ConnectionResponse {
        id: row.try_get("public_id")?,
        user: summary_from_row(row, "other")?,
        status: row.try_get("status")?,
        direction: if requester_id == perspective_id {
            ConnectionDirection::Outgoing
        } else {
            ConnectionDirection::Incoming
        },
        note: row.try_get("note")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn connection_for(
    pool: &SqlitePool,
    user_id: i64,
    connection_id: &str,
) -> Result<ConnectionResponse, ServiceError> {
    let sql = select_connections("c.public_id = ?2 AND (c.requester_id = ?1 OR c.addressee_id = ?1)");
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(connection_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("connection not found"))?;

    connection_from_row(&row, user_id)
}

async fn pair_row(pool: &SqlitePool, a: i64, b: i64) -> Result<Option<PairRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, public_id, requester_id, addressee_id, status
        FROM connections
        WHERE (requester_id = ?1 AND addressee_id = ?2) OR (requester_id = ?2 AND addressee_id = ?1)
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_optional(pool)
    .await
}

/// Row addressed by public id, only if `user_id` is one of its parties.
async fn owned_pair_row(
    pool: &SqlitePool,
    user_id: i64,
    connection_id: &str,
) -> Result<PairRow, ServiceError> {
    sqlx::query_as(
        r#"
        SELECT id, public_id, requester_id, addressee_id, status
        FROM connections
        WHERE public_id = ? AND (requester_id = ? OR addressee_id = ?)
        "#,
    )
    .bind(connection_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("connection not found"))
}

pub async fn are_connected(pool: &SqlitePool, a: i64, b: i64) -> Result<bool, ServiceError> {
    Ok(pair_row(pool, a, b)
        .await?
        .is_some_and(|row| row.status == "accepted"))
}

pub async fn status_between(
    pool: &SqlitePool,
    viewer_id: i64,
    other_id: i64,
) -> Result<(ConnectionStatus, Option<String>), ServiceError> {
    if viewer_id == other_id {
        return Ok((ConnectionStatus::Myself, None));
    }

    let status = match pair_row(pool, viewer_id, other_id).await? {
        None => (ConnectionStatus::None, None),
        Some(row) if row.status == "accepted" => (ConnectionStatus::Connected, Some(row.public_id)),
        Some(row) if row.requester_id == viewer_id => {
            (ConnectionStatus::PendingOutgoing, Some(row.public_id))
        }
        Some(row) => (ConnectionStatus::PendingIncoming, Some(row.public_id)),
    };
    Ok(status)
}

pub async fn connection_count(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM connections WHERE status = 'accepted' AND (requester_id = ?1 OR addressee_id = ?1)",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn accepted_connection_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>, ServiceError> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT CASE WHEN requester_id = ?1 THEN addressee_id ELSE requester_id END
        FROM connections
        WHERE status = 'accepted' AND (requester_id = ?1 OR addressee_id = ?1)
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Send a request to `target_id`. A pending request in the other direction
/// is accepted instead.
pub async fn send_request(
    pool: &SqlitePool,
    notifier: &Notifier,
    me: &User,
    target_id: &str,
    note: Option<&str>,
) -> Result<ConnectionResponse, ServiceError> {
    let target = resolve_user_id(pool, target_id).await?;
    if target == me.id {
        return Err(ServiceError::bad_request("cannot connect with yourself"));
    }
    let note = optional_text("note", note, MAX_NOTE_LENGTH)?;

    if let Some(existing) = pair_row(pool, me.id, target).await? {
        return match (existing.status.as_str(), existing.requester_id == me.id) {
            ("accepted", _) => Err(ServiceError::conflict("already connected")),
            (_, true) => Err(ServiceError::conflict("connection request already sent")),
            (_, false) => accept(pool, notifier, me, &existing.public_id).await,
        };
    }

    let public_id = new_public_id();
    let now = now_timestamp();
    let inserted = sqlx::query(
        r#"
        INSERT INTO connections (public_id, requester_id, addressee_id, status, note, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(me.id)
    .bind(target)
    .bind(&note)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => {}
        Err(error) if is_unique_violation(&error) => {
            return Err(ServiceError::conflict("a connection with this user already exists"));
        }
        Err(error) => return Err(error.into()),
    }

    info!(connection = %public_id, requester = %me.public_id, "connection requested");
    notifier.notify(NewNotification {
        recipient_id: target,
        actor_id: Some(me.id),
        kind: NotificationKind::ConnectionRequested,
        entity_type: Some("connection"),
        entity_id: Some(public_id.clone()),
        message: format!("{} sent you a connection request", me.full_name),
    });

    connection_for(pool, me.id, &public_id).await
}

pub async fn accept(
    pool: &SqlitePool,
    notifier: &Notifier,
    me: &User,
    connection_id: &str,
) -> Result<ConnectionResponse, ServiceError> {
    let row = owned_pair_row(pool, me.id, connection_id).await?;
    if row.addressee_id != me.id {
        return Err(ServiceError::forbidden("only the recipient can accept a request"));
    }
    if row.status != "pending" {
        return Err(ServiceError::conflict("connection is already accepted"));
    }

    sqlx::query("UPDATE connections SET status = 'accepted', updated_at = ? WHERE id = ?")
        .bind(now_timestamp())
        .bind(row.id)
        .execute(pool)
        .await?;

    info!(connection = %row.public_id, "connection accepted");
    notifier.notify(NewNotification {
        recipient_id: row.requester_id,
        actor_id: Some(me.id),
        kind: NotificationKind::ConnectionAccepted,
        entity_type: Some("connection"),
        entity_id: Some(row.public_id.clone()),
        message: format!("{} accepted your connection request", me.full_name),
    });

    connection_for(pool, me.id, &row.public_id).await
}

async fn delete_connection_row(pool: &SqlitePool, row: &PairRow) -> Result<(), ServiceError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM connections WHERE id = ?")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    delete_for_entity(&mut *tx, "connection", &row.public_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Addressee turns a pending request down; the row is removed.
pub async fn decline(pool: &SqlitePool, me: &User, connection_id: &str) -> Result<(), ServiceError> {
    let row = owned_pair_row(pool, me.id, connection_id).await?;
    if row.addressee_id != me.id {
        return Err(ServiceError::forbidden("only the recipient can decline a request"));
    }
    if row.status != "pending" {
        return Err(ServiceError::conflict("connection is already accepted"));
    }

    delete_connection_row(pool, &row).await?;
    info!(connection = %row.public_id, "connection declined");
    Ok(())
}

/// Requester withdraws a pending request.
pub async fn cancel(pool: &SqlitePool, me: &User, connection_id: &str) -> Result<(), ServiceError> {
    let row = owned_pair_row(pool, me.id, connection_id).await?;
    if row.requester_id != me.id {
        return Err(ServiceError::forbidden("only the requester can cancel a request"));
    }
    if row.status != "pending" {
        return Err(ServiceError::conflict("connection is already accepted"));
    }

    delete_connection_row(pool, &row).await?;
    info!(connection = %row.public_id, "connection request cancelled");
    Ok(())
}

/// Either side ends an accepted connection.
pub async fn remove(pool: &SqlitePool, me: &User, connection_id: &str) -> Result<(), ServiceError> {
    let row = owned_pair_row(pool, me.id, connection_id).await?;
    if row.status != "accepted" {
        return Err(ServiceError::bad_request("connection is still pending"));
    }

    delete_connection_row(pool, &row).await?;
    info!(connection = %row.public_id, "connection removed");
    Ok(())
}

/// Accepted connections of `user_id`, most recent first.
pub async fn list_connections(
    pool: &SqlitePool,
    user_id: i64,
    page: Page,
) -> Result<Vec<ConnectionResponse>, ServiceError> {
    let sql = format!(
        "{} ORDER BY c.updated_at DESC, c.id DESC LIMIT ?2 OFFSET ?3",
        select_connections("c.status = 'accepted' AND (c.requester_id = ?1 OR c.addressee_id = ?1)")
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(|row| connection_from_row(row, user_id)).collect()
}

pub async fn list_pending(
    pool: &SqlitePool,
    user_id: i64,
    direction: ConnectionDirection,
    page: Page,
) -> Result<Vec<ConnectionResponse>, ServiceError> {
    let filter = match direction {
        ConnectionDirection::Incoming => "c.status = 'pending' AND c.addressee_id = ?1",
        ConnectionDirection::Outgoing => "c.status = 'pending' AND c.requester_id = ?1",
    };
    let sql = format!(
        "{} ORDER BY c.created_at DESC, c.id DESC LIMIT ?2 OFFSET ?3",
        select_connections(filter)
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(|row| connection_from_row(row, user_id)).collect()
}

/// People the user has no connection row with, ranked by mutual
/// connections and then by sharing the user's department.
pub async fn suggestions(
    pool: &SqlitePool,
    user_id: i64,
    limit: Option<i64>,
) -> Result<Vec<SuggestionResponse>, ServiceError> {
    let limit = limit.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS);
    let sql = format!(
        r#"
        WITH mine AS (
            SELECT CASE WHEN requester_id = ?1 THEN addressee_id ELSE requester_id END AS user_id
            FROM connections
            WHERE status = 'accepted' AND (requester_id = ?1 OR addressee_id = ?1)
        ),
        related AS (
            SELECT CASE WHEN requester_id = ?1 THEN addressee_id ELSE requester_id END AS user_id
            FROM connections
            WHERE requester_id = ?1 OR addressee_id = ?1
        ),
        my_profile AS (
            SELECT department FROM user_profiles WHERE user_id = ?1
        )
        SELECT {candidate},
               (SELECT COUNT(*)
                FROM connections m
                WHERE m.status = 'accepted'
                  AND (m.requester_id = u.id OR m.addressee_id = u.id)
                  AND (CASE WHEN m.requester_id = u.id THEN m.addressee_id ELSE m.requester_id END)
                      IN (SELECT user_id FROM mine)) AS mutual_connections,
               CASE
                   WHEN pr.department IS NOT NULL
                    AND pr.department = (SELECT department FROM my_profile) COLLATE NOCASE
                   THEN 1 ELSE 0
               END AS same_department
        FROM users u
        LEFT JOIN user_profiles pr ON pr.user_id = u.id
        WHERE u.id <> ?1 AND u.id NOT IN (SELECT user_id FROM related)
        ORDER BY mutual_connections DESC, same_department DESC, u.created_at DESC, u.id DESC
        LIMIT ?2
        "#,
        candidate = summary_columns("u", "pr", "candidate"),
    );

    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(SuggestionResponse {
                user: summary_from_row(row, "candidate")?,
                mutual_connections: row.try_get("mutual_connections")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::RealtimeHub;
    use crate::services::test_utils::{connect_users, create_test_db, create_user};

    fn notifier(pool: &SqlitePool) -> Notifier {
        Notifier::new(pool.clone(), RealtimeHub::new(), 30)
    }

    #[tokio::test]
    async fn request_accept_and_status() {
        let (pool, _dir) = create_test_db().await;
        let notifier = notifier(&pool);
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;

        let request = send_request(&pool, &notifier, &alice, &bob.public_id, Some(" hi "))
            .await
            .unwrap();
        assert_eq!(request.status, "pending");
        assert_eq!(request.direction, ConnectionDirection::Outgoing);
        assert_eq!(request.user.id, bob.public_id);
        assert_eq!(request.note.as_deref(), Some("hi"));

        assert_eq!(
            status_between(&pool, alice.id, bob.id).await.unwrap().0,
            ConnectionStatus::PendingOutgoing
        );
        assert_eq!(
            status_between(&pool, bob.id, alice.id).await.unwrap().0,
            ConnectionStatus::PendingIncoming
        );

        assert!(matches!(
            send_request(&pool, &notifier, &alice, &bob.public_id, None).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            accept(&pool, &notifier, &alice, &request.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let accepted = accept(&pool, &notifier, &bob, &request.id).await.unwrap();
        assert_eq!(accepted.status, "accepted");
        assert_eq!(accepted.direction, ConnectionDirection::Incoming);
        assert!(are_connected(&pool, alice.id, bob.id).await.unwrap());
        assert_eq!(connection_count(&pool, alice.id).await.unwrap(), 1);
        assert_eq!(
            status_between(&pool, alice.id, alice.id).await.unwrap().0,
            ConnectionStatus::Myself
        );
    }

    #[tokio::test]
    async fn reverse_request_accepts_pending_one() {
        let (pool, _dir) = create_test_db().await;
        let notifier = notifier(&pool);
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;

        let request = send_request(&pool, &notifier, &alice, &bob.public_id, None)
            .await
            .unwrap();
        let reverse = send_request(&pool, &notifier, &bob, &alice.public_id, None)
            .await
            .unwrap();
        assert_eq!(reverse.id, request.id);
        assert_eq!(reverse.status, "accepted");
    }

    #[tokio::test]
    async fn requests_to_self_or_unknown_users_fail() {
        let (pool, _dir) = create_test_db().await;
        let notifier = notifier(&pool);
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;

        assert!(matches!(
            send_request(&pool, &notifier, &alice, &alice.public_id, None).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            send_request(&pool, &notifier, &alice, "missing", None).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn decline_cancel_and_remove_delete_the_row() {
        let (pool, _dir) = create_test_db().await;
        let notifier = notifier(&pool);
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;

        let first = send_request(&pool, &notifier, &alice, &bob.public_id, None)
            .await
            .unwrap();
        assert!(matches!(
            decline(&pool, &alice, &first.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        decline(&pool, &bob, &first.id).await.unwrap();
        assert_eq!(
            status_between(&pool, alice.id, bob.id).await.unwrap().0,
            ConnectionStatus::None
        );

        let second = send_request(&pool, &notifier, &alice, &bob.public_id, None)
            .await
            .unwrap();
        assert!(matches!(
            cancel(&pool, &bob, &second.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        cancel(&pool, &alice, &second.id).await.unwrap();

        let third = send_request(&pool, &notifier, &alice, &bob.public_id, None)
            .await
            .unwrap();
        assert!(matches!(
            remove(&pool, &alice, &third.id).await,
            Err(ServiceError::BadRequest(_))
        ));
        accept(&pool, &notifier, &bob, &third.id).await.unwrap();
        remove(&pool, &bob, &third.id).await.unwrap();
        assert!(!are_connected(&pool, alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn listings_are_scoped_by_direction() {
        let (pool, _dir) = create_test_db().await;
        let notifier = notifier(&pool);
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let carol = create_user(&pool, "carol@example.edu", "Carol").await;

        send_request(&pool, &notifier, &alice, &bob.public_id, None)
            .await
            .unwrap();
        send_request(&pool, &notifier, &carol, &alice.public_id, None)
            .await
            .unwrap();

        let outgoing = list_pending(&pool, alice.id, ConnectionDirection::Outgoing, Page::default())
            .await
            .unwrap();
        let incoming = list_pending(&pool, alice.id, ConnectionDirection::Incoming, Page::default())
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].user.full_name, "Bob");
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].user.full_name, "Carol");
        assert!(list_connections(&pool, alice.id, Page::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn suggestions_rank_by_mutual_connections() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let carol = create_user(&pool, "carol@example.edu", "Carol").await;
        let dave = create_user(&pool, "dave@example.edu", "Dave").await;
        let erin = create_user(&pool, "erin@example.edu", "Erin").await;

        connect_users(&pool, alice.id, bob.id).await;
        connect_users(&pool, alice.id, carol.id).await;
        connect_users(&pool, bob.id, dave.id).await;
        connect_users(&pool, carol.id, dave.id).await;
        connect_users(&pool, bob.id, erin.id).await;

        let ranked = suggestions(&pool, alice.id, None).await.unwrap();
        let names: Vec<_> = ranked.iter().map(|s| s.user.full_name.as_str()).collect();
        assert_eq!(names, vec!["Dave", "Erin"]);
        assert_eq!(ranked[0].mutual_connections, 2);
        assert_eq!(ranked[1].mutual_connections, 1);
    }

    #[tokio::test]
    async fn suggestions_prefer_same_department_on_ties() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let _carol = create_user(&pool, "carol@example.edu", "Carol").await;

        for (user_id, department) in [(alice.id, "Physics"), (bob.id, "physics")] {
            sqlx::query("UPDATE user_profiles SET department = ? WHERE user_id = ?")
                .bind(department)
                .bind(user_id)
                .execute(&pool)
                .await
                .unwrap();
        }

        let ranked = suggestions(&pool, alice.id, Some(1)).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user.full_name, "Bob");
    }
}
