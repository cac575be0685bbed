use campusnet_auth::User;
use campusnet_database::{new_public_id, now_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::notification::delete_for_entity;
use super::{resolve_user_id, summary_columns, summary_from_row, ServiceError};
use crate::routes::models::{CreatePostRequest, PostResponse, UpdatePostRequest, Visibility};
use crate::util::{optional_http_url, required_text, Page};

pub const MAX_POST_LENGTH: usize = 3000;

/// Posts `?1` may read: public ones, their own, and connection-only posts of
/// accepted connections.
pub(crate) const VISIBLE_TO_VIEWER: &str = r#"(
    p.visibility = 'public'
    OR p.author_id = ?1
    OR EXISTS (
        SELECT 1 FROM connections vc
        WHERE vc.status = 'accepted'
          AND ((vc.requester_id = p.author_id AND vc.addressee_id = ?1)
            OR (vc.addressee_id = p.author_id AND vc.requester_id = ?1))
    )
)"#;

/// Internal handle on a post the caller is allowed to see.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRef {
    pub id: i64,
    pub public_id: String,
    pub author_id: i64,
}

fn select_posts(filter: &str) -> String {
    format!(
        r#"
        SELECT p.public_id, p.content, p.image_url, p.visibility, p.created_at, p.updated_at,
               {author},
               (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count,
               (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.id) AS comment_count,
               (SELECT COUNT(*) FROM post_shares s WHERE s.post_id = p.id) AS share_count,
               EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?1) AS liked_by_me
        FROM posts p
        JOIN users a ON a.id = p.author_id
        LEFT JOIN user_profiles ap ON ap.user_id = a.id
        WHERE {VISIBLE_TO_VIEWER} AND {filter}
        "#,
        author = summary_columns("a", "ap", "author"),
    )
}

fn post_from_row(row: &SqliteRow) -> Result<PostResponse, ServiceError> {
    let visibility: String = row.try_get("visibility")?;
    Ok(PostResponse {
        id: row.try_get("public_id")?,
        author: summary_from_row(row, "author")?,
        content: row.try_get("content")?,
        image_url: row.try_get("image_url")?,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| ServiceError::internal(format!("unknown visibility {visibility}")))?,
        like_count: row.try_get("like_count")?,
        comment_count: row.try_get("comment_count")?,
        share_count: row.try_get("share_count")?,
        liked_by_me: row.try_get("liked_by_me")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Resolve a post id for the viewer. Hidden posts are reported as missing.
pub async fn visible_post(
    pool: &SqlitePool,
    viewer_id: i64,
    post_id: &str,
) -> Result<PostRef, ServiceError> {
    let sql = format!(
        "SELECT p.id, p.public_id, p.author_id FROM posts p WHERE p.public_id = ?2 AND {VISIBLE_TO_VIEWER}"
    );
    sqlx::query_as(&sql)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("post not found"))
}

pub async fn get_post(
    pool: &SqlitePool,
    viewer_id: i64,
    post_id: &str,
) -> Result<PostResponse, ServiceError> {
    let sql = select_posts("p.public_id = ?2");
    let row = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("post not found"))?;

    post_from_row(&row)
}

pub async fn create_post(
    pool: &SqlitePool,
    author: &User,
    request: CreatePostRequest,
) -> Result<PostResponse, ServiceError> {
    let content = required_text("content", &request.content, MAX_POST_LENGTH)?;
    let image_url = optional_http_url("image_url", request.image_url.as_deref())?;
    let visibility = request.visibility.unwrap_or(Visibility::Public);

    let public_id = new_public_id();
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO posts (public_id, author_id, content, image_url, visibility, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(author.id)
    .bind(&content)
    .bind(&image_url)
    .bind(visibility.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(post = %public_id, author = %author.public_id, "post created");
    get_post(pool, author.id, &public_id).await
}

pub async fn update_post(
    pool: &SqlitePool,
    author: &User,
    post_id: &str,
    request: UpdatePostRequest,
) -> Result<PostResponse, ServiceError> {
    let post = visible_post(pool, author.id, post_id).await?;
    if post.author_id != author.id {
        return Err(ServiceError::forbidden("only the author can edit this post"));
    }

    let content = request
        .content
        .as_deref()
        .map(|content| required_text("content", content, MAX_POST_LENGTH))
        .transpose()?;
    let image_url = request
        .image_url
        .map(|url| optional_http_url("image_url", url.as_deref()))
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE posts SET
            content = COALESCE(?, content),
            image_url = CASE WHEN ? THEN ? ELSE image_url END,
            visibility = COALESCE(?, visibility),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&content)
    .bind(image_url.is_some())
    .bind(image_url.flatten())
    .bind(request.visibility.map(|v| v.as_str()))
    .bind(now_timestamp())
    .bind(post.id)
    .execute(pool)
    .await?;

    info!(post = %post.public_id, "post updated");
    get_post(pool, author.id, &post.public_id).await
}

/// Authors delete their own posts, admins any post. Engagement rows cascade;
/// notifications pointing at the post are removed in the same transaction.
pub async fn delete_post(pool: &SqlitePool, user: &User, post_id: &str) -> Result<(), ServiceError> {
    let post = visible_post(pool, user.id, post_id).await?;
    if post.author_id != user.id && !user.role.is_admin() {
        return Err(ServiceError::forbidden("only the author can delete this post"));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(post.id)
        .execute(&mut *tx)
        .await?;
    let notifications = delete_for_entity(&mut *tx, "post", &post.public_id).await?;
    tx.commit().await?;

    info!(post = %post.public_id, by = %user.public_id, notifications, "post deleted");
    Ok(())
}

/// Everything the viewer can see, newest first.
pub async fn feed(
    pool: &SqlitePool,
    viewer_id: i64,
    page: Page,
) -> Result<Vec<PostResponse>, ServiceError> {
    let sql = format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
        select_posts("1 = 1")
    );
    let rows = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(post_from_row).collect()
}

pub async fn user_posts(
    pool: &SqlitePool,
    viewer_id: i64,
    user_id: &str,
    page: Page,
) -> Result<Vec<PostResponse>, ServiceError> {
    let author_id = resolve_user_id(pool, user_id).await?;
    let sql = format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT ?3 OFFSET ?4",
        select_posts("p.author_id = ?2")
    );
    let rows = sqlx::query(&sql)
        .bind(viewer_id)
        .bind(author_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(post_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{connect_users, create_test_db, create_user};

    fn request(content: &str, visibility: Visibility) -> CreatePostRequest {
        CreatePostRequest {
            content: content.into(),
            image_url: None,
            visibility: Some(visibility),
        }
    }

    #[tokio::test]
    async fn create_validates_and_returns_author_summary() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;

        let post = create_post(&pool, &alice, request("  Hello campus  ", Visibility::Public))
            .await
            .unwrap();
        assert_eq!(post.content, "Hello campus");
        assert_eq!(post.author.full_name, "Alice");
        assert_eq!(post.like_count, 0);
        assert!(!post.liked_by_me);

        assert!(matches!(
            create_post(&pool, &alice, request("   ", Visibility::Public)).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            create_post(
                &pool,
                &alice,
                request(&"x".repeat(MAX_POST_LENGTH + 1), Visibility::Public)
            )
            .await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn connection_posts_are_hidden_from_strangers() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let carol = create_user(&pool, "carol@example.edu", "Carol").await;
        connect_users(&pool, alice.id, bob.id).await;

        let private = create_post(&pool, &alice, request("friends only", Visibility::Connections))
            .await
            .unwrap();
        create_post(&pool, &alice, request("hello world", Visibility::Public))
            .await
            .unwrap();

        assert!(get_post(&pool, bob.id, &private.id).await.is_ok());
        assert!(matches!(
            get_post(&pool, carol.id, &private.id).await,
            Err(ServiceError::NotFound(_))
        ));

        assert_eq!(feed(&pool, bob.id, Page::default()).await.unwrap().len(), 2);
        let stranger_feed = feed(&pool, carol.id, Page::default()).await.unwrap();
        assert_eq!(stranger_feed.len(), 1);
        assert_eq!(stranger_feed[0].content, "hello world");

        let listed = user_posts(&pool, carol.id, &alice.public_id, Page::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn feed_is_newest_first_and_paginated() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        for n in 0..3 {
            create_post(&pool, &alice, request(&format!("post {n}"), Visibility::Public))
                .await
                .unwrap();
        }

        let first_page = feed(&pool, alice.id, Page::new(Some(2), None)).await.unwrap();
        assert_eq!(
            first_page.iter().map(|p| p.content.as_str()).collect::<Vec<_>>(),
            vec!["post 2", "post 1"]
        );
        let second_page = feed(&pool, alice.id, Page::new(Some(2), Some(2))).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].content, "post 0");
    }

    #[tokio::test]
    async fn only_authors_edit_and_admins_may_delete() {
        let (pool, _dir) = create_test_db().await;
        let alice = create_user(&pool, "alice@example.edu", "Alice").await;
        let bob = create_user(&pool, "bob@example.edu", "Bob").await;
        let post = create_post(&pool, &alice, request("draft", Visibility::Public))
            .await
            .unwrap();

        let edit = UpdatePostRequest {
            content: Some("final".into()),
            image_url: Some(Some("https://img.example.edu/x.png".into())),
            visibility: Some(Visibility::Connections),
        };
        let updated = update_post(&pool, &alice, &post.id, edit).await.unwrap();
        assert_eq!(updated.content, "final");
        assert_eq!(updated.visibility, Visibility::Connections);
        assert!(updated.image_url.is_some());

        let cleared = update_post(
            &pool,
            &alice,
            &post.id,
            UpdatePostRequest {
                image_url: Some(None),
                visibility: Some(Visibility::Public),
                ..UpdatePostRequest::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.image_url, None);
        assert_eq!(cleared.content, "final");

        assert!(matches!(
            update_post(&pool, &bob, &post.id, UpdatePostRequest::default()).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            delete_post(&pool, &bob, &post.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let mut admin = bob.clone();
        admin.role = campusnet_auth::Role::Admin;
        delete_post(&pool, &admin, &post.id).await.unwrap();
        assert!(matches!(
            get_post(&pool, alice.id, &post.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
