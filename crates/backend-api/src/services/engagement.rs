//! Likes, comments and shares. Every operation first resolves the post
//! through [`visible_post`], so hidden posts behave as missing ones.

use campusnet_auth::User;
use campusnet_database::{new_public_id, now_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::notification::{NewNotification, Notifier};
use super::post::{visible_post, PostRef, VISIBLE_TO_VIEWER};
use super::{summary_columns, summary_from_row, ServiceError};
use crate::routes::models::{
    CommentResponse, LikeResponse, NotificationKind, ShareResponse, UserSummary,
};
use crate::util::{optional_text, required_text, Page};

pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_COMMENTARY_LENGTH: usize = 1000;

fn notify_author(
    notifier: &Notifier,
    post: &PostRef,
    actor: &User,
    kind: NotificationKind,
    message: String,
) {
    notifier.notify(NewNotification {
        recipient_id: post.author_id,
        actor_id: Some(actor.id),
        kind,
        entity_type: Some("post"),
        entity_id: Some(post.public_id.clone()),
        message,
    });
}

async fn like_count(pool: &SqlitePool, post_id: i64) -> Result<i64, ServiceError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(pool)
        .await?)
}

/// Idempotent. Only the first like notifies the author.
pub async fn like(
    pool: &SqlitePool,
    notifier: &Notifier,
    user: &User,
    post_id: &str,
) -> Result<LikeResponse, ServiceError> {
    let post = visible_post(pool, user.id, post_id).await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(post.id)
    .bind(user.id)
    .bind(now_timestamp())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        debug!(post = %post.public_id, user = %user.public_id, "post liked");
        notify_author(
            notifier,
            &post,
            user,
            NotificationKind::PostLiked,
            format!("{} liked your post", user.full_name),
        );
    }

    Ok(LikeResponse {
        liked: true,
        like_count: like_count(pool, post.id).await?,
    })
}

pub async fn unlike(pool: &SqlitePool, user: &User, post_id: &str) -> Result<LikeResponse, ServiceError> {
    let post = visible_post(pool, user.id, post_id).await?;

    sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post.id)
        .bind(user.id)
        .execute(pool)
        .await?;

    Ok(LikeResponse {
        liked: false,
        like_count: like_count(pool, post.id).await?,
    })
}

pub async fn likers(
    pool: &SqlitePool,
    viewer_id: i64,
    post_id: &str,
    page: Page,
) -> Result<Vec<UserSummary>, ServiceError> {
    let post = visible_post(pool, viewer_id, post_id).await?;
    let sql = format!(
        r#"
        SELECT {user}
        FROM post_likes l
        JOIN users u ON u.id = l.user_id
        LEFT JOIN user_profiles pr ON pr.user_id = u.id
        WHERE l.post_id = ?
        ORDER BY l.created_at DESC, l.id DESC
        LIMIT ? OFFSET ?
        "#,
        user = summary_columns("u", "pr", "user"),
    );
    let rows = sqlx::query(&sql)
        .bind(post.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| summary_from_row(row, "user"))
        .collect::<Result<_, _>>()?)
}

fn select_comments(filter: &str) -> String {
    format!(
        r#"
        SELECT c.public_id, p.public_id AS post_public_id, c.content, c.created_at, c.updated_at,
               {author}
        FROM post_comments c
        JOIN posts p ON p.id = c.post_id
        JOIN users a ON a.id = c.author_id
        LEFT JOIN user_profiles ap ON ap.user_id = a.id
        WHERE {filter}
        "#,
        author = summary_columns("a", "ap", "author"),
    )
}

fn comment_from_row(row: &SqliteRow) -> Result<CommentResponse, ServiceError> {
    Ok(CommentResponse {
        id: row.try_get("public_id")?,
        post_id: row.try_get("post_public_id")?,
        author: summary_from_row(row, "author")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn comment_by_public_id(pool: &SqlitePool, comment_id: &str) -> Result<CommentResponse, ServiceError> {
    let row = sqlx::query(&select_comments("c.public_id = ?"))
        .bind(comment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("comment not found"))?;

    comment_from_row(&row)
}

#[derive(Debug, sqlx::FromRow)]
struct CommentRef {
    id: i64,
    public_id: String,
    author_id: i64,
    post_author_id: i64,
}

/// A comment on a post the viewer can see.
async fn visible_comment(
    pool: &SqlitePool,
    viewer_id: i64,
    comment_id: &str,
) -> Result<CommentRef, ServiceError> {
    let sql = format!(
        r#"
        SELECT c.id, c.public_id, c.author_id, p.author_id AS post_author_id
        FROM post_comments c
        JOIN posts p ON p.id = c.post_id
        WHERE c.public_id = ?2 AND {VISIBLE_TO_VIEWER}
        "#
    );
    sqlx::query_as(&sql)
        .bind(viewer_id)
        .bind(comment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("comment not found"))
}

pub async fn create_comment(
    pool: &SqlitePool,
    notifier: &Notifier,
    user: &User,
    post_id: &str,
    content: &str,
) -> Result<CommentResponse, ServiceError> {
    let post = visible_post(pool, user.id, post_id).await?;
    let content = required_text("content", content, MAX_COMMENT_LENGTH)?;

    let public_id = new_public_id();
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO post_comments (public_id, post_id, author_id, content, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(post.id)
    .bind(user.id)
    .bind(&content)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    info!(comment = %public_id, post = %post.public_id, "comment created");
    notify_author(
        notifier,
        &post,
        user,
        NotificationKind::PostCommented,
        format!("{} commented on your post", user.full_name),
    );

    comment_by_public_id(pool, &public_id).await
}

/// Oldest first.
pub async fn list_comments(
    pool: &SqlitePool,
    viewer_id: i64,
    post_id: &str,
    page: Page,
) -> Result<Vec<CommentResponse>, ServiceError> {
    let post = visible_post(pool, viewer_id, post_id).await?;
    let sql = format!(
        "{} ORDER BY c.created_at ASC, c.id ASC LIMIT ? OFFSET ?",
        select_comments("c.post_id = ?")
    );
    let rows = sqlx::query(&sql)
        .bind(post.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(comment_from_row).collect()
}

pub async fn update_comment(
    pool: &SqlitePool,
    user: &User,
    comment_id: &str,
    content: &str,
) -> Result<CommentResponse, ServiceError> {
    let comment = visible_comment(pool, user.id, comment_id).await?;
    if comment.author_id != user.id {
        return Err(ServiceError::forbidden("only the author can edit this comment"));
    }
    let content = required_text("content", content, MAX_COMMENT_LENGTH)?;

    sqlx::query("UPDATE post_comments SET content = ?, updated_at = ? WHERE id = ?")
        .bind(&content)
        .bind(now_timestamp())
        .bind(comment.id)
        .execute(pool)
        .await?;

    comment_by_public_id(pool, &comment.public_id).await
}

/// Comment authors, the post's author and admins may delete.
pub async fn delete_comment(pool: &SqlitePool, user: &User, comment_id: &str) -> Result<(), ServiceError> {
    let comment = visible_comment(pool, user.id, comment_id).await?;
    let allowed =
        comment.author_id == user.id || comment.post_author_id == user.id || user.role.is_admin();
    if !allowed {
        return Err(ServiceError::forbidden("not allowed to delete this comment"));
    }

    sqlx::query("DELETE FROM post_comments WHERE id = ?")
        .bind(comment.id)
        .execute(pool)
        .await?;

    info!(comment = %comment.public_id, by = %user.public_id, "comment deleted");
    Ok(())
}

fn select_shares(filter: &str) -> String {
    format!(
        r#"
        SELECT s.public_id, p.public_id AS post_public_id, s.commentary, s.created_at,
               {sharer}
        FROM post_shares s
        JOIN posts p ON p.id = s.post_id
        JOIN users u ON u.id = s.user_id
        LEFT JOIN user_profiles pr ON pr.user_id = u.id
        WHERE {filter}
        "#,
        sharer = summary_columns("u", "pr", "sharer"),
    )
}

fn share_from_row(row: &SqliteRow) -> Result<ShareResponse, ServiceError> {
    Ok(ShareResponse {
        id: row.try_get("public_id")?,
        post_id: row.try_get("post_public_id")?,
        user: summary_from_row(row, "sharer")?,
        commentary: row.try_get("commentary")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn share_post(
    pool: &SqlitePool,
    notifier: &Notifier,
    user: &User,
    post_id: &str,
    commentary: Option<&str>,
) -> Result<ShareResponse, ServiceError> {
    let post = visible_post(pool, user.id, post_id).await?;
    let commentary = optional_text("commentary", commentary, MAX_COMMENTARY_LENGTH)?;

    let public_id = new_public_id();
    sqlx::query(
        "INSERT INTO post_shares (public_id, post_id, user_id, commentary, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(post.id)
    .bind(user.id)
    .bind(&commentary)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    info!(share = %public_id, post = %post.public_id, "post shared");
    notify_author(
        notifier,
        &post,
        user,
        NotificationKind::PostShared,
        format!("{} shared your post", user.full_name),
    );

    let row = sqlx::query(&select_shares("s.public_id = ?"))
        .bind(&public_id)
        .fetch_one(pool)
        .await?;
    share_from_row(&row)
}

pub async fn list_shares(
    pool: &SqlitePool,
    viewer_id: i64,
    post_id: &str,
    page: Page,
) -> Result<Vec<ShareResponse>, ServiceError> {
    let post = visible_post(pool, viewer_id, post_id).await?;
    let sql = format!(
        "{} ORDER BY s.created_at DESC, s.id DESC LIMIT ? OFFSET ?",
        select_shares("s.post_id = ?")
    );
    let rows = sqlx::query(&sql)
        .bind(post.id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(share_from_row).collect()
}
