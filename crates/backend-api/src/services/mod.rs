pub mod account;
pub mod advisor;
pub mod connection;
pub mod engagement;
pub mod error;
pub mod messaging;
pub mod news;
pub mod notification;
pub mod post;
pub mod profile;

#[cfg(test)]
pub mod test_utils;

pub use error::*;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::routes::models::UserSummary;

/// Select list for a [`UserSummary`] read from `users` aliased as `user`
/// joined with `user_profiles` aliased as `profile`. Columns are prefixed so
/// several summaries can share one row.
pub(crate) fn summary_columns(user: &str, profile: &str, prefix: &str) -> String {
    format!(
        "{user}.public_id AS {prefix}_public_id, \
         {user}.full_name AS {prefix}_full_name, \
         {user}.role AS {prefix}_role, \
         {profile}.headline AS {prefix}_headline, \
         {profile}.avatar_url AS {prefix}_avatar_url, \
         {profile}.department AS {prefix}_department"
    )
}

pub(crate) fn summary_from_row(row: &SqliteRow, prefix: &str) -> Result<UserSummary, sqlx::Error> {
    let column = |name: &str| format!("{prefix}_{name}");
    Ok(UserSummary {
        id: row.try_get(column("public_id").as_str())?,
        full_name: row.try_get(column("full_name").as_str())?,
        role: row.try_get(column("role").as_str())?,
        headline: row.try_get(column("headline").as_str())?,
        avatar_url: row.try_get(column("avatar_url").as_str())?,
        department: row.try_get(column("department").as_str())?,
    })
}

/// Like [`summary_from_row`] for a LEFT JOINed user that may be absent.
pub(crate) fn optional_summary_from_row(
    row: &SqliteRow,
    prefix: &str,
) -> Result<Option<UserSummary>, sqlx::Error> {
    let public_id: Option<String> = row.try_get(format!("{prefix}_public_id").as_str())?;
    match public_id {
        Some(_) => summary_from_row(row, prefix).map(Some),
        None => Ok(None),
    }
}

pub async fn user_summary(pool: &SqlitePool, user_id: i64) -> Result<UserSummary, ServiceError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users u LEFT JOIN user_profiles pr ON pr.user_id = u.id WHERE u.id = ?",
        summary_columns("u", "pr", "user")
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("user not found"))?;

    Ok(summary_from_row(&row, "user")?)
}

/// Internal id of a user addressed by public id.
pub async fn resolve_user_id(pool: &SqlitePool, public_id: &str) -> Result<i64, ServiceError> {
    sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("user not found"))
}
