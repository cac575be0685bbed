//! Retention purge for data that expires: auth sessions, notifications,
//! idle advisor sessions and old news items.

use campusnet_config::AppConfig;
use chrono::Duration;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::time::{now_timestamp, timestamp_before};
use crate::DatabaseResult;

/// Age limits applied by [`purge_expired`]. A value of zero keeps rows forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub advisor_session_days: u32,
    pub news_days: u32,
}

impl RetentionPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            advisor_session_days: config.advisor.session_ttl_days,
            news_days: config.news.retention_days,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: u64,
    pub notifications: u64,
    pub advisor_sessions: u64,
    pub news: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.sessions + self.notifications + self.advisor_sessions + self.news
    }
}

pub async fn purge_expired(pool: &SqlitePool, policy: RetentionPolicy) -> DatabaseResult<PurgeReport> {
    let now = now_timestamp();
    let mut report = PurgeReport::default();

    report.sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(&now)
        .execute(pool)
        .await?
        .rows_affected();

    report.notifications = sqlx::query("DELETE FROM notifications WHERE expires_at <= ?")
        .bind(&now)
        .execute(pool)
        .await?
        .rows_affected();

    if policy.advisor_session_days > 0 {
        let cutoff = timestamp_before(Duration::days(i64::from(policy.advisor_session_days)));
        report.advisor_sessions = sqlx::query("DELETE FROM advisor_sessions WHERE updated_at < ?")
            .bind(&cutoff)
            .execute(pool)
            .await?
            .rows_affected();
    }

    if policy.news_days > 0 {
        let cutoff = timestamp_before(Duration::days(i64::from(policy.news_days)));
        report.news =
            sqlx::query("DELETE FROM news WHERE COALESCE(published_at, scraped_at) < ?")
                .bind(&cutoff)
                .execute(pool)
                .await?
                .rows_affected();
    }

    if report.total() > 0 {
        info!(
            sessions = report.sessions,
            notifications = report.notifications,
            advisor_sessions = report.advisor_sessions,
            news = report.news,
            "purged expired rows"
        );
    } else {
        debug!("retention purge found nothing to delete");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{new_public_id, timestamp_after};
    use crate::{initialize_database, DatabaseConfig};
    use tempfile::TempDir;

    async fn database() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite:{}", temp_dir.path().join("purge.db").display()),
            max_connections: 1,
        };
        let pool = initialize_database(&config).await.unwrap();
        (pool, temp_dir)
    }

    async fn insert_user(pool: &SqlitePool) -> i64 {
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO users (public_id, email, full_name, role, created_at, updated_at) VALUES (?, ?, 'Test', 'student', ?, ?)",
        )
        .bind(new_public_id())
        .bind(format!("{}@example.edu", new_public_id()))
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let (pool, _dir) = database().await;
        let user = insert_user(&pool).await;
        let now = now_timestamp();
        let past = timestamp_before(Duration::hours(1));
        let future = timestamp_after(Duration::hours(1));
        let ancient = timestamp_before(Duration::days(400));

        for (token, expires) in [("old", &past), ("live", &future)] {
            sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
                .bind(token)
                .bind(user)
                .bind(&now)
                .bind(expires)
                .execute(&pool)
                .await
                .unwrap();
        }

        for expires in [&past, &future] {
            sqlx::query(
                "INSERT INTO notifications (public_id, recipient_id, kind, message, created_at, expires_at) VALUES (?, ?, 'system', 'hi', ?, ?)",
            )
            .bind(new_public_id())
            .bind(user)
            .bind(&now)
            .bind(expires)
            .execute(&pool)
            .await
            .unwrap();
        }

        for updated in [&ancient, &now] {
            sqlx::query(
                "INSERT INTO advisor_sessions (public_id, user_id, title, created_at, updated_at) VALUES (?, ?, 'chat', ?, ?)",
            )
            .bind(new_public_id())
            .bind(user)
            .bind(updated)
            .bind(updated)
            .execute(&pool)
            .await
            .unwrap();
        }

        for (link, published) in [("https://a.example/1", Some(&ancient)), ("https://a.example/2", None)] {
            sqlx::query(
                "INSERT INTO news (public_id, source, title, link, published_at, scraped_at) VALUES (?, 'src', 'title', ?, ?, ?)",
            )
            .bind(new_public_id())
            .bind(link)
            .bind(published)
            .bind(&now)
            .execute(&pool)
            .await
            .unwrap();
        }

        let report = purge_expired(
            &pool,
            RetentionPolicy {
                advisor_session_days: 30,
                news_days: 60,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            PurgeReport {
                sessions: 1,
                notifications: 1,
                advisor_sessions: 1,
                news: 1,
            }
        );
        assert_eq!(report.total(), 4);
    }

    #[tokio::test]
    async fn zero_day_policy_keeps_history() {
        let (pool, _dir) = database().await;
        let user = insert_user(&pool).await;
        let ancient = timestamp_before(Duration::days(400));

        sqlx::query(
            "INSERT INTO advisor_sessions (public_id, user_id, title, created_at, updated_at) VALUES (?, ?, 'chat', ?, ?)",
        )
        .bind(new_public_id())
        .bind(user)
        .bind(&ancient)
        .bind(&ancient)
        .execute(&pool)
        .await
        .unwrap();

        let report = purge_expired(
            &pool,
            RetentionPolicy {
                advisor_session_days: 0,
                news_days: 0,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.advisor_sessions, 0);
    }
}
