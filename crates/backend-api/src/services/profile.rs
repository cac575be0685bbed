use std::collections::HashSet;

use campusnet_database::now_timestamp;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::connection::{connection_count, status_between};
use super::{resolve_user_id, summary_columns, summary_from_row, ServiceError};
use crate::routes::models::{ProfileResponse, UpdateProfileRequest, UserSummary};
use crate::util::{optional_http_url, optional_text, Page};

pub const MAX_HEADLINE_LENGTH: usize = 120;
pub const MAX_ABOUT_LENGTH: usize = 2000;
pub const MAX_SHORT_FIELD_LENGTH: usize = 100;
pub const MAX_SKILLS: usize = 50;
pub const MAX_SKILL_LENGTH: usize = 50;
const MIN_GRADUATION_YEAR: i64 = 1900;
const MAX_GRADUATION_YEAR: i64 = 2100;

/// Stored profile columns, before viewer specific fields are added.
#[derive(Debug, Clone)]
pub struct StoredProfile {
    pub user: UserSummary,
    pub about: Option<String>,
    pub program: Option<String>,
    pub graduation_year: Option<i64>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub skills: Vec<String>,
    pub updated_at: String,
}

fn profile_from_row(row: &SqliteRow) -> Result<StoredProfile, ServiceError> {
    let skills: Option<String> = row.try_get("skills")?;
    Ok(StoredProfile {
        user: summary_from_row(row, "user")?,
        about: row.try_get("about")?,
        program: row.try_get("program")?,
        graduation_year: row.try_get("graduation_year")?,
        location: row.try_get("location")?,
        website_url: row.try_get("website_url")?,
        skills: match skills {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        },
        updated_at: row.try_get("profile_updated_at")?,
    })
}

pub async fn stored_profile(pool: &SqlitePool, user_id: i64) -> Result<StoredProfile, ServiceError> {
    let sql = format!(
        r#"
        SELECT {user}, pr.about, pr.program, pr.graduation_year, pr.location, pr.website_url,
               pr.skills, COALESCE(pr.updated_at, u.updated_at) AS profile_updated_at
        FROM users u
        LEFT JOIN user_profiles pr ON pr.user_id = u.id
        WHERE u.id = ?
        "#,
        user = summary_columns("u", "pr", "user"),
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("user not found"))?;

    profile_from_row(&row)
}

pub async fn get_profile(
    pool: &SqlitePool,
    viewer_id: i64,
    user_id: i64,
) -> Result<ProfileResponse, ServiceError> {
    let stored = stored_profile(pool, user_id).await?;
    let connection_count = connection_count(pool, user_id).await?;
    let (connection_status, _) = status_between(pool, viewer_id, user_id).await?;

    Ok(ProfileResponse {
        user: stored.user,
        about: stored.about,
        program: stored.program,
        graduation_year: stored.graduation_year,
        location: stored.location,
        website_url: stored.website_url,
        skills: stored.skills,
        connection_count,
        connection_status,
        updated_at: stored.updated_at,
    })
}

pub async fn get_profile_by_public_id(
    pool: &SqlitePool,
    viewer_id: i64,
    public_id: &str,
) -> Result<ProfileResponse, ServiceError> {
    let user_id = resolve_user_id(pool, public_id).await?;
    get_profile(pool, viewer_id, user_id).await
}

/// Partial update: absent fields are kept, empty strings clear a field and
/// `skills` replaces the whole list.
pub async fn update_profile(
    pool: &SqlitePool,
    user_id: i64,
    request: UpdateProfileRequest,
) -> Result<ProfileResponse, ServiceError> {
    let current = stored_profile(pool, user_id).await?;

    let headline = match request.headline.as_deref() {
        Some(value) => optional_text("headline", Some(value), MAX_HEADLINE_LENGTH)?,
        None => current.user.headline,
    };
    let about = match request.about.as_deref() {
        Some(value) => optional_text("about", Some(value), MAX_ABOUT_LENGTH)?,
        None => current.about,
    };
    let department = match request.department.as_deref() {
        Some(value) => optional_text("department", Some(value), MAX_SHORT_FIELD_LENGTH)?,
        None => current.user.department,
    };
    let program = match request.program.as_deref() {
        Some(value) => optional_text("program", Some(value), MAX_SHORT_FIELD_LENGTH)?,
        None => current.program,
    };
    let location = match request.location.as_deref() {
        Some(value) => optional_text("location", Some(value), MAX_SHORT_FIELD_LENGTH)?,
        None => current.location,
    };
    let avatar_url = match request.avatar_url.as_deref() {
        Some(value) => optional_http_url("avatar_url", Some(value))?,
        None => current.user.avatar_url,
    };
    let website_url = match request.website_url.as_deref() {
        Some(value) => optional_http_url("website_url", Some(value))?,
        None => current.website_url,
    };
    let graduation_year = match request.graduation_year {
        Some(Some(year)) if !(MIN_GRADUATION_YEAR..=MAX_GRADUATION_YEAR).contains(&year) => {
            return Err(ServiceError::bad_request(format!(
                "graduation_year must be between {MIN_GRADUATION_YEAR} and {MAX_GRADUATION_YEAR}"
            )));
        }
        Some(value) => value,
        None => current.graduation_year,
    };
    let skills = match request.skills {
        Some(skills) => normalize_skills(&skills)?,
        None => current.skills,
    };

    sqlx::query(
        r#"
        INSERT INTO user_profiles
            (user_id, headline, about, department, program, graduation_year, location,
             avatar_url, website_url, skills, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            headline = excluded.headline,
            about = excluded.about,
            department = excluded.department,
            program = excluded.program,
            graduation_year = excluded.graduation_year,
            location = excluded.location,
            avatar_url = excluded.avatar_url,
            website_url = excluded.website_url,
            skills = excluded.skills,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(&headline)
    .bind(&about)
    .bind(&department)
    .bind(&program)
    .bind(graduation_year)
    .bind(&location)
    .bind(&avatar_url)
    .bind(&website_url)
    .bind(serde_json::to_string(&skills)?)
    .bind(now_timestamp())
    .execute(pool)
    .await?;

    info!(user = %current.user.id, "profile updated");
    get_profile(pool, user_id, user_id).await
}

/// Trim and collapse each skill, drop blanks and case-insensitive
/// duplicates, keep first-seen order.
pub fn normalize_skills(skills: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();

    for skill in skills {
        let skill = skill.split_whitespace().collect::<Vec<_>>().join(" ");
        if skill.is_empty() {
            continue;
        }
        if skill.chars().count() > MAX_SKILL_LENGTH {
            return Err(ServiceError::bad_request(format!(
                "skills must be at most {MAX_SKILL_LENGTH} characters each"
            )));
        }
        if seen.insert(skill.to_lowercase()) {
            normalized.push(skill);
        }
    }

    if normalized.len() > MAX_SKILLS {
        return Err(ServiceError::bad_request(format!(
            "at most {MAX_SKILLS} skills are allowed"
        )));
    }
    Ok(normalized)
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Match `query` against name, headline, department and skills; optionally
/// restrict to one department.
pub async fn search(
    pool: &SqlitePool,
    query: Option<&str>,
    department: Option<&str>,
    page: Page,
) -> Result<Vec<UserSummary>, ServiceError> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);
    let department = department.map(str::trim).filter(|d| !d.is_empty());

    let sql = format!(
        r#"
        SELECT {user}
        FROM users u
        LEFT JOIN user_profiles pr ON pr.user_id = u.id
        WHERE (?1 IS NULL
               OR u.full_name LIKE ?1 ESCAPE '\'
               OR pr.headline LIKE ?1 ESCAPE '\'
               OR pr.department LIKE ?1 ESCAPE '\'
               OR EXISTS (SELECT 1 FROM json_each(pr.skills) skill
                          WHERE skill.value LIKE ?1 ESCAPE '\'))
          AND (?2 IS NULL OR pr.department = ?2 COLLATE NOCASE)
        ORDER BY u.full_name COLLATE NOCASE, u.id
        LIMIT ?3 OFFSET ?4
        "#,
        user = summary_columns("u", "pr", "user"),
    );

    let rows = sqlx::query(&sql)
        .bind(pattern)
        .bind(department)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| summary_from_row(row, "user"))
        .collect::<Result<_, _>>()?)
}
