use std::fmt;
use std::str::FromStr;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use campusnet_config::AuthConfig;
use campusnet_database::{is_unique_violation, new_public_id, now_timestamp, timestamp_after};
use chrono::Duration;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info};

pub const PASSWORD_PROVIDER: &str = "password";
pub const MAX_FULL_NAME_LENGTH: usize = 100;
const MAX_PASSWORD_LENGTH: usize = 256;
const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
    min_password_length: usize,
    allowed_email_domains: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error("email domain is not allowed to register")]
    EmailDomainNotAllowed,
    #[error("user not found")]
    UserNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Faculty,
    Alumni,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Alumni => "alumni",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "alumni" => Ok(Role::Alumni),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(AuthError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: String,
}

/// Input for [`Authenticator::register`].
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub role: Option<Role>,
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    public_id: String,
    email: String,
    full_name: String,
    role: String,
    created_at: String,
    updated_at: String,
    last_login_at: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            public_id: row.public_id,
            email: row.email,
            full_name: row.full_name,
            role: row.role.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, public_id, email, full_name, role, created_at, updated_at, last_login_at";

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let ttl_seconds = i64::try_from(config.session_ttl_seconds).unwrap_or(i64::MAX);
        let session_ttl = Duration::try_seconds(ttl_seconds).unwrap_or(Duration::MAX);

        Self {
            pool,
            session_ttl,
            min_password_length: config.min_password_length,
            allowed_email_domains: config.allowed_email_domains,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Create the user, its password identity and an empty profile in one
    /// transaction, then open a session for it.
    pub async fn register(
        &self,
        account: NewAccount<'_>,
    ) -> Result<(User, AuthSession), AuthError> {
        let role = account.role.unwrap_or(Role::Student);
        if role.is_admin() {
            return Err(AuthError::InvalidInput(
                "the admin role cannot be self-assigned".into(),
            ));
        }

        let user = self
            .create_account(account.email, account.password, account.full_name, role)
            .await?;
        let session = self.issue_session(user.id).await?;
        info!(user = %user.public_id, role = %user.role, "registered new account");
        Ok((user, session))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, AuthSession), AuthError> {
        let email = normalize_email(email);

        let secret: Option<(i64, Option<String>)> = sqlx::query_as(
            "SELECT user_id, secret FROM user_identities WHERE provider = ? AND provider_uid = ?",
        )
        .bind(PASSWORD_PROVIDER)
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, Some(secret))) = secret else {
            return Err(AuthError::InvalidCredentials);
        };

        verify_hash(password, &secret)?;

        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(now_timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let user = self.user(user_id).await?;
        let session = self.issue_session(user_id).await?;
        debug!(user = %user.public_id, "password login succeeded");
        Ok((user, session))
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        let Some((user_id, expires_at)) = row else {
            return Err(AuthError::SessionNotFound);
        };

        if expires_at <= now_timestamp() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.user(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke every session of the user. Returns how many were removed.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Replace the password after checking the current one. Every session
    /// except `keep_token` is revoked.
    pub async fn change_password(
        &self,
        user_id: i64,
        keep_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.verify_password(user_id, current_password).await?;
        self.validate_password(new_password)?;

        let hash = hash_password(new_password)?;
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE user_identities SET secret = ?, updated_at = ? WHERE user_id = ? AND provider = ?",
        )
        .bind(&hash)
        .bind(&now)
        .bind(user_id)
        .bind(PASSWORD_PROVIDER)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token <> ?")
            .bind(user_id)
            .bind(keep_token)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        info!(user_id, revoked, "password changed");
        Ok(())
    }

    pub async fn verify_password(&self, user_id: i64, password: &str) -> Result<(), AuthError> {
        let secret: Option<Option<String>> = sqlx::query_scalar(
            "SELECT secret FROM user_identities WHERE user_id = ? AND provider = ?",
        )
        .bind(user_id)
        .bind(PASSWORD_PROVIDER)
        .fetch_optional(&self.pool)
        .await?;

        match secret.flatten() {
            Some(secret) => verify_hash(password, &secret),
            None => Err(AuthError::InvalidCredentials),
        }
    }

    /// Remove the account after password confirmation. Foreign keys cascade
    /// to every row the user owns or takes part in; notifications that point
    /// at the user's posts or at the user are removed explicitly.
    pub async fn delete_account(&self, user_id: i64, password: &str) -> Result<User, AuthError> {
        self.verify_password(user_id, password).await?;
        let user = self.user(user_id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM notifications
             WHERE (entity_type = 'post' AND entity_id IN (SELECT public_id FROM posts WHERE author_id = ?))
                OR (entity_type = 'user' AND entity_id = ?)",
        )
        .bind(user_id)
        .bind(&user.public_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(user = %user.public_id, "account deleted");
        Ok(user)
    }

    /// Create an administrator, or promote an existing account with the same email.
    pub async fn create_admin(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<User, AuthError> {
        let normalized = normalize_email(email);
        if let Some(user) = self.user_by_email(&normalized).await? {
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(Role::Admin.as_str())
                .bind(now_timestamp())
                .bind(user.id)
                .execute(&self.pool)
                .await?;
            info!(user = %user.public_id, "promoted existing account to admin");
            return self.user(user.id).await;
        }

        let user = self
            .create_account(email, password, full_name, Role::Admin)
            .await?;
        info!(user = %user.public_id, "created admin account");
        Ok(user)
    }

    pub async fn user(&self, user_id: i64) -> Result<User, AuthError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(AuthError::UserNotFound)?.try_into()
    }

    pub async fn user_by_public_id(&self, public_id: &str) -> Result<User, AuthError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE public_id = ?"))
                .bind(public_id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(AuthError::UserNotFound)?.try_into()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::try_from).transpose()
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        self.check_email_domain(&email)?;
        self.validate_password(password)?;
        let full_name = validate_full_name(full_name)?;

        let password_hash = hash_password(password)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(AuthError::UserExists);
        }

        let user = insert_user(&mut tx, &email, &full_name, role).await?;
        let now = now_timestamp();

        sqlx::query(
            "INSERT INTO user_identities (user_id, provider, provider_uid, secret, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(PASSWORD_PROVIDER)
        .bind(&email)
        .bind(&password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_profiles (user_id, updated_at) VALUES (?, ?)")
            .bind(user.id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    fn check_email_domain(&self, email: &str) -> Result<(), AuthError> {
        if self.allowed_email_domains.is_empty() {
            return Ok(());
        }

        let domain = email.rsplit_once('@').map(|(_, domain)| domain).unwrap_or("");
        let allowed = self.allowed_email_domains.iter().any(|allowed| {
            domain == allowed
                || domain
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });

        if allowed {
            Ok(())
        } else {
            Err(AuthError::EmailDomainNotAllowed)
        }
    }

    fn validate_password(&self, password: &str) -> Result<(), AuthError> {
        let length = password.chars().count();
        if length < self.min_password_length {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                self.min_password_length
            )));
        }
        if length > MAX_PASSWORD_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "password must be at most {MAX_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(())
    }

    async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_session_token();
        let expires_at = timestamp_after(self.session_ttl);

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(now_timestamp())
        .bind(&expires_at)
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }
}

async fn insert_user(
    tx: &mut Transaction<'_, Sqlite>,
    email: &str,
    full_name: &str,
    role: Role,
) -> Result<User, AuthError> {
    let now = now_timestamp();
    let public_id = new_public_id();

    let inserted = sqlx::query(
        "INSERT INTO users (public_id, email, full_name, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(email)
    .bind(full_name)
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await
    .map_err(|error| {
        if is_unique_violation(&error) {
            AuthError::UserExists
        } else {
            AuthError::Database(error)
        }
    })?;

    Ok(User {
        id: inserted.last_insert_rowid(),
        public_id,
        email: email.to_owned(),
        full_name: full_name.to_owned(),
        role,
        created_at: now.clone(),
        updated_at: now,
        last_login_at: None,
    })
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let invalid = || AuthError::InvalidInput("email address is invalid".into());

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid());
    }
    Ok(())
}

fn validate_full_name(full_name: &str) -> Result<String, AuthError> {
    let trimmed = full_name.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > MAX_FULL_NAME_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "full name must be between 1 and {MAX_FULL_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_hash(password: &str, secret: &str) -> Result<(), AuthError> {
    let stored_hash = PasswordHash::new(secret)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &stored_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_common_addresses() {
        assert!(validate_email("ada@cs.university.edu").is_ok());
        assert!(validate_email("first.last+tag@example.org").is_ok());
    }

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        for email in ["", "no-at-sign", "@example.edu", "a@b", "a@@b.edu", "a b@c.edu", "a@.edu", "a@b..edu"] {
            assert!(validate_email(email).is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn email_normalisation_trims_and_lowercases() {
        assert_eq!(normalize_email("  Ada@Example.EDU "), "ada@example.edu");
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Faculty".parse::<Role>().unwrap(), Role::Faculty);
        assert!("dean".parse::<Role>().is_err());
        assert_eq!(Role::Alumni.to_string(), "alumni");
    }

    #[test]
    fn full_name_is_trimmed_and_bounded() {
        assert_eq!(validate_full_name("  Ada Lovelace ").unwrap(), "Ada Lovelace");
        assert!(validate_full_name("   ").is_err());
        assert!(validate_full_name(&"x".repeat(MAX_FULL_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn session_tokens_are_url_safe_and_unique() {
        let first = generate_session_token();
        let second = generate_session_token();
        assert_eq!(first.len(), 43);
        assert_ne!(first, second);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
