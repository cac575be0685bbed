use campusnet_advisor::AdvisorError;
use campusnet_auth::AuthError;
use campusnet_news::NewsError;
use thiserror::Error;

use crate::ApiError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("advisor error: {0}")]
    Advisor(#[from] AdvisorError),
    #[error("news error: {0}")]
    News(#[from] NewsError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Database(db_err) => {
                tracing::error!(error = ?db_err, "database error");
                ApiError::internal_server_error("database operation failed")
            }
            ServiceError::Auth(auth_err) => ApiError::from(auth_err),
            ServiceError::Advisor(advisor_err) => ApiError::from(advisor_err),
            ServiceError::News(news_err) => ApiError::from(news_err),
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                ApiError::internal_server_error("internal error")
            }
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn lookup() -> Result<(), ServiceError> {
        Err::<(), _>(sqlx::Error::RowNotFound)?;
        Ok(())
    }

    #[test]
    fn sqlx_errors_convert_and_stay_private() {
        let error = lookup().unwrap_err();
        assert!(matches!(error, ServiceError::Database(_)));
        assert!(error.to_string().starts_with("database error:"));

        let api = ApiError::from(error);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "database operation failed");
    }

    #[test]
    fn domain_errors_keep_their_status() {
        let conflict = ApiError::from(ServiceError::from(AuthError::UserExists));
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let missing = ServiceError::not_found("post not found");
        assert_eq!(missing.to_string(), "not found: post not found");
        assert_eq!(ApiError::from(missing).status, StatusCode::NOT_FOUND);

        let unavailable = ApiError::from(ServiceError::from(AdvisorError::ApiKeyMissing));
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
