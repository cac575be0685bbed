use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use campusnet_advisor::AdvisorError;
use campusnet_auth::AuthError;
use campusnet_news::NewsError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match &error {
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::SessionNotFound | AuthError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::EmailDomainNotAllowed => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Database(_) | AuthError::PasswordHash(_) => {
                error!(error = ?error, "auth error");
                return Self::internal_server_error("authentication failed");
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<AdvisorError> for ApiError {
    fn from(error: AdvisorError) -> Self {
        match error {
            AdvisorError::ApiKeyMissing => {
                warn!("advisor request rejected, API key not configured");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "advisor is not configured")
            }
            other => {
                error!(error = ?other, "advisor error");
                Self::new(StatusCode::BAD_GATEWAY, "advisor is temporarily unavailable")
            }
        }
    }
}

impl From<NewsError> for ApiError {
    fn from(error: NewsError) -> Self {
        error!(error = ?error, "news error");
        match error {
            NewsError::InvalidSource(message) => Self::bad_request(message),
            NewsError::Database(_) => Self::internal_server_error("database operation failed"),
            other => Self::new(StatusCode::BAD_GATEWAY, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_expected_status() {
        assert_eq!(ApiError::from(AuthError::UserExists).status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::EmailDomainNotAllowed).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::InvalidInput("bad".into())).message,
            "bad"
        );
    }

    #[test]
    fn database_details_are_not_returned() {
        let error = ApiError::from(AuthError::Database(sqlx::Error::RowNotFound));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.message.contains("no rows"));
    }

    #[test]
    fn advisor_errors_distinguish_missing_key_from_upstream() {
        assert_eq!(
            ApiError::from(AdvisorError::ApiKeyMissing).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        let upstream = ApiError::from(AdvisorError::Upstream {
            status: 500,
            body: "secret details".into(),
        });
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);
        assert!(!upstream.message.contains("secret"));
    }
}
