use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use campusnet_auth::{AuthSession, NewAccount, Role, User};

use crate::{
    routes::models::{
        ChangePasswordRequest, DeleteAccountRequest, LoginRequest, MeResponse, RegisterRequest,
        RevokedSessionsResponse, SessionResponse, UserResponse,
    },
    services::account as account_service,
    util::require_bearer,
    ApiError, AppState,
};

impl SessionResponse {
    pub fn new(session: AuthSession, user: &User) -> Self {
        Self {
            token: session.token,
            expires_at: session.expires_at,
            user: UserResponse::from(user),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = SessionResponse),
        (status = 400, description = "Invalid registration data", body = crate::error::ErrorResponse),
        (status = 403, description = "Email domain not allowed", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let role = payload
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()?;

    let (user, session) = state
        .authenticator()
        .register(NewAccount {
            email: &payload.email,
            password: &payload.password,
            full_name: &payload.full_name,
            role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::new(session, &user))))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (user, session) = state
        .authenticator()
        .login(&payload.email, &payload.password)
        .await?;

    Ok(Json(SessionResponse::new(session, &user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;
    state.authenticator().logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Every session of the user revoked", body = RevokedSessionsResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RevokedSessionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let revoked = state.authenticator().logout_all(user.id).await?;
    Ok(Json(RevokedSessionsResponse { revoked }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user and profile", body = MeResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    Ok(Json(account_service::me(state.db_pool(), &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    tag = "Auth",
    security(("bearerAuth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed; other sessions revoked"),
        (status = 400, description = "New password rejected", body = crate::error::ErrorResponse),
        (status = 401, description = "Current password is wrong", body = crate::error::ErrorResponse)
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, session) = state.authenticate(&token).await?;
    state
        .authenticator()
        .change_password(
            user.id,
            &session.token,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/auth/account",
    tag = "Auth",
    security(("bearerAuth" = [])),
    request_body = DeleteAccountRequest,
    responses(
        (status = 204, description = "Account and all of its data deleted"),
        (status = 401, description = "Password confirmation failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    account_service::delete_account(
        state.authenticator(),
        state.realtime(),
        &user,
        &payload.password,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
