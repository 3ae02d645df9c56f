use afscheid_auth::{AuthSession, Registration, User, UserRole};
use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};

use crate::{
    routes::models::{LoginRequest, LogoutResponse, RegisterRequest, SessionResponse, UserResponse},
    util::{format_timestamp, ok, require_bearer, ApiResponse, JsonBody},
    ApiError, AppState,
};

impl SessionResponse {
    pub fn new(session: AuthSession, user: &User) -> Self {
        Self {
            token: session.token,
            expires_at: format_timestamp(session.expires_at),
            user: user.into(),
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
        (status = 400, description = "Invalid registration payload", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionResponse>>), ApiError> {
    let role: UserRole = payload.role.trim().to_lowercase().parse()?;

    let registration = Registration {
        email: &payload.email,
        password: &payload.password,
        full_name: &payload.full_name,
        role,
        phone: payload.phone.as_deref(),
    };

    let authenticator = state.authenticator();
    let user = authenticator.register_with_password(&registration).await?;
    let session = authenticator.issue_session(user.id).await?;

    tracing::info!(user = %user.public_id, role = %user.role, "account registered");

    Ok((StatusCode::CREATED, ok(SessionResponse::new(session, &user))))
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
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    let authenticator = state.authenticator();
    let session = authenticator
        .login_with_password(&payload.email, &payload.password)
        .await?;
    let user = authenticator.user_profile(session.user_id).await?;

    Ok(ok(SessionResponse::new(session, &user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Session removed", body = LogoutResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LogoutResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticate(&token).await?;
    state.authenticator().logout(&token).await?;

    Ok(ok(LogoutResponse { logged_out: true }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    Ok(ok(UserResponse::from(&user)))
}
