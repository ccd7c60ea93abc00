//! Authentication routes
//!
//! Signup, login, refresh-token rotation and logout.

use super::extract::JsonBody;
use crate::auth::{bearer_token, enforce, CurrentUser};
use crate::error::ApiResult;
use crate::state::AppState;
use authgate_shared::{LoginRequest, RefreshRequest, SignupRequest, TokenPair, UserResponse};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::post,
    Json, Router,
};

/// Create auth routes
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route_layer(from_fn_with_state(state.authenticated(), enforce));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .merge(protected)
}

/// Register a new user
///
/// POST /api/v1/auth/signup
async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.users().signup(&req.email, &req.password).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Login with email and password
///
/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let tokens = state.auth().login(&req.email, &req.password).await?;
    Ok(Json(tokens))
}

/// Exchange a refresh token for a new pair
///
/// POST /api/v1/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let tokens = state.auth().refresh(&req.refresh_token).await?;
    Ok(Json(tokens))
}

/// Revoke the caller's session
///
/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: CurrentUser,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let token = bearer_token(&headers)?;
    state.auth().logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}
