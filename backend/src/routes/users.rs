//! User routes

use crate::auth::{enforce, CurrentUser};
use crate::error::ApiResult;
use crate::state::AppState;
use authgate_shared::{ListUsersQuery, Role, UserResponse};
use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};

pub fn user_routes(state: &AppState) -> Router<AppState> {
    let own = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(state.authenticated(), enforce));

    let admin = Router::new()
        .route("/list", get(list))
        .route_layer(from_fn_with_state(state.requires_role(Role::Admin), enforce));

    own.merge(admin)
}

/// GET /api/v1/users/me
async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<UserResponse>> {
    let profile = state.users().get_profile(user.user_id).await?;
    Ok(Json(profile.into()))
}

/// GET /api/v1/users/list?limit=&offset=
///
/// Admin only.
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.users().list_users(&query).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
