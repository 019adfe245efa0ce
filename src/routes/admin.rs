use crate::{
    AppState,
    handlers::{admin, users},
};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Staff account management and dashboard statistics. Each handler rejects
/// non-admins with 403 through `AuthUser::require_admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        // `/users/me` is registered by the authenticated router; static segments win
        // over `{id}` in the matcher.
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/admin/stats", get(admin::get_admin_stats))
}
