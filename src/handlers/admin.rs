use axum::{Json, extract::State};

use super::ApiResult;
use crate::{AppState, auth::AuthUser, error::ErrorBody, models::DashboardStats};

/// get_admin_stats
///
/// [Admin Route] Core counters for the dashboard home. Revenue only counts completed
/// orders; low stock means an active product at or below 5 units.
#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "admin",
    responses(
        (status = 200, description = "Stats", body = DashboardStats),
        (status = 403, description = "Admin role required", body = ErrorBody)
    )
)]
pub async fn get_admin_stats(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<DashboardStats>> {
    user.require_admin()?;
    Ok(Json(state.repo.get_stats().await?))
}
