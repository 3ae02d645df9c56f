use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;

use crate::{
    routes::models::DashboardSummary,
    services::dashboard as dashboard_service,
    util::{ok, ApiResponse},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "Dashboard",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Role-specific overview", body = DashboardSummary),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<DashboardSummary>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let summary =
        dashboard_service::summary(state.db_pool(), user.id, user.role, Utc::now().date_naive())
            .await?;
    Ok(ok(summary))
}
