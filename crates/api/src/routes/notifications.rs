use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{
    routes::models::{MarkAllReadResponse, Notification, NotificationListQuery, UnreadCountResponse},
    services::notifications as notification_service,
    util::{ok, paged, ApiResponse, PageRequest, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(NotificationListQuery),
    responses(
        (status = 200, description = "The caller's notifications, newest first", body = [Notification]),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<NotificationListQuery>,
) -> Result<Json<ApiResponse<Vec<Notification>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = notification_service::list_notifications(
        state.db_pool(),
        user.id,
        query.unread_only.unwrap_or(false),
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse)
    )
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<UnreadCountResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let unread_count = notification_service::get_unread_count(state.db_pool(), user.id).await?;
    Ok(ok(UnreadCountResponse { unread_count }))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = Notification),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<Json<ApiResponse<Notification>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let notification =
        notification_service::mark_notification_read(state.db_pool(), user.id, &notification_id)
            .await?;
    Ok(ok(notification))
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Notifications marked read", body = MarkAllReadResponse)
    )
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<MarkAllReadResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let updated = notification_service::mark_all_read(state.db_pool(), user.id).await?;
    Ok(ok(MarkAllReadResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification deleted"),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = state.current_user(&headers).await?;
    notification_service::delete_notification(state.db_pool(), user.id, &notification_id).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
