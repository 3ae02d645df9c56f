use afscheid_auth::UserRole;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{AvailabilityQuery, AvailabilitySlot, CreateSlotRequest},
    services::availability as availability_service,
    util::{ok, require_role, ApiResponse, JsonBody, QueryParams},
    ApiError, AppState,
};

const PROVIDERS: &[UserRole] = &[UserRole::Director, UserRole::Venue];

#[utoipa::path(
    get,
    path = "/api/availability",
    tag = "Availability",
    security(("bearerAuth" = [])),
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "The caller's calendar", body = [AvailabilitySlot]),
        (status = 403, description = "Directors and venues only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_slots(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<AvailabilityQuery>,
) -> Result<Json<ApiResponse<Vec<AvailabilitySlot>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, PROVIDERS)?;

    let slots = availability_service::list_slots(state.db_pool(), user.id, &query).await?;
    Ok(ok(slots))
}

#[utoipa::path(
    post,
    path = "/api/availability",
    tag = "Availability",
    security(("bearerAuth" = [])),
    request_body = CreateSlotRequest,
    responses(
        (status = 201, description = "Time blocked", body = AvailabilitySlot),
        (status = 400, description = "Invalid time window", body = crate::error::ErrorResponse),
        (status = 409, description = "Overlaps an existing slot", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_slot(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateSlotRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AvailabilitySlot>>), ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, PROVIDERS)?;

    let slot = availability_service::create_slot(state.db_pool(), user.id, req).await?;
    Ok((StatusCode::CREATED, ok(slot)))
}

#[utoipa::path(
    delete,
    path = "/api/availability/{id}",
    tag = "Availability",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Slot id")),
    responses(
        (status = 200, description = "Slot removed"),
        (status = 400, description = "Booked slots are released through the booking", body = crate::error::ErrorResponse),
        (status = 404, description = "Slot not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_slot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slot_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, PROVIDERS)?;

    availability_service::delete_slot(state.db_pool(), user.id, &slot_id).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
