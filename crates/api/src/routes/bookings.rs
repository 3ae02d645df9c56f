use afscheid_auth::UserRole;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{Booking, BookingListQuery, CreateBookingRequest, UpdateBookingStatusRequest},
    services::bookings as booking_service,
    util::{ok, paged, require_role, ApiResponse, JsonBody, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    post,
    path = "/api/bookings",
    tag = "Bookings",
    security(("bearerAuth" = [])),
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking requested", body = Booking),
        (status = 400, description = "Invalid request, past date or inactive provider", body = crate::error::ErrorResponse),
        (status = 403, description = "Families only", body = crate::error::ErrorResponse),
        (status = 409, description = "Director or venue unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Booking>>), ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Family])?;

    let booking = booking_service::create_booking(state.db_pool(), user.id, req).await?;
    Ok((StatusCode::CREATED, ok(booking)))
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    tag = "Bookings",
    security(("bearerAuth" = [])),
    params(BookingListQuery),
    responses(
        (status = 200, description = "Bookings the caller takes part in", body = [Booking]),
        (status = 400, description = "Unknown status filter", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<BookingListQuery>,
) -> Result<Json<ApiResponse<Vec<Booking>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = booking_service::list_bookings(state.db_pool(), user.id, user.role, &query).await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    tag = "Bookings",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking", body = Booking),
        (status = 404, description = "Booking not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let booking = booking_service::get_booking(state.db_pool(), user.id, &booking_id).await?;
    Ok(ok(booking))
}

#[utoipa::path(
    put,
    path = "/api/bookings/{id}/status",
    tag = "Bookings",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Booking id")),
    request_body = UpdateBookingStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Booking),
        (status = 400, description = "Transition not allowed", body = crate::error::ErrorResponse),
        (status = 403, description = "Role may not make this transition", body = crate::error::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_booking_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    JsonBody(req): JsonBody<UpdateBookingStatusRequest>,
) -> Result<Json<ApiResponse<Booking>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let booking = booking_service::update_booking_status(
        state.db_pool(),
        user.id,
        user.role,
        &booking_id,
        &req.status,
    )
    .await?;
    Ok(ok(booking))
}
