use afscheid_auth::UserRole;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        CreatePaymentRequest, Payment, PaymentListQuery, PaymentSplit, SplitListQuery,
        UpdateSplitsRequest,
    },
    services::payments as payment_service,
    util::{ok, paged, require_role, ApiResponse, JsonBody, PageRequest, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    post,
    path = "/api/payments",
    tag = "Payments",
    security(("bearerAuth" = [])),
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created with its splits", body = Payment),
        (status = 400, description = "Booking was cancelled", body = crate::error::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Booking already has a payment", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Payment>>), ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Family])?;

    let settings = state.settings();
    let payment = payment_service::create_payment(
        state.db_pool(),
        user.id,
        &req.booking_id,
        settings.commission_bps,
        &settings.currency,
    )
    .await?;

    Ok((StatusCode::CREATED, ok(payment)))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    tag = "Payments",
    security(("bearerAuth" = [])),
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Payments made or received by the caller", body = [Payment])
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<PaymentListQuery>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = payment_service::list_payments(
        state.db_pool(),
        user.id,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    tag = "Payments",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Payment with splits", body = Payment),
        (status = 404, description = "Payment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let payment = payment_service::get_payment(state.db_pool(), user.id, &payment_id).await?;
    Ok(ok(payment))
}

#[utoipa::path(
    get,
    path = "/api/payments/splits",
    tag = "Payments",
    security(("bearerAuth" = [])),
    params(SplitListQuery),
    responses(
        (status = 200, description = "Splits addressed to the caller", body = [PaymentSplit]),
        (status = 400, description = "Unknown status filter", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_splits(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<SplitListQuery>,
) -> Result<Json<ApiResponse<Vec<PaymentSplit>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = payment_service::list_splits(state.db_pool(), user.id, &query).await?;
    Ok(paged(page))
}

#[utoipa::path(
    put,
    path = "/api/payments/splits",
    tag = "Payments",
    security(("bearerAuth" = [])),
    request_body = UpdateSplitsRequest,
    responses(
        (status = 200, description = "Splits updated", body = [PaymentSplit]),
        (status = 400, description = "Invalid status or empty id list", body = crate::error::ErrorResponse),
        (status = 404, description = "Split not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Split no longer pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_splits(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<UpdateSplitsRequest>,
) -> Result<Json<ApiResponse<Vec<PaymentSplit>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director, UserRole::Venue])?;

    let splits = payment_service::update_splits(state.db_pool(), user.id, req).await?;
    Ok(ok(splits))
}
