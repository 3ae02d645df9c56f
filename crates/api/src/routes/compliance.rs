use afscheid_auth::UserRole;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

use crate::{
    routes::models::{
        ComplianceListQuery, ComplianceRecord, CreateComplianceRequest, EmergencyRequest,
        UpdateComplianceStatusRequest,
    },
    services::compliance as compliance_service,
    util::{ok, paged, require_role, ApiResponse, JsonBody, PageRequest, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    post,
    path = "/api/compliance",
    tag = "Compliance",
    security(("bearerAuth" = [])),
    request_body = CreateComplianceRequest,
    responses(
        (status = 201, description = "Deadline tracking started", body = ComplianceRecord),
        (status = 400, description = "Invalid or future date", body = crate::error::ErrorResponse),
        (status = 403, description = "Only the booking's director", body = crate::error::ErrorResponse),
        (status = 409, description = "Booking already tracked", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateComplianceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ComplianceRecord>>), ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let record = compliance_service::create_record(
        state.db_pool(),
        user.id,
        req,
        Utc::now().date_naive(),
    )
    .await?;
    Ok((StatusCode::CREATED, ok(record)))
}

#[utoipa::path(
    get,
    path = "/api/compliance",
    tag = "Compliance",
    security(("bearerAuth" = [])),
    params(ComplianceListQuery),
    responses(
        (status = 200, description = "Records ordered by deadline", body = [ComplianceRecord]),
        (status = 403, description = "Directors only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<ComplianceListQuery>,
) -> Result<Json<ApiResponse<Vec<ComplianceRecord>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let page = compliance_service::list_records(
        state.db_pool(),
        user.id,
        PageRequest::new(query.page, query.limit),
        Utc::now().date_naive(),
    )
    .await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/compliance/{id}",
    tag = "Compliance",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Record for the booking", body = ComplianceRecord),
        (status = 404, description = "No record for this booking", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_for_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Result<Json<ApiResponse<ComplianceRecord>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let record = compliance_service::get_for_booking(
        state.db_pool(),
        user.id,
        &booking_id,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(ok(record))
}

#[utoipa::path(
    put,
    path = "/api/compliance/{id}/status",
    tag = "Compliance",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Compliance record id")),
    request_body = UpdateComplianceStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ComplianceRecord),
        (status = 400, description = "Only completed or on_track", body = crate::error::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    JsonBody(req): JsonBody<UpdateComplianceStatusRequest>,
) -> Result<Json<ApiResponse<ComplianceRecord>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let record = compliance_service::update_status(
        state.db_pool(),
        user.id,
        &record_id,
        &req.status,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(ok(record))
}

#[utoipa::path(
    post,
    path = "/api/compliance/{id}/emergency",
    tag = "Compliance",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Compliance record id")),
    request_body = EmergencyRequest,
    responses(
        (status = 200, description = "Emergency recorded", body = ComplianceRecord),
        (status = 400, description = "Reason missing", body = crate::error::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn declare_emergency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    JsonBody(req): JsonBody<EmergencyRequest>,
) -> Result<Json<ApiResponse<ComplianceRecord>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let record = compliance_service::declare_emergency(
        state.db_pool(),
        user.id,
        &record_id,
        &req.reason,
        Utc::now().date_naive(),
    )
    .await?;
    Ok(ok(record))
}
