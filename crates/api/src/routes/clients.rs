use afscheid_auth::UserRole;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{ClientListQuery, CreateClientRequest, DirectorClient, UpdateClientRequest},
    services::clients as client_service,
    util::{ok, paged, require_role, ApiResponse, JsonBody, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/director/clients",
    tag = "Director clients",
    security(("bearerAuth" = [])),
    params(ClientListQuery),
    responses(
        (status = 200, description = "The director's client book", body = [DirectorClient]),
        (status = 403, description = "Directors only", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_clients(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<ClientListQuery>,
) -> Result<Json<ApiResponse<Vec<DirectorClient>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let page = client_service::list_clients(state.db_pool(), user.id, &query).await?;
    Ok(paged(page))
}

#[utoipa::path(
    post,
    path = "/api/director/clients",
    tag = "Director clients",
    security(("bearerAuth" = [])),
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client added", body = DirectorClient),
        (status = 400, description = "Invalid status, tags or non-family user", body = crate::error::ErrorResponse),
        (status = 404, description = "Family not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Family is already a client", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateClientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DirectorClient>>), ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let client = client_service::create_client(state.db_pool(), user.id, req).await?;
    Ok((StatusCode::CREATED, ok(client)))
}

#[utoipa::path(
    put,
    path = "/api/director/clients/{id}",
    tag = "Director clients",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Client relationship id")),
    request_body = UpdateClientRequest,
    responses(
        (status = 200, description = "Client updated", body = DirectorClient),
        (status = 400, description = "Invalid status or tags", body = crate::error::ErrorResponse),
        (status = 404, description = "Client not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(client_id): Path<String>,
    JsonBody(req): JsonBody<UpdateClientRequest>,
) -> Result<Json<ApiResponse<DirectorClient>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let client = client_service::update_client(state.db_pool(), user.id, &client_id, req).await?;
    Ok(ok(client))
}
