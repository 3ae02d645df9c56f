use afscheid_auth::UserRole;
use axum::{extract::State, http::HeaderMap, Json};

use crate::{
    routes::models::{
        DirectorProfile, DirectorSearchQuery, ProfileResponse, UpdateDirectorProfileRequest,
        UpdateFamilyProfileRequest, UpdateVenueProfileRequest, UserResponse, VenueProfile,
        VenueSearchQuery,
    },
    services::profiles as profile_service,
    util::{ok, paged, require_role, ApiResponse, JsonBody, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Account plus role profile", body = ProfileResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let pool = state.db_pool();

    let (director, venue) = match user.role {
        UserRole::Director => (profile_service::get_director_profile(pool, user.id).await?, None),
        UserRole::Venue => (None, profile_service::get_venue_profile(pool, user.id).await?),
        UserRole::Family => (None, None),
    };

    Ok(ok(ProfileResponse {
        user: UserResponse::from(&user),
        director,
        venue,
    }))
}

#[utoipa::path(
    put,
    path = "/api/family/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    request_body = UpdateFamilyProfileRequest,
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Invalid profile data", body = crate::error::ErrorResponse),
        (status = 403, description = "Family accounts only", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_family_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<UpdateFamilyProfileRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Family])?;

    profile_service::update_family_profile(state.db_pool(), &user, req).await?;
    let updated = state.authenticator().user_profile(user.id).await?;

    Ok(ok(UserResponse::from(&updated)))
}

#[utoipa::path(
    get,
    path = "/api/director/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Director profile", body = DirectorProfile),
        (status = 403, description = "Directors only", body = crate::error::ErrorResponse),
        (status = 404, description = "Profile missing", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_director_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<DirectorProfile>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let profile = profile_service::get_director_profile(state.db_pool(), user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("director profile not found"))?;

    Ok(ok(profile))
}

#[utoipa::path(
    put,
    path = "/api/director/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    request_body = UpdateDirectorProfileRequest,
    responses(
        (status = 200, description = "Updated director profile", body = DirectorProfile),
        (status = 400, description = "Invalid profile data", body = crate::error::ErrorResponse),
        (status = 403, description = "Directors only", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_director_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<UpdateDirectorProfileRequest>,
) -> Result<Json<ApiResponse<DirectorProfile>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Director])?;

    let profile = profile_service::update_director_profile(state.db_pool(), user.id, req).await?;
    Ok(ok(profile))
}

#[utoipa::path(
    get,
    path = "/api/venue/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Venue profile", body = VenueProfile),
        (status = 403, description = "Venues only", body = crate::error::ErrorResponse),
        (status = 404, description = "Profile missing", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_venue_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<VenueProfile>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Venue])?;

    let profile = profile_service::get_venue_profile(state.db_pool(), user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("venue profile not found"))?;

    Ok(ok(profile))
}

#[utoipa::path(
    put,
    path = "/api/venue/profile",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    request_body = UpdateVenueProfileRequest,
    responses(
        (status = 200, description = "Updated venue profile", body = VenueProfile),
        (status = 400, description = "Invalid profile data", body = crate::error::ErrorResponse),
        (status = 403, description = "Venues only", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_venue_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<UpdateVenueProfileRequest>,
) -> Result<Json<ApiResponse<VenueProfile>>, ApiError> {
    let user = state.current_user(&headers).await?;
    require_role(&user, &[UserRole::Venue])?;

    let profile = profile_service::update_venue_profile(state.db_pool(), user.id, req).await?;
    Ok(ok(profile))
}

#[utoipa::path(
    get,
    path = "/api/directors",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    params(DirectorSearchQuery),
    responses(
        (status = 200, description = "Active directors", body = [DirectorProfile]),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_directors(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<DirectorSearchQuery>,
) -> Result<Json<ApiResponse<Vec<DirectorProfile>>>, ApiError> {
    state.current_user(&headers).await?;
    let page = profile_service::search_directors(state.db_pool(), &query).await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/venues",
    tag = "Profiles",
    security(("bearerAuth" = [])),
    params(VenueSearchQuery),
    responses(
        (status = 200, description = "Active venues", body = [VenueProfile]),
        (status = 400, description = "Unknown venue type", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_venues(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<VenueSearchQuery>,
) -> Result<Json<ApiResponse<Vec<VenueProfile>>>, ApiError> {
    state.current_user(&headers).await?;
    let page = profile_service::search_venues(state.db_pool(), &query).await?;
    Ok(paged(page))
}
