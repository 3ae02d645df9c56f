use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::models::{
        ChatMessage, ChatRoom, CreateRoomRequest, MarkReadResponse, MessageListQuery,
        PostMessageRequest,
    },
    services::chat as chat_service,
    util::{ok, paged, ApiResponse, JsonBody, PageRequest, QueryParams},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/chat/rooms",
    tag = "Chat",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Rooms the caller takes part in", body = [ChatRoom]),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<ChatRoom>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let rooms = chat_service::list_rooms(state.db_pool(), user.id).await?;
    Ok(ok(rooms))
}

#[utoipa::path(
    post,
    path = "/api/chat/rooms",
    tag = "Chat",
    security(("bearerAuth" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = ChatRoom),
        (status = 400, description = "Invalid title", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown participant or booking", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CreateRoomRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatRoom>>), ApiError> {
    let user = state.current_user(&headers).await?;
    let room = chat_service::create_room(state.db_pool(), user.id, req).await?;
    Ok((StatusCode::CREATED, ok(room)))
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms/{id}/messages",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Room id"), MessageListQuery),
    responses(
        (status = 200, description = "Messages, oldest first within the page", body = [ChatMessage]),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    QueryParams(query): QueryParams<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = chat_service::list_messages(
        state.db_pool(),
        user.id,
        &room_id,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(paged(page))
}

#[utoipa::path(
    post,
    path = "/api/chat/rooms/{id}/messages",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Room id")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = ChatMessage),
        (status = 400, description = "Empty or oversized message", body = crate::error::ErrorResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn post_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    JsonBody(req): JsonBody<PostMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChatMessage>>), ApiError> {
    let user = state.current_user(&headers).await?;
    let message = chat_service::post_message(state.db_pool(), user.id, &room_id, &req.content).await?;
    Ok((StatusCode::CREATED, ok(message)))
}

#[utoipa::path(
    post,
    path = "/api/chat/rooms/{id}/read",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Number of messages marked read", body = MarkReadResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_room_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<ApiResponse<MarkReadResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let marked = chat_service::mark_room_read(state.db_pool(), user.id, &room_id).await?;
    Ok(ok(MarkReadResponse { marked }))
}
