use afscheid_assistant::AssistantMode;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use tracing::debug;

use crate::{
    routes::models::{AssistantChatRequest, AssistantChatResponse},
    services::compliance as compliance_service,
    util::{ok, ApiResponse, JsonBody},
    ApiError, AppState,
};

#[utoipa::path(
    post,
    path = "/api/assistant/chat",
    tag = "Assistant",
    security(("bearerAuth" = [])),
    request_body = AssistantChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = AssistantChatResponse),
        (status = 400, description = "Invalid conversation", body = crate::error::ErrorResponse),
        (status = 502, description = "Upstream model failed", body = crate::error::ErrorResponse),
        (status = 503, description = "Assistant not configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<AssistantChatRequest>,
) -> Result<Json<ApiResponse<AssistantChatResponse>>, ApiError> {
    let user = state.current_user(&headers).await?;

    // Deadline facts are only attached in compliance mode.
    let context = match (req.mode, req.booking_id.as_deref()) {
        (AssistantMode::Compliance, Some(booking_id)) => Some(
            compliance_service::assistant_context(
                state.db_pool(),
                user.id,
                booking_id,
                Utc::now().date_naive(),
            )
            .await?,
        ),
        _ => None,
    };

    debug!(
        user_id = user.id,
        mode = ?req.mode,
        with_context = context.is_some(),
        "forwarding assistant conversation"
    );

    let reply = state
        .assistant()
        .chat(req.mode, &req.messages, context.as_ref())
        .await?;

    Ok(ok(AssistantChatResponse {
        model: reply.model,
        content: reply.content,
        usage: reply.usage,
    }))
}
