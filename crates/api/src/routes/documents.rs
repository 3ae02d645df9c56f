use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use bytes::BytesMut;

use crate::{
    routes::models::{Document, DocumentListQuery, DocumentShares, ShareDocumentRequest},
    services::documents::{self as document_service, NewDocument},
    util::{ok, paged, ApiResponse, JsonBody, PageRequest, QueryParams},
    ApiError, AppState,
};

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ApiError::bad_request(format!(
            "is_encrypted must be a boolean, got {other}"
        ))),
    }
}

/// Read the multipart body, enforcing the upload limit while the file streams in.
async fn read_upload(mut multipart: Multipart, max_bytes: u64) -> Result<NewDocument, ApiError> {
    let mut file: Option<(String, String, BytesMut)> = None;
    let mut booking_id = None;
    let mut is_encrypted = false;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let mut buffer = BytesMut::new();
                while let Some(chunk) = field.chunk().await? {
                    if (buffer.len() + chunk.len()) as u64 > max_bytes {
                        return Err(ApiError::payload_too_large(format!(
                            "file exceeds the {max_bytes} byte limit"
                        )));
                    }
                    buffer.extend_from_slice(&chunk);
                }
                file = Some((file_name, content_type, buffer));
            }
            "booking_id" => booking_id = Some(field.text().await?),
            "is_encrypted" => is_encrypted = parse_flag(&field.text().await?)?,
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::bad_request("multipart field `file` is required"))?;

    Ok(NewDocument {
        file_name,
        content_type,
        bytes: bytes.freeze(),
        booking_id,
        is_encrypted,
    })
}

#[utoipa::path(
    post,
    path = "/api/documents",
    tag = "Documents",
    security(("bearerAuth" = [])),
    request_body(content_type = "multipart/form-data", description = "Fields: file, booking_id?, is_encrypted?"),
    responses(
        (status = 201, description = "Document stored", body = Document),
        (status = 400, description = "Missing or empty file", body = crate::error::ErrorResponse),
        (status = 413, description = "File too large", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Document>>), ApiError> {
    let user = state.current_user(&headers).await?;
    let max_bytes = state.settings().max_upload_bytes;
    let upload = read_upload(multipart, max_bytes).await?;

    let document = document_service::upload_document(
        state.db_pool(),
        state.blobs(),
        user.id,
        &user.public_id,
        upload,
        max_bytes,
    )
    .await?;

    Ok((StatusCode::CREATED, ok(document)))
}

#[utoipa::path(
    get,
    path = "/api/documents",
    tag = "Documents",
    security(("bearerAuth" = [])),
    params(DocumentListQuery),
    responses(
        (status = 200, description = "Owned and shared documents", body = [Document])
    )
)]
pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    QueryParams(query): QueryParams<DocumentListQuery>,
) -> Result<Json<ApiResponse<Vec<Document>>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let page = document_service::list_documents(
        state.db_pool(),
        user.id,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(paged(page))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    tag = "Documents",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document metadata", body = Document),
        (status = 404, description = "Document not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Json<ApiResponse<Document>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let document = document_service::get_document(state.db_pool(), user.id, &document_id).await?;
    Ok(ok(document))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/download",
    tag = "Documents",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Document not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn download_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let user = state.current_user(&headers).await?;
    let (document, bytes) =
        document_service::download_document(state.db_pool(), state.blobs(), user.id, &document_id)
            .await?;

    let content_type = HeaderValue::from_str(&document.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        document.file_name
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Response::new(Body::from(bytes));
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, content_type);
    response_headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/share",
    tag = "Documents",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Document id")),
    request_body = ShareDocumentRequest,
    responses(
        (status = 200, description = "Current share list", body = DocumentShares),
        (status = 403, description = "Only the owner may share", body = crate::error::ErrorResponse),
        (status = 404, description = "Document or user not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn share_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    JsonBody(req): JsonBody<ShareDocumentRequest>,
) -> Result<Json<ApiResponse<DocumentShares>>, ApiError> {
    let user = state.current_user(&headers).await?;
    let shares =
        document_service::share_document(state.db_pool(), user.id, &document_id, &req.user_ids)
            .await?;
    Ok(ok(shares))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    tag = "Documents",
    security(("bearerAuth" = [])),
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document deleted"),
        (status = 403, description = "Only the owner may delete", body = crate::error::ErrorResponse),
        (status = 404, description = "Document not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = state.current_user(&headers).await?;
    document_service::delete_document(state.db_pool(), state.blobs(), user.id, &document_id)
        .await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}
