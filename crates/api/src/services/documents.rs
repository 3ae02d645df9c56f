use afscheid_auth::new_public_id;
use bytes::Bytes;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::bookings::require_participant_booking;
use super::error::ServiceError;
use super::users::require_by_public_id;
use crate::routes::models::{Document, DocumentShares};
use crate::storage::{blob_path, sanitize_file_name, BlobStore};
use crate::util::{now_rfc3339, Page, PageRequest};

const DOCUMENT_SELECT: &str = r#"
    SELECT d.public_id AS id, o.public_id AS owner_id, o.full_name AS owner_name,
           b.public_id AS booking_id, d.file_name, d.content_type, d.size_bytes,
           d.is_encrypted, d.created_at
    FROM documents d
    JOIN users o ON o.id = d.owner_id
    LEFT JOIN bookings b ON b.id = d.booking_id
"#;

const VISIBLE_TO: &str = "(d.owner_id = ? OR EXISTS (
    SELECT 1 FROM document_shares s WHERE s.document_id = d.id AND s.user_id = ?))";

/// An upload as read from the multipart body.
#[derive(Debug)]
pub struct NewDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
    pub booking_id: Option<String>,
    pub is_encrypted: bool,
}

#[derive(Debug)]
struct DocumentRow {
    id: i64,
    owner_id: i64,
    storage_path: String,
}

async fn find_row(pool: &SqlitePool, public_id: &str) -> Result<Option<DocumentRow>, ServiceError> {
    let row: Option<(i64, i64, String)> =
        sqlx::query_as("SELECT id, owner_id, storage_path FROM documents WHERE public_id = ?")
            .bind(public_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, owner_id, storage_path)| DocumentRow {
        id,
        owner_id,
        storage_path,
    }))
}

async fn require_owned_row(
    pool: &SqlitePool,
    owner_id: i64,
    public_id: &str,
) -> Result<DocumentRow, ServiceError> {
    let row = find_row(pool, public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("document not found"))?;
    if row.owner_id != owner_id {
        return Err(ServiceError::forbidden("only the owner can do this"));
    }
    Ok(row)
}

pub async fn upload_document(
    pool: &SqlitePool,
    blobs: &dyn BlobStore,
    owner_id: i64,
    owner_public_id: &str,
    upload: NewDocument,
    max_upload_bytes: u64,
) -> Result<Document, ServiceError> {
    if upload.bytes.is_empty() {
        return Err(ServiceError::bad_request("uploaded file is empty"));
    }
    if upload.bytes.len() as u64 > max_upload_bytes {
        return Err(ServiceError::PayloadTooLarge(format!(
            "file exceeds the {max_upload_bytes} byte limit"
        )));
    }

    let booking_row_id = match upload.booking_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Some(require_participant_booking(pool, owner_id, id).await?.id),
        _ => None,
    };

    let file_name = sanitize_file_name(&upload.file_name);
    let content_type = if upload.content_type.trim().is_empty() {
        "application/octet-stream".to_string()
    } else {
        upload.content_type.trim().to_string()
    };
    let size = upload.bytes.len() as i64;
    let path = blob_path(owner_public_id, &file_name);

    blobs.put(&path, upload.bytes).await?;

    let public_id = new_public_id();
    let inserted = sqlx::query(
        r#"
        INSERT INTO documents (public_id, owner_id, booking_id, file_name, content_type, size_bytes, storage_path, is_encrypted, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(owner_id)
    .bind(booking_row_id)
    .bind(&file_name)
    .bind(&content_type)
    .bind(size)
    .bind(&path)
    .bind(upload.is_encrypted)
    .bind(now_rfc3339())
    .execute(pool)
    .await;

    if let Err(error) = inserted {
        if let Err(cleanup) = blobs.delete(&path).await {
            warn!(error = %cleanup, path, "failed to remove orphaned blob");
        }
        return Err(error.into());
    }

    info!(document = %public_id, owner_id, size, "document uploaded");
    get_document(pool, owner_id, &public_id).await
}

pub async fn list_documents(
    pool: &SqlitePool,
    user_id: i64,
    page: PageRequest,
) -> Result<Page<Document>, ServiceError> {
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM documents d WHERE {VISIBLE_TO}"))
        .bind(user_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, Document>(&format!(
        "{DOCUMENT_SELECT} WHERE {VISIBLE_TO} ORDER BY d.created_at DESC, d.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}

pub async fn get_document(pool: &SqlitePool, user_id: i64, public_id: &str) -> Result<Document, ServiceError> {
    sqlx::query_as::<_, Document>(&format!("{DOCUMENT_SELECT} WHERE d.public_id = ? AND {VISIBLE_TO}"))
        .bind(public_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("document not found"))
}

/// Metadata plus file contents, for the owner or users it was shared with.
pub async fn download_document(
    pool: &SqlitePool,
    blobs: &dyn BlobStore,
    user_id: i64,
    public_id: &str,
) -> Result<(Document, Bytes), ServiceError> {
    let document = get_document(pool, user_id, public_id).await?;
    let row = find_row(pool, public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("document not found"))?;

    let bytes = blobs.get(&row.storage_path).await?;
    Ok((document, bytes))
}

pub async fn share_document(
    pool: &SqlitePool,
    owner_id: i64,
    public_id: &str,
    user_ids: &[String],
) -> Result<DocumentShares, ServiceError> {
    let row = require_owned_row(pool, owner_id, public_id).await?;

    if user_ids.is_empty() {
        return Err(ServiceError::bad_request("user_ids cannot be empty"));
    }

    let mut recipients = Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
        let user = require_by_public_id(pool, user_id.trim(), "user").await?;
        if user.id != owner_id {
            recipients.push(user.id);
        }
    }

    let now = now_rfc3339();
    let mut tx = pool.begin().await?;
    for user_id in recipients {
        sqlx::query("INSERT OR IGNORE INTO document_shares (document_id, user_id, shared_at) VALUES (?, ?, ?)")
            .bind(row.id)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    let shared_with: Vec<String> = sqlx::query_scalar(
        "SELECT u.public_id FROM document_shares s JOIN users u ON u.id = s.user_id
         WHERE s.document_id = ? ORDER BY s.shared_at ASC, u.id ASC",
    )
    .bind(row.id)
    .fetch_all(pool)
    .await?;

    Ok(DocumentShares {
        document_id: public_id.to_string(),
        shared_with,
    })
}

/// Delete the row first; the blob is removed afterwards on a best-effort basis.
pub async fn delete_document(
    pool: &SqlitePool,
    blobs: &dyn BlobStore,
    owner_id: i64,
    public_id: &str,
) -> Result<(), ServiceError> {
    let row = require_owned_row(pool, owner_id, public_id).await?;

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(row.id)
        .execute(pool)
        .await?;

    if let Err(error) = blobs.delete(&row.storage_path).await {
        warn!(%error, path = %row.storage_path, "failed to delete document blob");
    }

    info!(document = %public_id, owner_id, "document deleted");
    Ok(())
}
