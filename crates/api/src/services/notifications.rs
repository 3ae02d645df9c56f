use afscheid_auth::new_public_id;
use sqlx::SqlitePool;
use tracing::warn;

use super::error::ServiceError;
use crate::routes::models::Notification;
use crate::util::{now_rfc3339, Page, PageRequest};

pub const KIND_BOOKING_CREATED: &str = "booking_created";
pub const KIND_BOOKING_STATUS: &str = "booking_status";
pub const KIND_PAYMENT: &str = "payment";
pub const KIND_PAYOUT: &str = "payout";
pub const KIND_CHAT_MESSAGE: &str = "chat_message";
pub const KIND_COMPLIANCE: &str = "compliance";

const NOTIFICATION_COLUMNS: &str =
    "public_id AS id, type, title, body, related_entity_id, read, created_at";

pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: i64,
    unread_only: bool,
    page: PageRequest,
) -> Result<Page<Notification>, ServiceError> {
    let unread_filter = if unread_only { " AND read = FALSE" } else { "" };

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?{unread_filter}"
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = ?{unread_filter}
         ORDER BY created_at DESC, id DESC
         LIMIT ? OFFSET ?"
    ))
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

pub async fn get_unread_count(pool: &SqlitePool, user_id: i64) -> Result<i64, ServiceError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn mark_notification_read(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: &str,
) -> Result<Notification, ServiceError> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE public_id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("notification not found"));
    }

    let notification = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE public_id = ?"
    ))
    .bind(notification_id)
    .fetch_one(pool)
    .await?;

    Ok(notification)
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> Result<u64, ServiceError> {
    let result =
        sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = ? AND read = FALSE")
            .bind(user_id)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}

pub async fn delete_notification(
    pool: &SqlitePool,
    user_id: i64,
    notification_id: &str,
) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM notifications WHERE public_id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("notification not found"));
    }

    Ok(())
}

pub async fn create_notification(
    pool: &SqlitePool,
    user_id: i64,
    kind: &str,
    title: &str,
    body: &str,
    related_entity_id: Option<&str>,
) -> Result<String, ServiceError> {
    let public_id = new_public_id();

    sqlx::query(
        r#"
        INSERT INTO notifications (public_id, user_id, type, title, body, related_entity_id, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, FALSE, ?)
        "#,
    )
    .bind(&public_id)
    .bind(user_id)
    .bind(kind)
    .bind(title)
    .bind(body)
    .bind(related_entity_id)
    .bind(now_rfc3339())
    .execute(pool)
    .await?;

    Ok(public_id)
}

/// Best effort: failures are logged and never reach the caller.
pub async fn notify_quietly(
    pool: &SqlitePool,
    user_id: i64,
    kind: &str,
    title: &str,
    body: &str,
    related_entity_id: Option<&str>,
) {
    if let Err(error) =
        create_notification(pool, user_id, kind, title, body, related_entity_id).await
    {
        warn!(%error, user_id, kind, "failed to create notification");
    }
}
