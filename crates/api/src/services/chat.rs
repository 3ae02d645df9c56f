use std::collections::{BTreeSet, HashMap};

use afscheid_auth::new_public_id;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use super::bookings::require_participant_booking;
use super::error::ServiceError;
use super::notifications::{notify_quietly, KIND_CHAT_MESSAGE};
use super::users::require_by_public_id;
use crate::routes::models::{ChatMessage, ChatParticipant, ChatRoom, CreateRoomRequest};
use crate::util::{now_rfc3339, Page, PageRequest};

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, FromRow)]
struct RoomRow {
    id: i64,
    public_id: String,
    title: String,
    booking_id: Option<String>,
    unread_count: i64,
    last_message_at: Option<String>,
    created_at: String,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    row_id: i64,
    id: String,
    room_id: String,
    sender_id: String,
    sender_name: String,
    content: String,
    created_at: String,
}

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.public_id, r.title, b.public_id AS booking_id,
           (SELECT COUNT(*) FROM chat_messages m
             WHERE m.room_id = r.id AND m.sender_id != ?
               AND NOT EXISTS (SELECT 1 FROM message_reads mr
                                WHERE mr.message_id = m.id AND mr.user_id = ?)) AS unread_count,
           (SELECT MAX(m.created_at) FROM chat_messages m WHERE m.room_id = r.id) AS last_message_at,
           r.created_at
    FROM chat_rooms r
    JOIN chat_participants cp ON cp.room_id = r.id AND cp.user_id = ?
    LEFT JOIN bookings b ON b.id = r.booking_id
"#;

const MESSAGE_SELECT: &str = r#"
    SELECT m.id AS row_id, m.public_id AS id, r.public_id AS room_id,
           u.public_id AS sender_id, u.full_name AS sender_name, m.content, m.created_at
    FROM chat_messages m
    JOIN chat_rooms r ON r.id = m.room_id
    JOIN users u ON u.id = m.sender_id
"#;

async fn participants(pool: &SqlitePool, room_id: i64) -> Result<Vec<ChatParticipant>, ServiceError> {
    let rows = sqlx::query_as::<_, ChatParticipant>(
        "SELECT u.public_id AS id, u.full_name, u.role
         FROM chat_participants cp JOIN users u ON u.id = cp.user_id
         WHERE cp.room_id = ? ORDER BY cp.joined_at ASC, u.id ASC",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn to_room(pool: &SqlitePool, row: RoomRow) -> Result<ChatRoom, ServiceError> {
    Ok(ChatRoom {
        participants: participants(pool, row.id).await?,
        id: row.public_id,
        title: row.title,
        booking_id: row.booking_id,
        unread_count: row.unread_count,
        last_message_at: row.last_message_at,
        created_at: row.created_at,
    })
}

/// Room row id when `user_id` takes part in it; NotFound otherwise.
pub async fn require_member(pool: &SqlitePool, user_id: i64, room_public_id: &str) -> Result<i64, ServiceError> {
    let room_id: Option<i64> = sqlx::query_scalar(
        "SELECT r.id FROM chat_rooms r
         JOIN chat_participants cp ON cp.room_id = r.id
         WHERE r.public_id = ? AND cp.user_id = ?",
    )
    .bind(room_public_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    room_id.ok_or_else(|| ServiceError::not_found("chat room not found"))
}

pub async fn list_rooms(pool: &SqlitePool, user_id: i64) -> Result<Vec<ChatRoom>, ServiceError> {
    let rows = sqlx::query_as::<_, RoomRow>(&format!(
        "{ROOM_SELECT} ORDER BY COALESCE(last_message_at, r.created_at) DESC, r.id DESC"
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for row in rows {
        rooms.push(to_room(pool, row).await?);
    }
    Ok(rooms)
}

/// Insert a room and its participants; duplicates in `participant_ids` are ignored.
pub async fn create_room_record(
    pool: &SqlitePool,
    title: &str,
    booking_id: Option<i64>,
    created_by: i64,
    participant_ids: &[i64],
) -> Result<String, ServiceError> {
    let public_id = new_public_id();
    let now = now_rfc3339();
    let members: BTreeSet<i64> = participant_ids
        .iter()
        .copied()
        .chain(std::iter::once(created_by))
        .collect();

    let mut tx = pool.begin().await?;

    let room_id = sqlx::query(
        "INSERT INTO chat_rooms (public_id, title, booking_id, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(title)
    .bind(booking_id)
    .bind(created_by)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for user_id in members {
        sqlx::query("INSERT INTO chat_participants (room_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(room_id)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    info!(room = %public_id, created_by, "chat room created");
    Ok(public_id)
}

pub async fn create_room(
    pool: &SqlitePool,
    creator_id: i64,
    req: CreateRoomRequest,
) -> Result<ChatRoom, ServiceError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ServiceError::bad_request("title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ServiceError::bad_request(format!(
            "title may be at most {MAX_TITLE_CHARS} characters"
        )));
    }

    let mut members = Vec::with_capacity(req.participant_ids.len());
    for id in &req.participant_ids {
        members.push(require_by_public_id(pool, id.trim(), "participant").await?.id);
    }

    let booking_id = match req.booking_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Some(require_participant_booking(pool, creator_id, id).await?.id),
        _ => None,
    };

    let public_id = create_room_record(pool, title, booking_id, creator_id, &members).await?;

    let row = sqlx::query_as::<_, RoomRow>(&format!("{ROOM_SELECT} WHERE r.public_id = ?"))
        .bind(creator_id)
        .bind(creator_id)
        .bind(creator_id)
        .bind(&public_id)
        .fetch_one(pool)
        .await?;

    to_room(pool, row).await
}

async fn attach_reads(pool: &SqlitePool, room_id: i64, rows: Vec<MessageRow>) -> Result<Vec<ChatMessage>, ServiceError> {
    let reads: Vec<(i64, String)> = sqlx::query_as(
        "SELECT mr.message_id, u.public_id
         FROM message_reads mr
         JOIN chat_messages m ON m.id = mr.message_id
         JOIN users u ON u.id = mr.user_id
         WHERE m.room_id = ?
         ORDER BY mr.read_at ASC",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;

    let mut by_message: HashMap<i64, Vec<String>> = HashMap::new();
    for (message_id, reader) in reads {
        by_message.entry(message_id).or_default().push(reader);
    }

    Ok(rows
        .into_iter()
        .map(|row| ChatMessage {
            read_by: by_message.remove(&row.row_id).unwrap_or_default(),
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            content: row.content,
            created_at: row.created_at,
        })
        .collect())
}

/// Page 1 holds the most recent messages; each page is returned oldest first.
pub async fn list_messages(
    pool: &SqlitePool,
    user_id: i64,
    room_public_id: &str,
    page: PageRequest,
) -> Result<Page<ChatMessage>, ServiceError> {
    let room_id = require_member(pool, user_id, room_public_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE room_id = ?")
        .bind(room_id)
        .fetch_one(pool)
        .await?;

    let mut rows = sqlx::query_as::<_, MessageRow>(&format!(
        "{MESSAGE_SELECT} WHERE m.room_id = ? ORDER BY m.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(room_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;
    rows.reverse();

    Ok(Page {
        items: attach_reads(pool, room_id, rows).await?,
        pagination: page.with_total(total),
    })
}

pub async fn post_message(
    pool: &SqlitePool,
    sender_id: i64,
    room_public_id: &str,
    content: &str,
) -> Result<ChatMessage, ServiceError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ServiceError::bad_request("message cannot be empty"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ServiceError::bad_request(format!(
            "message may be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }

    let room_id = require_member(pool, sender_id, room_public_id).await?;
    let public_id = new_public_id();
    let now = now_rfc3339();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO chat_messages (public_id, room_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(room_id)
    .bind(sender_id)
    .bind(content)
    .bind(&now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE chat_rooms SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(room_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let row = sqlx::query_as::<_, MessageRow>(&format!("{MESSAGE_SELECT} WHERE m.public_id = ?"))
        .bind(&public_id)
        .fetch_one(pool)
        .await?;

    let others: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM chat_participants WHERE room_id = ? AND user_id != ?",
    )
    .bind(room_id)
    .bind(sender_id)
    .fetch_all(pool)
    .await?;

    let preview: String = content.chars().take(80).collect();
    let title = format!("New message from {}", row.sender_name);
    for recipient in others {
        notify_quietly(pool, recipient, KIND_CHAT_MESSAGE, &title, &preview, Some(room_public_id)).await;
    }

    attach_reads(pool, room_id, vec![row])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::internal("posted message vanished"))
}

/// Record read receipts for every message from others the caller has not read yet.
pub async fn mark_room_read(pool: &SqlitePool, user_id: i64, room_public_id: &str) -> Result<u64, ServiceError> {
    let room_id = require_member(pool, user_id, room_public_id).await?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
        SELECT m.id, ?, ?
        FROM chat_messages m
        WHERE m.room_id = ? AND m.sender_id != ?
          AND NOT EXISTS (SELECT 1 FROM message_reads mr WHERE mr.message_id = m.id AND mr.user_id = ?)
        "#,
    )
    .bind(user_id)
    .bind(now_rfc3339())
    .bind(room_id)
    .bind(user_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
