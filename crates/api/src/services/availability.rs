use afscheid_auth::new_public_id;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::info;

use super::error::ServiceError;
use crate::routes::models::{AvailabilityQuery, AvailabilitySlot, CreateSlotRequest};
use crate::util::{clean_optional, format_timestamp, now_rfc3339, parse_timestamp};

pub const KIND_BLOCKED: &str = "blocked";
pub const KIND_BOOKED: &str = "booked";

const SLOT_SELECT: &str = r#"
    SELECT s.public_id AS id, s.starts_at, s.ends_at, s.kind,
           b.public_id AS booking_id, s.note, s.created_at
    FROM availability_slots s
    LEFT JOIN bookings b ON b.id = s.booking_id
"#;

/// Half-open intervals `[start, end)` conflict when each starts before the other ends.
pub fn overlaps<T: PartialOrd>(a_start: &T, a_end: &T, b_start: &T, b_end: &T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Parse and order-check a time window.
pub fn parse_window(
    starts_at: &str,
    ends_at: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let start = parse_timestamp(starts_at)
        .ok_or_else(|| ServiceError::bad_request("starts_at must be an RFC 3339 timestamp"))?;
    let end = parse_timestamp(ends_at)
        .ok_or_else(|| ServiceError::bad_request("ends_at must be an RFC 3339 timestamp"))?;

    // Stored timestamps keep whole seconds only.
    let start = start.trunc_subsecs(0);
    let end = end.trunc_subsecs(0);

    if end <= start {
        return Err(ServiceError::bad_request("ends_at must be after starts_at"));
    }
    if end - start < Duration::minutes(1) {
        return Err(ServiceError::bad_request("a time window must last at least one minute"));
    }

    Ok((start, end))
}

#[derive(Debug, FromRow)]
struct SlotWindow {
    public_id: String,
    starts_at: String,
    ends_at: String,
}

/// First slot of `owner_id` that overlaps `[start, end)`, found by scanning
/// every slot the owner has.
pub async fn find_conflict(
    conn: &mut SqliteConnection,
    owner_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Option<String>, ServiceError> {
    let slots = sqlx::query_as::<_, SlotWindow>(
        "SELECT public_id, starts_at, ends_at FROM availability_slots WHERE owner_id = ?",
    )
    .bind(owner_id)
    .fetch_all(conn)
    .await?;

    let conflict = slots.into_iter().find(|slot| {
        match (parse_timestamp(&slot.starts_at), parse_timestamp(&slot.ends_at)) {
            (Some(slot_start), Some(slot_end)) => overlaps(&start, &end, &slot_start, &slot_end),
            _ => false,
        }
    });

    Ok(conflict.map(|slot| slot.public_id))
}

pub async fn list_slots(
    pool: &SqlitePool,
    owner_id: i64,
    query: &AvailabilityQuery,
) -> Result<Vec<AvailabilitySlot>, ServiceError> {
    let from = match query.from.as_deref() {
        Some(raw) => Some(format_timestamp(
            parse_timestamp(raw).ok_or_else(|| ServiceError::bad_request("from must be an RFC 3339 timestamp"))?,
        )),
        None => None,
    };
    let to = match query.to.as_deref() {
        Some(raw) => Some(format_timestamp(
            parse_timestamp(raw).ok_or_else(|| ServiceError::bad_request("to must be an RFC 3339 timestamp"))?,
        )),
        None => None,
    };

    let slots = sqlx::query_as::<_, AvailabilitySlot>(&format!(
        "{SLOT_SELECT}
         WHERE s.owner_id = ?
           AND (? IS NULL OR s.ends_at > ?)
           AND (? IS NULL OR s.starts_at < ?)
         ORDER BY s.starts_at ASC"
    ))
    .bind(owner_id)
    .bind(&from)
    .bind(&from)
    .bind(&to)
    .bind(&to)
    .fetch_all(pool)
    .await?;

    Ok(slots)
}

pub async fn create_slot(
    pool: &SqlitePool,
    owner_id: i64,
    req: CreateSlotRequest,
) -> Result<AvailabilitySlot, ServiceError> {
    let (start, end) = parse_window(&req.starts_at, &req.ends_at)?;

    let mut conn = pool.acquire().await?;
    if let Some(existing) = find_conflict(&mut conn, owner_id, start, end).await? {
        return Err(ServiceError::conflict(format!(
            "time window overlaps existing slot {existing}"
        )));
    }

    let public_id = new_public_id();
    sqlx::query(
        r#"
        INSERT INTO availability_slots (public_id, owner_id, starts_at, ends_at, kind, note, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(owner_id)
    .bind(format_timestamp(start))
    .bind(format_timestamp(end))
    .bind(KIND_BLOCKED)
    .bind(clean_optional(req.note))
    .bind(now_rfc3339())
    .execute(&mut *conn)
    .await?;

    info!(slot = %public_id, owner_id, "availability slot blocked");

    let slot = sqlx::query_as::<_, AvailabilitySlot>(&format!("{SLOT_SELECT} WHERE s.public_id = ?"))
        .bind(&public_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(slot)
}

pub async fn delete_slot(pool: &SqlitePool, owner_id: i64, slot_id: &str) -> Result<(), ServiceError> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT owner_id, kind FROM availability_slots WHERE public_id = ?")
            .bind(slot_id)
            .fetch_optional(pool)
            .await?;

    let (slot_owner, kind) = row.ok_or_else(|| ServiceError::not_found("slot not found"))?;
    if slot_owner != owner_id {
        return Err(ServiceError::not_found("slot not found"));
    }
    if kind == KIND_BOOKED {
        return Err(ServiceError::bad_request(
            "booked slots are released by cancelling the booking",
        ));
    }

    sqlx::query("DELETE FROM availability_slots WHERE public_id = ?")
        .bind(slot_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_parties, create_test_db, insert_booking};

    fn request(starts_at: &str, ends_at: &str) -> CreateSlotRequest {
        CreateSlotRequest {
            starts_at: starts_at.into(),
            ends_at: ends_at.into(),
            note: None,
        }
    }

    #[test]
    fn overlap_uses_half_open_intervals() {
        assert!(overlaps(&1, &5, &4, &8));
        assert!(overlaps(&4, &8, &1, &5));
        assert!(overlaps(&1, &10, &3, &4));
        assert!(!overlaps(&1, &5, &5, &8));
        assert!(!overlaps(&5, &8, &1, &5));
    }

    #[test]
    fn window_must_end_after_start() {
        assert!(parse_window("2030-01-01T10:00:00Z", "2030-01-01T10:00:00Z").is_err());
        assert!(parse_window("gisteren", "2030-01-01T10:00:00Z").is_err());
        assert!(parse_window("2030-01-01T10:00:00Z", "2030-01-01T11:00:00Z").is_ok());
        assert!(parse_window("2030-01-01T10:00:00.100Z", "2030-01-01T10:00:00.900Z").is_err());
        assert!(parse_window("2030-01-01T10:00:00Z", "2030-01-01T10:00:59Z").is_err());

        let (start, end) = parse_window("2030-01-01T10:00:00.750Z", "2030-01-01T10:01:00.250Z").unwrap();
        assert_eq!(format_timestamp(start), "2030-01-01T10:00:00Z");
        assert_eq!(end - start, Duration::minutes(1));
    }

    #[tokio::test]
    async fn overlapping_slots_are_rejected_and_adjacent_ones_allowed() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        let owner = parties.director.id;

        create_slot(&pool, owner, request("2030-01-01T10:00:00Z", "2030-01-01T12:00:00Z"))
            .await
            .unwrap();

        let err = create_slot(&pool, owner, request("2030-01-01T11:00:00+00:00", "2030-01-01T13:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let adjacent = create_slot(&pool, owner, request("2030-01-01T14:00:00+02:00", "2030-01-01T15:00:00+02:00"))
            .await
            .unwrap();
        assert_eq!(adjacent.starts_at, "2030-01-01T12:00:00Z");
        assert_eq!(adjacent.kind, KIND_BLOCKED);

        // Another owner is unaffected.
        create_slot(&pool, parties.venue.id, request("2030-01-01T10:00:00Z", "2030-01-01T12:00:00Z"))
            .await
            .unwrap();

        let slots = list_slots(&pool, owner, &AvailabilityQuery::default()).await.unwrap();
        assert_eq!(slots.len(), 2);

        let filtered = list_slots(
            &pool,
            owner,
            &AvailabilityQuery {
                from: Some("2030-01-01T12:00:00Z".into()),
                to: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[tokio::test]
    async fn booked_slots_cannot_be_deleted_directly() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        let (booking_id, _) = insert_booking(
            &pool,
            &parties,
            "2030-01-01T10:00:00Z",
            "2030-01-01T12:00:00Z",
            "pending",
            12_000,
            18_000,
        )
        .await;

        sqlx::query(
            "INSERT INTO availability_slots (public_id, owner_id, starts_at, ends_at, kind, booking_id, created_at)
             VALUES ('slot-booked', ?, '2030-01-01T10:00:00Z', '2030-01-01T12:00:00Z', 'booked', ?, '2025-01-01T00:00:00Z')",
        )
        .bind(parties.director.id)
        .bind(booking_id)
        .execute(&pool)
        .await
        .unwrap();

        let err = delete_slot(&pool, parties.director.id, "slot-booked").await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let blocked = create_slot(&pool, parties.director.id, request("2030-02-01T10:00:00Z", "2030-02-01T11:00:00Z"))
            .await
            .unwrap();

        let err = delete_slot(&pool, parties.venue.id, &blocked.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        delete_slot(&pool, parties.director.id, &blocked.id).await.unwrap();
    }
}
