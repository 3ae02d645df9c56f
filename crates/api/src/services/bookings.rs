use afscheid_auth::{new_public_id, UserRole};
use chrono::{Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use super::availability::{find_conflict, parse_window, KIND_BOOKED};
use super::error::ServiceError;
use super::notifications::{notify_quietly, KIND_BOOKING_CREATED, KIND_BOOKING_STATUS};
use super::pricing::price_cents;
use super::{chat, clients};
use crate::routes::models::{Booking, BookingListQuery, CreateBookingRequest};
use crate::util::{clean_optional, format_timestamp, now_rfc3339, Page, PageRequest};

pub const SERVICE_TYPES: &[&str] = &["burial", "cremation", "memorial"];
pub const STATUSES: &[&str] = &["pending", "confirmed", "cancelled", "completed"];
pub const MAX_DURATION_HOURS: i64 = 12;

pub(crate) const BOOKING_SELECT: &str = r#"
    SELECT b.public_id AS id,
           f.public_id AS family_id, f.full_name AS family_name,
           d.public_id AS director_id,
           COALESCE(NULLIF(dp.company_name, ''), d.full_name) AS director_name,
           v.public_id AS venue_id,
           COALESCE(NULLIF(vp.name, ''), v.full_name) AS venue_name,
           b.service_type, b.starts_at, b.ends_at, b.attendee_count, b.notes, b.status,
           b.director_amount_cents, b.venue_amount_cents, b.total_price_cents,
           b.created_at, b.updated_at
    FROM bookings b
    JOIN users f ON f.id = b.family_id
    JOIN users d ON d.id = b.director_id
    JOIN users v ON v.id = b.venue_id
    LEFT JOIN director_profiles dp ON dp.user_id = b.director_id
    LEFT JOIN venue_profiles vp ON vp.user_id = b.venue_id
"#;

/// Internal view of a booking used for authorization checks.
#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    pub id: i64,
    pub public_id: String,
    pub family_id: i64,
    pub director_id: i64,
    pub venue_id: i64,
    pub status: String,
    pub starts_at: String,
    pub director_amount_cents: i64,
    pub venue_amount_cents: i64,
    pub total_price_cents: i64,
}

impl BookingRow {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.family_id == user_id || self.director_id == user_id || self.venue_id == user_id
    }

    pub fn participant_ids(&self) -> [i64; 3] {
        [self.family_id, self.director_id, self.venue_id]
    }
}

pub async fn find_booking_row(
    pool: &SqlitePool,
    public_id: &str,
) -> Result<Option<BookingRow>, ServiceError> {
    let row = sqlx::query_as::<_, BookingRow>(
        r#"
        SELECT id, public_id, family_id, director_id, venue_id, status, starts_at,
               director_amount_cents, venue_amount_cents, total_price_cents
        FROM bookings WHERE public_id = ?
        "#,
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Booking visible to `user_id`; anyone else gets NotFound.
pub async fn require_participant_booking(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
) -> Result<BookingRow, ServiceError> {
    find_booking_row(pool, public_id)
        .await?
        .filter(|row| row.is_participant(user_id))
        .ok_or_else(|| ServiceError::not_found("booking not found"))
}

#[derive(Debug, FromRow)]
struct Provider {
    id: i64,
    hourly_rate_cents: i64,
    capacity: i64,
    is_active: bool,
}

async fn load_provider(
    pool: &SqlitePool,
    public_id: &str,
    role: UserRole,
) -> Result<Provider, ServiceError> {
    let sql = match role {
        UserRole::Director => {
            "SELECT u.id, p.hourly_rate_cents, 0 AS capacity, p.is_active
             FROM users u JOIN director_profiles p ON p.user_id = u.id
             WHERE u.public_id = ? AND u.role = 'director'"
        }
        UserRole::Venue => {
            "SELECT u.id, p.hourly_rate_cents, p.capacity, p.is_active
             FROM users u JOIN venue_profiles p ON p.user_id = u.id
             WHERE u.public_id = ? AND u.role = 'venue'"
        }
        UserRole::Family => return Err(ServiceError::internal("families do not provide services")),
    };

    let provider = sqlx::query_as::<_, Provider>(sql)
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::bad_request(format!("{role} not found")))?;

    if !provider.is_active || provider.hourly_rate_cents <= 0 {
        return Err(ServiceError::bad_request(format!(
            "{role} is not accepting bookings"
        )));
    }

    Ok(provider)
}

pub async fn create_booking(
    pool: &SqlitePool,
    family_id: i64,
    req: CreateBookingRequest,
) -> Result<Booking, ServiceError> {
    let service_type = req.service_type.trim().to_lowercase();
    if !SERVICE_TYPES.contains(&service_type.as_str()) {
        return Err(ServiceError::bad_request(format!(
            "service_type must be one of {}",
            SERVICE_TYPES.join(", ")
        )));
    }
    if req.director_id.trim().is_empty() || req.venue_id.trim().is_empty() {
        return Err(ServiceError::bad_request("director_id and venue_id are required"));
    }

    let (start, end) = parse_window(&req.starts_at, &req.ends_at)?;
    if end - start > Duration::hours(MAX_DURATION_HOURS) {
        return Err(ServiceError::bad_request(format!(
            "a booking may last at most {MAX_DURATION_HOURS} hours"
        )));
    }

    let attendee_count = req.attendee_count.unwrap_or(0);
    if attendee_count < 0 {
        return Err(ServiceError::bad_request("attendee_count cannot be negative"));
    }

    if start <= Utc::now() {
        return Err(ServiceError::bad_request("starts_at must be in the future"));
    }

    let director = load_provider(pool, req.director_id.trim(), UserRole::Director).await?;
    let venue = load_provider(pool, req.venue_id.trim(), UserRole::Venue).await?;

    if venue.capacity > 0 && attendee_count > venue.capacity {
        return Err(ServiceError::bad_request(format!(
            "venue holds at most {} attendees",
            venue.capacity
        )));
    }

    {
        let mut conn = pool.acquire().await?;
        if find_conflict(&mut conn, director.id, start, end).await?.is_some() {
            return Err(ServiceError::conflict("director is not available in this time window"));
        }
        if find_conflict(&mut conn, venue.id, start, end).await?.is_some() {
            return Err(ServiceError::conflict("venue is not available in this time window"));
        }
    }

    let minutes = (end - start).num_minutes();
    let (director_amount, venue_amount) = match (
        price_cents(director.hourly_rate_cents, minutes),
        price_cents(venue.hourly_rate_cents, minutes),
    ) {
        (Some(director_amount), Some(venue_amount)) => (director_amount, venue_amount),
        _ => return Err(ServiceError::bad_request("booking price is out of range")),
    };
    let total_price = director_amount
        .checked_add(venue_amount)
        .ok_or_else(|| ServiceError::bad_request("booking price is out of range"))?;

    let public_id = new_public_id();
    let now = now_rfc3339();
    let starts_at = format_timestamp(start);
    let ends_at = format_timestamp(end);

    let mut tx = pool.begin().await?;

    let booking_id = sqlx::query(
        r#"
        INSERT INTO bookings (
            public_id, family_id, director_id, venue_id, service_type, starts_at, ends_at,
            attendee_count, notes, status, director_amount_cents, venue_amount_cents,
            total_price_cents, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(family_id)
    .bind(director.id)
    .bind(venue.id)
    .bind(&service_type)
    .bind(&starts_at)
    .bind(&ends_at)
    .bind(attendee_count)
    .bind(clean_optional(req.notes))
    .bind(director_amount)
    .bind(venue_amount)
    .bind(total_price)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for owner_id in [director.id, venue.id] {
        sqlx::query(
            r#"
            INSERT INTO availability_slots (public_id, owner_id, starts_at, ends_at, kind, booking_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_public_id())
        .bind(owner_id)
        .bind(&starts_at)
        .bind(&ends_at)
        .bind(KIND_BOOKED)
        .bind(booking_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        booking = %public_id,
        family_id,
        director_id = director.id,
        venue_id = venue.id,
        total_cents = total_price,
        "booking created"
    );

    let booking = get_booking_by_public_id(pool, &public_id).await?;

    let body = format!(
        "{} requested a {} on {}",
        booking.family_name, booking.service_type, booking.starts_at
    );
    for recipient in [director.id, venue.id] {
        notify_quietly(
            pool,
            recipient,
            KIND_BOOKING_CREATED,
            "New booking request",
            &body,
            Some(&public_id),
        )
        .await;
    }

    let title = format!("Uitvaart {}", booking.family_name);
    if let Err(error) = chat::create_room_record(
        pool,
        &title,
        Some(booking_id),
        family_id,
        &[family_id, director.id, venue.id],
    )
    .await
    {
        warn!(%error, booking = %public_id, "failed to open booking chat room");
    }

    if let Err(error) = clients::ensure_active_relationship(pool, director.id, family_id).await {
        warn!(%error, booking = %public_id, "failed to record director client");
    }

    Ok(booking)
}

pub async fn get_booking_by_public_id(pool: &SqlitePool, public_id: &str) -> Result<Booking, ServiceError> {
    sqlx::query_as::<_, Booking>(&format!("{BOOKING_SELECT} WHERE b.public_id = ?"))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("booking not found"))
}

pub async fn get_booking(
    pool: &SqlitePool,
    user_id: i64,
    public_id: &str,
) -> Result<Booking, ServiceError> {
    require_participant_booking(pool, user_id, public_id).await?;
    get_booking_by_public_id(pool, public_id).await
}

pub(crate) fn participant_column(role: UserRole) -> &'static str {
    match role {
        UserRole::Family => "b.family_id",
        UserRole::Director => "b.director_id",
        UserRole::Venue => "b.venue_id",
    }
}

pub async fn list_bookings(
    pool: &SqlitePool,
    user_id: i64,
    role: UserRole,
    query: &BookingListQuery,
) -> Result<Page<Booking>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let status = clean_optional(query.status.clone()).map(|value| value.to_lowercase());
    if let Some(value) = &status {
        if !STATUSES.contains(&value.as_str()) {
            return Err(ServiceError::bad_request(format!(
                "status must be one of {}",
                STATUSES.join(", ")
            )));
        }
    }

    let column = participant_column(role);

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM bookings b WHERE {column} = ? AND (? IS NULL OR b.status = ?)"
    ))
    .bind(user_id)
    .bind(&status)
    .bind(&status)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, Booking>(&format!(
        "{BOOKING_SELECT}
         WHERE {column} = ? AND (? IS NULL OR b.status = ?)
         ORDER BY b.starts_at DESC, b.id DESC
         LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(&status)
    .bind(&status)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}

/// Which roles may move a booking from `from` to `to`; `None` when the
/// transition does not exist at all.
fn allowed_roles(from: &str, to: &str) -> Option<&'static [UserRole]> {
    match (from, to) {
        ("pending", "confirmed") => Some(&[UserRole::Director, UserRole::Venue]),
        ("pending" | "confirmed", "cancelled") => {
            Some(&[UserRole::Family, UserRole::Director, UserRole::Venue])
        }
        ("confirmed", "completed") => Some(&[UserRole::Director]),
        _ => None,
    }
}

pub async fn update_booking_status(
    pool: &SqlitePool,
    user_id: i64,
    role: UserRole,
    public_id: &str,
    status: &str,
) -> Result<Booking, ServiceError> {
    let next = status.trim().to_lowercase();
    if !STATUSES.contains(&next.as_str()) {
        return Err(ServiceError::bad_request(format!(
            "status must be one of {}",
            STATUSES.join(", ")
        )));
    }

    let row = require_participant_booking(pool, user_id, public_id).await?;

    let roles = allowed_roles(&row.status, &next).ok_or_else(|| {
        ServiceError::bad_request(format!(
            "cannot change booking status from {} to {next}",
            row.status
        ))
    })?;
    if !roles.contains(&role) {
        return Err(ServiceError::forbidden(format!(
            "a {role} cannot change booking status to {next}"
        )));
    }

    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(&next)
        .bind(now_rfc3339())
        .bind(row.id)
        .bind(&row.status)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ServiceError::conflict("booking status changed concurrently"));
    }

    if next == "cancelled" {
        let released = sqlx::query("DELETE FROM availability_slots WHERE booking_id = ? AND kind = ?")
            .bind(row.id)
            .bind(KIND_BOOKED)
            .execute(&mut *tx)
            .await?;
        info!(booking = %row.public_id, released = released.rows_affected(), "booked slots released");
    }

    tx.commit().await?;

    info!(booking = %row.public_id, from = %row.status, to = %next, "booking status changed");

    let body = format!("Booking {} is now {next}", row.public_id);
    for recipient in row.participant_ids().into_iter().filter(|id| *id != user_id) {
        notify_quietly(
            pool,
            recipient,
            KIND_BOOKING_STATUS,
            "Booking updated",
            &body,
            Some(&row.public_id),
        )
        .await;
    }

    get_booking_by_public_id(pool, public_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_director, create_parties, create_test_db, create_test_user, Parties};

    fn in_days(days: i64, hour: u32) -> String {
        let date = (Utc::now() + Duration::days(days)).date_naive();
        format!("{date}T{hour:02}:00:00Z")
    }

    fn request(parties: &Parties, starts_at: String, ends_at: String) -> CreateBookingRequest {
        CreateBookingRequest {
            director_id: parties.director.public_id.clone(),
            venue_id: parties.venue.public_id.clone(),
            service_type: "burial".into(),
            starts_at,
            ends_at,
            attendee_count: Some(80),
            notes: Some("  Graag witte bloemen ".into()),
        }
    }

    #[tokio::test]
    async fn booking_prices_both_providers_and_blocks_their_calendars() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;

        let booking = create_booking(
            &pool,
            parties.family.id,
            request(&parties, in_days(3, 10), in_days(3, 12)),
        )
        .await
        .unwrap();

        assert_eq!(booking.status, "pending");
        assert_eq!(booking.director_amount_cents, 12_000);
        assert_eq!(booking.venue_amount_cents, 18_000);
        assert_eq!(booking.total_price_cents, 30_000);
        assert_eq!(booking.notes.as_deref(), Some("Graag witte bloemen"));

        let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM availability_slots WHERE kind = 'booked'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(booked, 2);

        let rooms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_participants")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rooms, 3);

        let client_status: String = sqlx::query_scalar(
            "SELECT status FROM director_clients WHERE director_id = ? AND family_id = ?",
        )
        .bind(parties.director.id)
        .bind(parties.family.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(client_status, "active");

        let notified: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE type = 'booking_created'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(notified, 2);
    }

    #[tokio::test]
    async fn booking_in_the_past_is_rejected() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;

        let err = create_booking(
            &pool,
            parties.family.id,
            request(&parties, in_days(-2, 10), in_days(-2, 12)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::BadRequest(ref msg) if msg.contains("future")));
    }

    #[tokio::test]
    async fn oversized_rate_is_rejected_instead_of_overflowing() {
        let (pool, _dir) = create_test_db().await;
        let mut parties = create_parties(&pool).await;
        parties.director = create_director(&pool, "duur@example.com", i64::MAX / 2, true).await;

        let err = create_booking(
            &pool,
            parties.family.id,
            request(&parties, in_days(3, 10), in_days(3, 12)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(ref msg) if msg.contains("out of range")));

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn sub_second_window_is_rejected() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        let date = (Utc::now() + Duration::days(3)).date_naive();

        let err = create_booking(
            &pool,
            parties.family.id,
            request(
                &parties,
                format!("{date}T10:00:00.100Z"),
                format!("{date}T10:00:00.900Z"),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn inactive_or_unknown_director_is_rejected() {
        let (pool, _dir) = create_test_db().await;
        let mut parties = create_parties(&pool).await;
        parties.director = create_director(&pool, "slapend@example.com", 6_000, false).await;

        let err = create_booking(
            &pool,
            parties.family.id,
            request(&parties, in_days(3, 10), in_days(3, 12)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(ref msg) if msg.contains("director")));

        parties.director = create_test_user(&pool, "geen-profiel@example.com", "family").await;
        let err = create_booking(
            &pool,
            parties.family.id,
            request(&parties, in_days(3, 10), in_days(3, 12)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(ref msg) if msg.contains("director not found")));
    }

    #[tokio::test]
    async fn overlapping_venue_booking_is_a_conflict() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;

        create_booking(&pool, parties.family.id, request(&parties, in_days(4, 10), in_days(4, 12)))
            .await
            .unwrap();

        let second = Parties {
            family: create_test_user(&pool, "andere-familie@example.com", "family").await,
            director: create_director(&pool, "tweede@example.com", 5_000, true).await,
            venue: parties.venue.clone(),
        };

        let err = create_booking(&pool, second.family.id, request(&second, in_days(4, 11), in_days(4, 13)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(ref msg) if msg.contains("venue")));

        create_booking(&pool, second.family.id, request(&second, in_days(4, 12), in_days(4, 14)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;

        let mut long = request(&parties, in_days(3, 6), in_days(3, 19));
        long.service_type = "cremation".into();
        assert!(matches!(
            create_booking(&pool, parties.family.id, long).await.unwrap_err(),
            ServiceError::BadRequest(_)
        ));

        let mut kind = request(&parties, in_days(3, 10), in_days(3, 11));
        kind.service_type = "party".into();
        assert!(matches!(
            create_booking(&pool, parties.family.id, kind).await.unwrap_err(),
            ServiceError::BadRequest(_)
        ));

        let mut crowd = request(&parties, in_days(3, 10), in_days(3, 11));
        crowd.attendee_count = Some(500);
        assert!(matches!(
            create_booking(&pool, parties.family.id, crowd).await.unwrap_err(),
            ServiceError::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn status_transitions_follow_roles_and_cancel_releases_slots() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        let booking = create_booking(&pool, parties.family.id, request(&parties, in_days(5, 10), in_days(5, 12)))
            .await
            .unwrap();

        let err = update_booking_status(&pool, parties.family.id, UserRole::Family, &booking.id, "confirmed")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = update_booking_status(&pool, parties.director.id, UserRole::Director, &booking.id, "completed")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let outsider = create_test_user(&pool, "buur@example.com", "family").await;
        let err = update_booking_status(&pool, outsider.id, UserRole::Family, &booking.id, "cancelled")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let confirmed = update_booking_status(&pool, parties.venue.id, UserRole::Venue, &booking.id, "confirmed")
            .await
            .unwrap();
        assert_eq!(confirmed.status, "confirmed");

        let cancelled = update_booking_status(&pool, parties.family.id, UserRole::Family, &booking.id, "cancelled")
            .await
            .unwrap();
        assert_eq!(cancelled.status, "cancelled");

        let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM availability_slots WHERE kind = 'booked'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(booked, 0);

        let err = update_booking_status(&pool, parties.family.id, UserRole::Family, &booking.id, "pending")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let (pool, _dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        create_booking(&pool, parties.family.id, request(&parties, in_days(6, 10), in_days(6, 11)))
            .await
            .unwrap();

        let mine = list_bookings(&pool, parties.venue.id, UserRole::Venue, &BookingListQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 1);

        let none = list_bookings(&pool, parties.venue.id, UserRole::Family, &BookingListQuery::default())
            .await
            .unwrap();
        assert_eq!(none.pagination.total, 0);

        let err = list_bookings(
            &pool,
            parties.family.id,
            UserRole::Family,
            &BookingListQuery {
                status: Some("lost".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }
}
