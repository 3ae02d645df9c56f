//! Deadline tracking under the Wet op de lijkbezorging: burial or cremation
//! no later than the sixth working day after death.

use afscheid_assistant::ComplianceContext;
use afscheid_auth::new_public_id;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use super::bookings::require_participant_booking;
use super::error::{is_unique_violation, ServiceError};
use super::notifications::{notify_quietly, KIND_COMPLIANCE};
use crate::routes::models::{ComplianceRecord, CreateComplianceRequest};
use crate::util::{now_rfc3339, parse_date, Page, PageRequest};

pub const LEGAL_WORKING_DAYS: u32 = 6;

const COMPLIANCE_SELECT: &str = r#"
    SELECT c.id, c.public_id, b.public_id AS booking_id, b.family_id, b.director_id, b.venue_id,
           c.death_registration_date, c.legal_deadline, c.status, c.emergency_reason,
           c.created_at, c.updated_at
    FROM compliance_tracking c
    JOIN bookings b ON b.id = c.booking_id
"#;

/// Skips Saturdays and Sundays. Public holidays are not modelled.
pub fn add_working_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    date
}

pub fn legal_deadline(death_registration_date: NaiveDate) -> NaiveDate {
    add_working_days(death_registration_date, LEGAL_WORKING_DAYS)
}

pub fn days_remaining(deadline: NaiveDate, today: NaiveDate) -> i64 {
    (deadline - today).num_days()
}

/// `completed` and `emergency` are kept as stored; everything else follows
/// from the days remaining.
pub fn derive_status(stored: &str, days_remaining: i64) -> &str {
    match stored {
        "completed" | "emergency" => stored,
        _ if days_remaining < 0 => "overdue",
        _ if days_remaining <= 1 => "urgent",
        _ => "on_track",
    }
}

#[derive(Debug, FromRow)]
struct ComplianceRow {
    id: i64,
    public_id: String,
    booking_id: String,
    family_id: i64,
    director_id: i64,
    venue_id: i64,
    death_registration_date: String,
    legal_deadline: String,
    status: String,
    emergency_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ComplianceRow {
    fn is_participant(&self, user_id: i64) -> bool {
        self.family_id == user_id || self.director_id == user_id || self.venue_id == user_id
    }

    fn into_record(self, today: NaiveDate) -> ComplianceRecord {
        let remaining = parse_date(&self.legal_deadline)
            .map(|deadline| days_remaining(deadline, today))
            .unwrap_or_default();
        ComplianceRecord {
            status: derive_status(&self.status, remaining).to_string(),
            days_remaining: remaining,
            id: self.public_id,
            booking_id: self.booking_id,
            death_registration_date: self.death_registration_date,
            legal_deadline: self.legal_deadline,
            emergency_reason: self.emergency_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

async fn find_row(pool: &SqlitePool, column: &str, value: &str) -> Result<Option<ComplianceRow>, ServiceError> {
    let row = sqlx::query_as::<_, ComplianceRow>(&format!("{COMPLIANCE_SELECT} WHERE {column} = ?"))
        .bind(value)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Record owned by the booking's director; anyone else gets NotFound.
async fn require_director_row(
    pool: &SqlitePool,
    director_id: i64,
    public_id: &str,
) -> Result<ComplianceRow, ServiceError> {
    find_row(pool, "c.public_id", public_id)
        .await?
        .filter(|row| row.director_id == director_id)
        .ok_or_else(|| ServiceError::not_found("compliance record not found"))
}

pub async fn create_record(
    pool: &SqlitePool,
    director_id: i64,
    req: CreateComplianceRequest,
    today: NaiveDate,
) -> Result<ComplianceRecord, ServiceError> {
    let booking = require_participant_booking(pool, director_id, req.booking_id.trim()).await?;
    if booking.director_id != director_id {
        return Err(ServiceError::forbidden(
            "only the booking's director can track compliance",
        ));
    }

    let death_date = parse_date(&req.death_registration_date).ok_or_else(|| {
        ServiceError::bad_request("death_registration_date must be a YYYY-MM-DD date")
    })?;
    if death_date > today {
        return Err(ServiceError::bad_request(
            "death_registration_date cannot be in the future",
        ));
    }

    let deadline = legal_deadline(death_date);
    let public_id = new_public_id();
    let now = now_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO compliance_tracking (
            public_id, booking_id, death_registration_date, legal_deadline, status,
            created_by, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, 'on_track', ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(booking.id)
    .bind(death_date.to_string())
    .bind(deadline.to_string())
    .bind(director_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match inserted {
        Err(err) if is_unique_violation(&err) => {
            return Err(ServiceError::conflict(
                "booking already has a compliance record",
            ))
        }
        other => {
            other?;
        }
    }

    info!(record = %public_id, booking = %booking.public_id, deadline = %deadline, "compliance tracking started");

    find_row(pool, "c.public_id", &public_id)
        .await?
        .map(|row| row.into_record(today))
        .ok_or_else(|| ServiceError::internal("compliance record vanished"))
}

/// The director's records, closest deadline first.
pub async fn list_records(
    pool: &SqlitePool,
    director_id: i64,
    page: PageRequest,
    today: NaiveDate,
) -> Result<Page<ComplianceRecord>, ServiceError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM compliance_tracking c JOIN bookings b ON b.id = c.booking_id WHERE b.director_id = ?",
    )
    .bind(director_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, ComplianceRow>(&format!(
        "{COMPLIANCE_SELECT} WHERE b.director_id = ? ORDER BY c.legal_deadline ASC, c.id ASC LIMIT ? OFFSET ?"
    ))
    .bind(director_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items: rows.into_iter().map(|row| row.into_record(today)).collect(),
        pagination: page.with_total(total),
    })
}

/// Open records whose deadline is tomorrow or already passed.
pub async fn alerts(
    pool: &SqlitePool,
    director_id: i64,
    today: NaiveDate,
) -> Result<Vec<ComplianceRecord>, ServiceError> {
    let rows = sqlx::query_as::<_, ComplianceRow>(&format!(
        "{COMPLIANCE_SELECT}
         WHERE b.director_id = ? AND c.status NOT IN ('completed', 'emergency')
         ORDER BY c.legal_deadline ASC, c.id ASC"
    ))
    .bind(director_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_record(today))
        .filter(|record| matches!(record.status.as_str(), "urgent" | "overdue"))
        .collect())
}

pub async fn get_for_booking(
    pool: &SqlitePool,
    user_id: i64,
    booking_public_id: &str,
    today: NaiveDate,
) -> Result<ComplianceRecord, ServiceError> {
    find_row(pool, "b.public_id", booking_public_id)
        .await?
        .filter(|row| row.is_participant(user_id))
        .map(|row| row.into_record(today))
        .ok_or_else(|| ServiceError::not_found("compliance record not found"))
}

/// Mark a record `completed`, or reopen it with `on_track` so the status is
/// derived again.
pub async fn update_status(
    pool: &SqlitePool,
    director_id: i64,
    public_id: &str,
    status: &str,
    today: NaiveDate,
) -> Result<ComplianceRecord, ServiceError> {
    let status = status.trim().to_lowercase();
    if !matches!(status.as_str(), "completed" | "on_track") {
        return Err(ServiceError::bad_request("status must be completed or on_track"));
    }

    let row = require_director_row(pool, director_id, public_id).await?;

    sqlx::query(
        "UPDATE compliance_tracking SET status = ?, emergency_reason = CASE WHEN ? = 'on_track' THEN NULL ELSE emergency_reason END, updated_at = ? WHERE id = ?",
    )
    .bind(&status)
    .bind(&status)
    .bind(now_rfc3339())
    .bind(row.id)
    .execute(pool)
    .await?;

    info!(record = %public_id, status = %status, "compliance status changed");

    find_row(pool, "c.public_id", public_id)
        .await?
        .map(|row| row.into_record(today))
        .ok_or_else(|| ServiceError::internal("compliance record vanished"))
}

pub async fn declare_emergency(
    pool: &SqlitePool,
    director_id: i64,
    public_id: &str,
    reason: &str,
    today: NaiveDate,
) -> Result<ComplianceRecord, ServiceError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ServiceError::bad_request("reason is required"));
    }

    let row = require_director_row(pool, director_id, public_id).await?;

    sqlx::query(
        "UPDATE compliance_tracking SET status = 'emergency', emergency_reason = ?, updated_at = ? WHERE id = ?",
    )
    .bind(reason)
    .bind(now_rfc3339())
    .bind(row.id)
    .execute(pool)
    .await?;

    info!(record = %public_id, booking = %row.booking_id, "compliance emergency declared");

    let body = format!(
        "The legal deadline of {} cannot be met: {reason}",
        row.legal_deadline
    );
    for recipient in [row.family_id, row.venue_id] {
        notify_quietly(
            pool,
            recipient,
            KIND_COMPLIANCE,
            "Funeral deadline emergency",
            &body,
            Some(&row.booking_id),
        )
        .await;
    }

    find_row(pool, "c.public_id", public_id)
        .await?
        .map(|row| row.into_record(today))
        .ok_or_else(|| ServiceError::internal("compliance record vanished"))
}

/// Deadline facts handed to the assistant in compliance mode.
pub async fn assistant_context(
    pool: &SqlitePool,
    user_id: i64,
    booking_public_id: &str,
    today: NaiveDate,
) -> Result<ComplianceContext, ServiceError> {
    let record = get_for_booking(pool, user_id, booking_public_id, today).await?;
    Ok(ComplianceContext {
        death_registration_date: record.death_registration_date,
        legal_deadline: record.legal_deadline,
        days_remaining: record.days_remaining,
        status: record.status,
        emergency_reason: record.emergency_reason,
    })
}
