use afscheid_auth::UserRole;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::bookings::{participant_column, BOOKING_SELECT};
use super::compliance;
use super::error::ServiceError;
use super::notifications::get_unread_count;
use crate::routes::models::{Booking, DashboardSummary};
use crate::util::now_rfc3339;

const DASHBOARD_LIST_LIMIT: i64 = 10;

async fn upcoming_bookings(
    pool: &SqlitePool,
    user_id: i64,
    role: UserRole,
    statuses: &str,
) -> Result<Vec<Booking>, ServiceError> {
    let column = participant_column(role);
    let rows = sqlx::query_as::<_, Booking>(&format!(
        "{BOOKING_SELECT}
         WHERE {column} = ? AND b.status IN ({statuses}) AND b.ends_at > ?
         ORDER BY b.starts_at ASC
         LIMIT ?"
    ))
    .bind(user_id)
    .bind(now_rfc3339())
    .bind(DASHBOARD_LIST_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Role-dispatched summary for the landing page of each user kind.
pub async fn summary(
    pool: &SqlitePool,
    user_id: i64,
    role: UserRole,
    today: NaiveDate,
) -> Result<DashboardSummary, ServiceError> {
    let unread_notifications = get_unread_count(pool, user_id).await?;

    let summary = match role {
        UserRole::Family => {
            let pending_payments: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM payments WHERE payer_id = ? AND status = 'pending'",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?;

            DashboardSummary::Family {
                upcoming_bookings: upcoming_bookings(pool, user_id, role, "'pending', 'confirmed'").await?,
                pending_payments,
                unread_notifications,
            }
        }
        UserRole::Director => {
            let active_clients: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM director_clients WHERE director_id = ? AND status = 'active'",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?;

            DashboardSummary::Director {
                pending_bookings: upcoming_bookings(pool, user_id, role, "'pending'").await?,
                active_clients,
                compliance_alerts: compliance::alerts(pool, user_id, today).await?,
                unread_notifications,
            }
        }
        UserRole::Venue => {
            let pending_split_cents: i64 = sqlx::query_scalar(
                "SELECT COALESCE(SUM(amount_cents), 0) FROM payment_splits WHERE recipient_id = ? AND status = 'pending'",
            )
            .bind(user_id)
            .fetch_one(pool)
            .await?;

            DashboardSummary::Venue {
                upcoming_bookings: upcoming_bookings(pool, user_id, role, "'pending', 'confirmed'").await?,
                pending_split_cents,
                unread_notifications,
            }
        }
    };

    Ok(summary)
}
