use std::collections::BTreeSet;

use afscheid_auth::new_public_id;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use super::bookings::find_booking_row;
use super::error::ServiceError;
use super::notifications::{notify_quietly, KIND_PAYMENT, KIND_PAYOUT};
use super::pricing::split_amounts;
use crate::routes::models::{Payment, PaymentSplit, SplitListQuery, UpdateSplitsRequest};
use crate::util::{clean_optional, now_rfc3339, Page, PageRequest};

pub const SPLIT_STATUSES: &[&str] = &["pending", "paid", "payout_requested"];

const PAYMENT_SELECT: &str = r#"
    SELECT p.public_id AS id, b.public_id AS booking_id, u.public_id AS payer_id,
           p.amount_cents, p.currency, p.status, p.created_at, p.updated_at
    FROM payments p
    JOIN bookings b ON b.id = p.booking_id
    JOIN users u ON u.id = p.payer_id
"#;

const SPLIT_SELECT: &str = r#"
    SELECT s.public_id AS id, p.public_id AS payment_id, r.public_id AS recipient_id,
           s.recipient_role, s.amount_cents, s.status, s.paid_at, s.payout_requested_at,
           s.created_at
    FROM payment_splits s
    JOIN payments p ON p.id = s.payment_id
    LEFT JOIN users r ON r.id = s.recipient_id
"#;

const VISIBLE_TO: &str = "(p.payer_id = ? OR EXISTS (
    SELECT 1 FROM payment_splits vs WHERE vs.payment_id = p.id AND vs.recipient_id = ?))";

async fn load_splits(pool: &SqlitePool, payment_public_id: &str) -> Result<Vec<PaymentSplit>, ServiceError> {
    let splits = sqlx::query_as::<_, PaymentSplit>(&format!(
        "{SPLIT_SELECT} WHERE p.public_id = ? ORDER BY s.id ASC"
    ))
    .bind(payment_public_id)
    .fetch_all(pool)
    .await?;

    Ok(splits)
}

async fn with_splits(pool: &SqlitePool, mut payment: Payment) -> Result<Payment, ServiceError> {
    payment.splits = load_splits(pool, &payment.id).await?;
    Ok(payment)
}

/// Create the payment for a booking and split it between director, venue and
/// platform.
pub async fn create_payment(
    pool: &SqlitePool,
    payer_id: i64,
    booking_public_id: &str,
    commission_bps: u32,
    currency: &str,
) -> Result<Payment, ServiceError> {
    let booking = find_booking_row(pool, booking_public_id.trim())
        .await?
        .filter(|row| row.family_id == payer_id)
        .ok_or_else(|| ServiceError::not_found("booking not found"))?;

    if booking.status == "cancelled" {
        return Err(ServiceError::bad_request("cannot pay for a cancelled booking"));
    }

    let mut tx = pool.begin().await?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT public_id FROM payments WHERE booking_id = ? AND status != 'refunded' LIMIT 1",
    )
    .bind(booking.id)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(existing) = existing {
        return Err(ServiceError::conflict(format!(
            "booking already has payment {existing}"
        )));
    }

    let split = split_amounts(
        booking.director_amount_cents,
        booking.venue_amount_cents,
        commission_bps,
    );

    let public_id = new_public_id();
    let now = now_rfc3339();
    let payment_id = sqlx::query(
        r#"
        INSERT INTO payments (public_id, booking_id, payer_id, amount_cents, currency, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(booking.id)
    .bind(payer_id)
    .bind(split.total())
    .bind(currency)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let mut parts = vec![
        (Some(booking.director_id), "director", split.director),
        (Some(booking.venue_id), "venue", split.venue),
    ];
    if split.platform > 0 {
        parts.push((None, "platform", split.platform));
    }

    for (recipient_id, role, amount) in parts {
        sqlx::query(
            r#"
            INSERT INTO payment_splits (public_id, payment_id, recipient_id, recipient_role, amount_cents, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(new_public_id())
        .bind(payment_id)
        .bind(recipient_id)
        .bind(role)
        .bind(amount)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        payment = %public_id,
        booking = %booking.public_id,
        amount_cents = split.total(),
        platform_cents = split.platform,
        "payment created"
    );

    get_payment_by_public_id(pool, &public_id).await
}

async fn get_payment_by_public_id(pool: &SqlitePool, public_id: &str) -> Result<Payment, ServiceError> {
    let payment = sqlx::query_as::<_, Payment>(&format!("{PAYMENT_SELECT} WHERE p.public_id = ?"))
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("payment not found"))?;

    with_splits(pool, payment).await
}

pub async fn get_payment(pool: &SqlitePool, user_id: i64, public_id: &str) -> Result<Payment, ServiceError> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "{PAYMENT_SELECT} WHERE p.public_id = ? AND {VISIBLE_TO}"
    ))
    .bind(public_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("payment not found"))?;

    with_splits(pool, payment).await
}

pub async fn list_payments(
    pool: &SqlitePool,
    user_id: i64,
    page: PageRequest,
) -> Result<Page<Payment>, ServiceError> {
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM payments p WHERE {VISIBLE_TO}"))
        .bind(user_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, Payment>(&format!(
        "{PAYMENT_SELECT} WHERE {VISIBLE_TO} ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for payment in rows {
        items.push(with_splits(pool, payment).await?);
    }

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}

pub async fn list_splits(
    pool: &SqlitePool,
    recipient_id: i64,
    query: &SplitListQuery,
) -> Result<Page<PaymentSplit>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let status = clean_optional(query.status.clone()).map(|value| value.to_lowercase());
    if let Some(value) = &status {
        if !SPLIT_STATUSES.contains(&value.as_str()) {
            return Err(ServiceError::bad_request(format!(
                "status must be one of {}",
                SPLIT_STATUSES.join(", ")
            )));
        }
    }

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_splits s WHERE s.recipient_id = ? AND (? IS NULL OR s.status = ?)",
    )
    .bind(recipient_id)
    .bind(&status)
    .bind(&status)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, PaymentSplit>(&format!(
        "{SPLIT_SELECT}
         WHERE s.recipient_id = ? AND (? IS NULL OR s.status = ?)
         ORDER BY s.created_at DESC, s.id DESC
         LIMIT ? OFFSET ?"
    ))
    .bind(recipient_id)
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

/// Settle the platform share and the payment once every provider split is paid.
async fn settle_if_complete(conn: &mut SqliteConnection, payment_id: i64, now: &str) -> Result<bool, ServiceError> {
    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_splits
         WHERE payment_id = ? AND recipient_role != 'platform' AND status != 'paid'",
    )
    .bind(payment_id)
    .fetch_one(&mut *conn)
    .await?;

    if open > 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE payment_splits SET status = 'paid', paid_at = ?, updated_at = ?
         WHERE payment_id = ? AND recipient_role = 'platform' AND status = 'pending'",
    )
    .bind(now)
    .bind(now)
    .bind(payment_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE payments SET status = 'paid', updated_at = ? WHERE id = ? AND status = 'pending'")
        .bind(now)
        .bind(payment_id)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

/// Move the caller's own pending splits to `paid` or `payout_requested`.
/// All ids are checked before anything changes.
pub async fn update_splits(
    pool: &SqlitePool,
    recipient_id: i64,
    req: UpdateSplitsRequest,
) -> Result<Vec<PaymentSplit>, ServiceError> {
    let status = req.status.trim().to_lowercase();
    let timestamp_column = match status.as_str() {
        "paid" => "paid_at",
        "payout_requested" => "payout_requested_at",
        _ => {
            return Err(ServiceError::bad_request(
                "status must be paid or payout_requested",
            ))
        }
    };

    let ids: BTreeSet<String> = req
        .split_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(ServiceError::bad_request("split_ids cannot be empty"));
    }

    let now = now_rfc3339();
    let mut tx = pool.begin().await?;
    let mut payment_ids = BTreeSet::new();

    for id in &ids {
        let row: Option<(i64, i64, Option<i64>, String)> = sqlx::query_as(
            "SELECT id, payment_id, recipient_id, status FROM payment_splits WHERE public_id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (split_id, payment_id, _, current) = row
            .filter(|(_, _, owner, _)| *owner == Some(recipient_id))
            .ok_or_else(|| ServiceError::not_found(format!("split {id} not found")))?;

        if current != "pending" {
            return Err(ServiceError::conflict(format!("split {id} is already {current}")));
        }

        sqlx::query(&format!(
            "UPDATE payment_splits SET status = ?, {timestamp_column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(&status)
        .bind(&now)
        .bind(&now)
        .bind(split_id)
        .execute(&mut *tx)
        .await?;

        payment_ids.insert(payment_id);
    }

    // (payer, payment public id, fully settled) for each touched payment.
    let mut payer_updates: Vec<(i64, String, bool)> = Vec::new();
    if status == "paid" {
        for payment_id in &payment_ids {
            let settled = settle_if_complete(&mut tx, *payment_id, &now).await?;
            let (payer_id, payment_public_id): (i64, String) =
                sqlx::query_as("SELECT payer_id, public_id FROM payments WHERE id = ?")
                    .bind(payment_id)
                    .fetch_one(&mut *tx)
                    .await?;
            payer_updates.push((payer_id, payment_public_id, settled));
        }
    }

    tx.commit().await?;

    info!(recipient_id, count = ids.len(), status = %status, "payment splits updated");

    let (title, kind) = if status == "paid" {
        ("Payment received", KIND_PAYMENT)
    } else {
        ("Payout requested", KIND_PAYOUT)
    };
    let body = format!("{} split(s) marked {status}", ids.len());
    notify_quietly(pool, recipient_id, kind, title, &body, None).await;

    for (payer_id, payment_public_id, settled) in &payer_updates {
        let body = if *settled {
            format!("Payment {payment_public_id} has been fully settled")
        } else {
            format!("Part of payment {payment_public_id} has been settled")
        };
        notify_quietly(pool, *payer_id, KIND_PAYMENT, "Payment update", &body, Some(payment_public_id)).await;
    }

    let mut splits = Vec::with_capacity(ids.len());
    for id in &ids {
        let split = sqlx::query_as::<_, PaymentSplit>(&format!("{SPLIT_SELECT} WHERE s.public_id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await?;
        splits.push(split);
    }

    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_parties, create_test_db, insert_booking, Parties};

    async fn setup() -> (SqlitePool, tempfile::TempDir, Parties, String) {
        let (pool, dir) = create_test_db().await;
        let parties = create_parties(&pool).await;
        let (_, booking) = insert_booking(
            &pool,
            &parties,
            "2030-03-01T10:00:00Z",
            "2030-03-01T12:00:00Z",
            "confirmed",
            12_000,
            18_001,
        )
        .await;
        (pool, dir, parties, booking)
    }

    fn split_for<'a>(payment: &'a Payment, role: &str) -> &'a PaymentSplit {
        payment
            .splits
            .iter()
            .find(|split| split.recipient_role == role)
            .unwrap()
    }

    #[tokio::test]
    async fn splits_sum_to_payment_amount() {
        let (pool, _dir, parties, booking) = setup().await;

        let payment = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();

        assert_eq!(payment.amount_cents, 30_001);
        assert_eq!(payment.splits.len(), 3);
        let sum: i64 = payment.splits.iter().map(|split| split.amount_cents).sum();
        assert_eq!(sum, payment.amount_cents);

        assert_eq!(split_for(&payment, "director").amount_cents, 11_400);
        assert_eq!(split_for(&payment, "venue").amount_cents, 17_101);
        assert_eq!(split_for(&payment, "platform").amount_cents, 1_500);
        assert!(split_for(&payment, "platform").recipient_id.is_none());
    }

    #[tokio::test]
    async fn zero_commission_omits_platform_split() {
        let (pool, _dir, parties, booking) = setup().await;

        let payment = create_payment(&pool, parties.family.id, &booking, 0, "EUR")
            .await
            .unwrap();
        assert_eq!(payment.splits.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_payment_and_foreign_booking_are_rejected() {
        let (pool, _dir, parties, booking) = setup().await;

        let err = create_payment(&pool, parties.director.id, &booking, 500, "EUR")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();
        let err = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn marking_a_split_paid_twice_is_rejected() {
        let (pool, _dir, parties, booking) = setup().await;
        let payment = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();
        let director_split = split_for(&payment, "director").id.clone();

        let updated = update_splits(
            &pool,
            parties.director.id,
            UpdateSplitsRequest {
                split_ids: vec![director_split.clone()],
                status: "paid".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated[0].status, "paid");
        assert!(updated[0].paid_at.is_some());

        let err = update_splits(
            &pool,
            parties.director.id,
            UpdateSplitsRequest {
                split_ids: vec![director_split],
                status: "paid".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn foreign_splits_are_not_found_and_payment_settles_when_all_paid() {
        let (pool, _dir, parties, booking) = setup().await;
        let payment = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();
        let director_split = split_for(&payment, "director").id.clone();
        let venue_split = split_for(&payment, "venue").id.clone();

        let err = update_splits(
            &pool,
            parties.director.id,
            UpdateSplitsRequest {
                split_ids: vec![director_split.clone(), venue_split.clone()],
                status: "paid".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        // The rejected batch left everything pending.
        let untouched = get_payment(&pool, parties.family.id, &payment.id).await.unwrap();
        assert!(untouched.splits.iter().all(|split| split.status == "pending"));

        for (owner, split) in [(parties.director.id, director_split), (parties.venue.id, venue_split)] {
            update_splits(
                &pool,
                owner,
                UpdateSplitsRequest {
                    split_ids: vec![split],
                    status: "paid".into(),
                },
            )
            .await
            .unwrap();
        }

        let settled = get_payment(&pool, parties.venue.id, &payment.id).await.unwrap();
        assert_eq!(settled.status, "paid");
        assert!(settled.splits.iter().all(|split| split.status == "paid"));

        let payer_notes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND type = 'payment'",
        )
        .bind(parties.family.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(payer_notes, 2);
    }

    #[tokio::test]
    async fn split_update_survives_failing_notifications() {
        let (pool, _dir, parties, booking) = setup().await;
        let payment = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();
        let director_split = split_for(&payment, "director").id.clone();

        sqlx::query("DROP TABLE notifications").execute(&pool).await.unwrap();

        let updated = update_splits(
            &pool,
            parties.director.id,
            UpdateSplitsRequest {
                split_ids: vec![director_split],
                status: "paid".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated[0].status, "paid");
    }

    #[tokio::test]
    async fn payout_requests_and_listing() {
        let (pool, _dir, parties, booking) = setup().await;
        let payment = create_payment(&pool, parties.family.id, &booking, 500, "EUR")
            .await
            .unwrap();

        let err = update_splits(
            &pool,
            parties.venue.id,
            UpdateSplitsRequest {
                split_ids: vec![],
                status: "payout_requested".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        update_splits(
            &pool,
            parties.venue.id,
            UpdateSplitsRequest {
                split_ids: vec![split_for(&payment, "venue").id.clone()],
                status: "payout_requested".into(),
            },
        )
        .await
        .unwrap();

        let requested = list_splits(
            &pool,
            parties.venue.id,
            &SplitListQuery {
                status: Some("payout_requested".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(requested.items.len(), 1);
        assert!(requested.items[0].payout_requested_at.is_some());

        let visible = list_payments(&pool, parties.director.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(visible.pagination.total, 1);

        let stranger = crate::services::test_utils::create_test_user(&pool, "x@example.com", "family").await;
        let err = get_payment(&pool, stranger.id, &payment.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
