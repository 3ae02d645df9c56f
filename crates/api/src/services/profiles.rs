use afscheid_auth::{normalize_email, validate_email, User};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::info;

use super::error::{is_unique_violation, ServiceError};
use super::pricing::MAX_HOURLY_RATE_CENTS;
use crate::routes::models::{
    DirectorProfile, DirectorSearchQuery, UpdateDirectorProfileRequest,
    UpdateFamilyProfileRequest, UpdateVenueProfileRequest, VenueProfile, VenueSearchQuery,
};
use crate::util::{clean_optional, now_rfc3339, Page, PageRequest};

pub const VENUE_TYPES: &[&str] = &["cemetery", "crematorium", "hall", "church", "other"];

static POSTAL_CODE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d{4}\s?[A-Za-z]{2}$").ok());
static KVK_NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\d{8}$").ok());

const DIRECTOR_SELECT: &str = r#"
    SELECT u.public_id AS user_id, u.full_name, u.email, u.phone, u.city,
           d.company_name, d.kvk_number, d.description, d.hourly_rate_cents,
           d.service_area, d.is_active, d.updated_at
    FROM director_profiles d
    JOIN users u ON u.id = d.user_id
"#;

const VENUE_SELECT: &str = r#"
    SELECT u.public_id AS user_id, u.full_name, u.email, u.phone,
           v.name, v.venue_type, v.address, v.city, v.capacity,
           v.hourly_rate_cents, v.is_active, v.updated_at
    FROM venue_profiles v
    JOIN users u ON u.id = v.user_id
"#;

fn matches(pattern: &Lazy<Option<Regex>>, value: &str) -> bool {
    pattern
        .as_ref()
        .map(|regex| regex.is_match(value))
        .unwrap_or(false)
}

/// Update the caller's own account. Changing the email also moves the
/// password identity so login keeps working.
pub async fn update_family_profile(
    pool: &SqlitePool,
    user: &User,
    req: UpdateFamilyProfileRequest,
) -> Result<(), ServiceError> {
    let full_name = match req.full_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ServiceError::bad_request("full_name cannot be empty"))
        }
        Some(name) => name.trim().to_string(),
        None => user.full_name.clone(),
    };

    let email = match req.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            validate_email(&email)
                .map_err(|_| ServiceError::bad_request("invalid email address"))?;
            email
        }
        None => user.email.clone(),
    };

    let postal_code = clean_optional(req.postal_code).or_else(|| user.postal_code.clone());
    if let Some(code) = &postal_code {
        if !matches(&POSTAL_CODE, code) {
            return Err(ServiceError::bad_request(
                "postal_code must look like 1234 AB",
            ));
        }
    }

    let phone = clean_optional(req.phone).or_else(|| user.phone.clone());
    let address = clean_optional(req.address).or_else(|| user.address.clone());
    let city = clean_optional(req.city).or_else(|| user.city.clone());

    let mut tx = pool.begin().await?;

    if email != user.email {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND id != ?")
            .bind(&email)
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::conflict("email address is already in use"));
        }
    }

    let now = now_rfc3339();
    let updated = sqlx::query(
        r#"
        UPDATE users
        SET full_name = ?, email = ?, phone = ?, address = ?, city = ?, postal_code = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&full_name)
    .bind(&email)
    .bind(&phone)
    .bind(&address)
    .bind(&city)
    .bind(&postal_code)
    .bind(&now)
    .bind(user.id)
    .execute(&mut *tx)
    .await;

    match updated {
        Err(err) if is_unique_violation(&err) => {
            return Err(ServiceError::conflict("email address is already in use"))
        }
        other => {
            other?;
        }
    }

    if email != user.email {
        sqlx::query(
            "UPDATE user_identities SET provider_uid = ?, updated_at = ? WHERE user_id = ? AND provider = 'password'",
        )
        .bind(&email)
        .bind(&now)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(user = %user.public_id, "family profile updated");
    Ok(())
}

pub async fn get_director_profile(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<DirectorProfile>, ServiceError> {
    let profile = sqlx::query_as::<_, DirectorProfile>(&format!("{DIRECTOR_SELECT} WHERE d.user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(profile)
}

fn validate_hourly_rate(rate: i64) -> Result<(), ServiceError> {
    if rate <= 0 {
        return Err(ServiceError::bad_request("hourly_rate_cents must be greater than 0"));
    }
    if rate > MAX_HOURLY_RATE_CENTS {
        return Err(ServiceError::bad_request(format!(
            "hourly_rate_cents may be at most {MAX_HOURLY_RATE_CENTS}"
        )));
    }
    Ok(())
}

pub async fn update_director_profile(
    pool: &SqlitePool,
    user_id: i64,
    req: UpdateDirectorProfileRequest,
) -> Result<DirectorProfile, ServiceError> {
    let current = get_director_profile(pool, user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("director profile not found"))?;

    if let Some(rate) = req.hourly_rate_cents {
        validate_hourly_rate(rate)?;
    }

    let company_name = match req.company_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ServiceError::bad_request("company_name cannot be empty"))
        }
        Some(name) => name.trim().to_string(),
        None => current.company_name,
    };

    let kvk_number = clean_optional(req.kvk_number).or(current.kvk_number);
    if let Some(kvk) = &kvk_number {
        if !matches(&KVK_NUMBER, kvk) {
            return Err(ServiceError::bad_request("kvk_number must be 8 digits"));
        }
    }

    let hourly_rate_cents = req.hourly_rate_cents.unwrap_or(current.hourly_rate_cents);
    let is_active = req.is_active.unwrap_or(current.is_active);
    if is_active && hourly_rate_cents <= 0 {
        return Err(ServiceError::bad_request(
            "set an hourly rate before activating the profile",
        ));
    }

    sqlx::query(
        r#"
        UPDATE director_profiles
        SET company_name = ?, kvk_number = ?, description = ?, hourly_rate_cents = ?,
            service_area = ?, is_active = ?, updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(&company_name)
    .bind(&kvk_number)
    .bind(clean_optional(req.description).or(current.description))
    .bind(hourly_rate_cents)
    .bind(clean_optional(req.service_area).or(current.service_area))
    .bind(is_active)
    .bind(now_rfc3339())
    .bind(user_id)
    .execute(pool)
    .await?;

    get_director_profile(pool, user_id)
        .await?
        .ok_or_else(|| ServiceError::internal("director profile vanished during update"))
}

pub async fn get_venue_profile(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Option<VenueProfile>, ServiceError> {
    let profile = sqlx::query_as::<_, VenueProfile>(&format!("{VENUE_SELECT} WHERE v.user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(profile)
}

pub async fn update_venue_profile(
    pool: &SqlitePool,
    user_id: i64,
    req: UpdateVenueProfileRequest,
) -> Result<VenueProfile, ServiceError> {
    let current = get_venue_profile(pool, user_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("venue profile not found"))?;

    if let Some(rate) = req.hourly_rate_cents {
        validate_hourly_rate(rate)?;
    }
    if let Some(capacity) = req.capacity {
        if capacity <= 0 {
            return Err(ServiceError::bad_request("capacity must be greater than 0"));
        }
    }

    let venue_type = match req.venue_type {
        Some(value) => {
            let value = value.trim().to_lowercase();
            if !VENUE_TYPES.contains(&value.as_str()) {
                return Err(ServiceError::bad_request(format!(
                    "venue_type must be one of {}",
                    VENUE_TYPES.join(", ")
                )));
            }
            value
        }
        None => current.venue_type,
    };

    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ServiceError::bad_request("name cannot be empty"))
        }
        Some(name) => name.trim().to_string(),
        None => current.name,
    };

    let capacity = req.capacity.unwrap_or(current.capacity);
    let hourly_rate_cents = req.hourly_rate_cents.unwrap_or(current.hourly_rate_cents);
    let is_active = req.is_active.unwrap_or(current.is_active);
    if is_active && (hourly_rate_cents <= 0 || capacity <= 0) {
        return Err(ServiceError::bad_request(
            "set an hourly rate and capacity before activating the venue",
        ));
    }

    sqlx::query(
        r#"
        UPDATE venue_profiles
        SET name = ?, venue_type = ?, address = ?, city = ?, capacity = ?,
            hourly_rate_cents = ?, is_active = ?, updated_at = ?
        WHERE user_id = ?
        "#,
    )
    .bind(&name)
    .bind(&venue_type)
    .bind(clean_optional(req.address).or(current.address))
    .bind(clean_optional(req.city).or(current.city))
    .bind(capacity)
    .bind(hourly_rate_cents)
    .bind(is_active)
    .bind(now_rfc3339())
    .bind(user_id)
    .execute(pool)
    .await?;

    get_venue_profile(pool, user_id)
        .await?
        .ok_or_else(|| ServiceError::internal("venue profile vanished during update"))
}

pub async fn search_directors(
    pool: &SqlitePool,
    query: &DirectorSearchQuery,
) -> Result<Page<DirectorProfile>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let area = clean_optional(query.service_area.clone()).map(|area| format!("%{}%", area.to_lowercase()));

    let filter = "d.is_active = TRUE AND (? IS NULL OR LOWER(COALESCE(d.service_area, '')) LIKE ?)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM director_profiles d WHERE {filter}"
    ))
    .bind(&area)
    .bind(&area)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, DirectorProfile>(&format!(
        "{DIRECTOR_SELECT} WHERE {filter} ORDER BY d.company_name ASC LIMIT ? OFFSET ?"
    ))
    .bind(&area)
    .bind(&area)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}

pub async fn search_venues(
    pool: &SqlitePool,
    query: &VenueSearchQuery,
) -> Result<Page<VenueProfile>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let city = clean_optional(query.city.clone()).map(|city| city.to_lowercase());
    let venue_type = clean_optional(query.venue_type.clone()).map(|value| value.to_lowercase());

    if let Some(value) = &venue_type {
        if !VENUE_TYPES.contains(&value.as_str()) {
            return Err(ServiceError::bad_request(format!(
                "venue_type must be one of {}",
                VENUE_TYPES.join(", ")
            )));
        }
    }

    let filter = "v.is_active = TRUE \
                  AND (? IS NULL OR LOWER(COALESCE(v.city, '')) = ?) \
                  AND (? IS NULL OR v.venue_type = ?)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM venue_profiles v WHERE {filter}"
    ))
    .bind(&city)
    .bind(&city)
    .bind(&venue_type)
    .bind(&venue_type)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, VenueProfile>(&format!(
        "{VENUE_SELECT} WHERE {filter} ORDER BY v.name ASC LIMIT ? OFFSET ?"
    ))
    .bind(&city)
    .bind(&city)
    .bind(&venue_type)
    .bind(&venue_type)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}
