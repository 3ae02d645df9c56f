use afscheid_auth::{new_public_id, Authenticator, User};
use afscheid_config::{AuthConfig, DatabaseConfig};
use sqlx::SqlitePool;
use tempfile::TempDir;

use super::users::UserRef;

pub async fn create_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let config = DatabaseConfig {
        url: format!("sqlite://{}", db_path.display()),
        max_connections: 2,
    };
    let pool = afscheid_database::initialize_database(&config)
        .await
        .unwrap();

    (pool, temp_dir)
}

pub async fn create_test_user(pool: &SqlitePool, email: &str, role: &str) -> UserRef {
    let public_id = new_public_id();
    let full_name = email.split('@').next().unwrap_or(email).to_string();

    let id = sqlx::query(
        "INSERT INTO users (public_id, email, full_name, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
    )
    .bind(&public_id)
    .bind(email)
    .bind(&full_name)
    .bind(role)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    UserRef {
        id,
        public_id,
        full_name,
        role: role.to_string(),
    }
}

pub async fn load_user(pool: &SqlitePool, id: i64) -> User {
    Authenticator::new(pool.clone(), AuthConfig::default())
        .user_profile(id)
        .await
        .unwrap()
}

pub async fn create_director(pool: &SqlitePool, email: &str, rate_cents: i64, active: bool) -> UserRef {
    let user = create_test_user(pool, email, "director").await;
    sqlx::query(
        "INSERT INTO director_profiles (user_id, company_name, hourly_rate_cents, is_active, updated_at)
         VALUES (?, ?, ?, ?, '2025-01-01T00:00:00Z')",
    )
    .bind(user.id)
    .bind(format!("{} Uitvaartzorg", user.full_name))
    .bind(rate_cents)
    .bind(active)
    .execute(pool)
    .await
    .unwrap();
    user
}

pub async fn create_venue(
    pool: &SqlitePool,
    email: &str,
    rate_cents: i64,
    capacity: i64,
    active: bool,
) -> UserRef {
    let user = create_test_user(pool, email, "venue").await;
    sqlx::query(
        "INSERT INTO venue_profiles (user_id, name, venue_type, capacity, hourly_rate_cents, is_active, updated_at)
         VALUES (?, ?, 'hall', ?, ?, ?, '2025-01-01T00:00:00Z')",
    )
    .bind(user.id)
    .bind(format!("Aula {}", user.full_name))
    .bind(capacity)
    .bind(rate_cents)
    .bind(active)
    .execute(pool)
    .await
    .unwrap();
    user
}

/// Family, active director and active venue.
pub struct Parties {
    pub family: UserRef,
    pub director: UserRef,
    pub venue: UserRef,
}

pub async fn create_parties(pool: &SqlitePool) -> Parties {
    Parties {
        family: create_test_user(pool, "familie@example.com", "family").await,
        director: create_director(pool, "uitvaart@example.com", 6_000, true).await,
        venue: create_venue(pool, "aula@example.com", 9_000, 150, true).await,
    }
}

/// Insert a booking row directly, bypassing validation. Returns (row id, public id).
pub async fn insert_booking(
    pool: &SqlitePool,
    parties: &Parties,
    starts_at: &str,
    ends_at: &str,
    status: &str,
    director_amount_cents: i64,
    venue_amount_cents: i64,
) -> (i64, String) {
    let public_id = new_public_id();
    let id = sqlx::query(
        r#"
        INSERT INTO bookings (
            public_id, family_id, director_id, venue_id, service_type, starts_at, ends_at,
            attendee_count, status, director_amount_cents, venue_amount_cents, total_price_cents,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, 'burial', ?, ?, 40, ?, ?, ?, ?, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')
        "#,
    )
    .bind(&public_id)
    .bind(parties.family.id)
    .bind(parties.director.id)
    .bind(parties.venue.id)
    .bind(starts_at)
    .bind(ends_at)
    .bind(status)
    .bind(director_amount_cents)
    .bind(venue_amount_cents)
    .bind(director_amount_cents + venue_amount_cents)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    (id, public_id)
}
