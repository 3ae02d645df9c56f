use afscheid_auth::UserRole;
use sqlx::{FromRow, SqlitePool};

use super::error::ServiceError;

/// Minimal view of a user used for authorization and joins.
#[derive(Debug, Clone, FromRow)]
pub struct UserRef {
    pub id: i64,
    pub public_id: String,
    pub full_name: String,
    pub role: String,
}

impl UserRef {
    pub fn role(&self) -> Option<UserRole> {
        self.role.parse().ok()
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.role() == Some(role)
    }
}

pub async fn find_by_public_id(
    pool: &SqlitePool,
    public_id: &str,
) -> Result<Option<UserRef>, ServiceError> {
    let user = sqlx::query_as::<_, UserRef>(
        "SELECT id, public_id, full_name, role FROM users WHERE public_id = ?",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn require_by_public_id(
    pool: &SqlitePool,
    public_id: &str,
    what: &str,
) -> Result<UserRef, ServiceError> {
    find_by_public_id(pool, public_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("{what} not found")))
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<UserRef>, ServiceError> {
    let user = sqlx::query_as::<_, UserRef>(
        "SELECT id, public_id, full_name, role FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}
