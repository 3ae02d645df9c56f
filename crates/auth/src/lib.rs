use std::fmt;
use std::str::FromStr;

use afscheid_config::AuthConfig;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use cuid2::CuidConstructor;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);
static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

const USER_COLUMNS: &str =
    "id, public_id, email, full_name, phone, address, city, postal_code, role, created_at";

#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    UserExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,
    #[error("full name is required")]
    MissingName,
    #[error("unknown role: {0}")]
    InvalidRole(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
    #[error("user not found")]
    UserNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
}

/// The three kinds of marketplace participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Family,
    Director,
    Venue,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Family => "family",
            UserRole::Director => "director",
            UserRole::Venue => "venue",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "family" => Ok(UserRole::Family),
            "director" => Ok(UserRole::Director),
            "venue" => Ok(UserRole::Venue),
            other => Err(AuthError::InvalidRole(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    #[serde(rename = "id")]
    pub public_id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub role: UserRole,
    pub created_at: String,
}

impl User {
    fn from_row(row: &SqliteRow) -> Result<Self, AuthError> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            public_id: row.try_get("public_id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            role: role.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Input for [`Authenticator::register_with_password`].
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub role: UserRole,
    pub phone: Option<&'a str>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let ttl_seconds = i64::try_from(config.session_ttl_seconds).unwrap_or(i64::MAX);
        let session_ttl = Duration::try_seconds(ttl_seconds).unwrap_or(Duration::days(3650));

        Self { pool, session_ttl }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Create the user, its password identity and, for directors and venues,
    /// an inactive profile row, all in one transaction.
    pub async fn register_with_password(
        &self,
        registration: &Registration<'_>,
    ) -> Result<User, AuthError> {
        let email = normalize_email(registration.email);
        validate_email(&email)?;
        if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        let full_name = registration.full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::MissingName);
        }

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() {
            return Err(AuthError::UserExists);
        }

        let now = Utc::now().to_rfc3339();
        let password_hash = hash_password(registration.password)?;

        let user_id = self
            .insert_user(&mut tx, &email, full_name, registration.role, registration.phone)
            .await?;

        sqlx::query(
            "INSERT INTO user_identities (user_id, provider, provider_uid, secret, created_at, updated_at) VALUES (?, 'password', ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&email)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(email_taken)?;

        match registration.role {
            UserRole::Director => {
                sqlx::query(
                    "INSERT INTO director_profiles (user_id, company_name, updated_at) VALUES (?, ?, ?)",
                )
                .bind(user_id)
                .bind(full_name)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
            UserRole::Venue => {
                sqlx::query("INSERT INTO venue_profiles (user_id, name, updated_at) VALUES (?, ?, ?)")
                    .bind(user_id)
                    .bind(full_name)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
            }
            UserRole::Family => {}
        }

        tx.commit().await?;

        let user = self.fetch_user(user_id).await?;
        info!(user = %user.public_id, role = %user.role, "registered user");
        Ok(user)
    }

    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email);
        let identity = sqlx::query(
            "SELECT user_id, secret FROM user_identities WHERE provider = 'password' AND provider_uid = ?",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = identity else {
            return Err(AuthError::InvalidCredentials);
        };

        let secret: String = row.try_get("secret")?;
        let stored_hash = PasswordHash::new(&secret)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &stored_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let user_id: i64 = row.try_get("user_id")?;
        self.fetch_user(user_id).await?;

        self.issue_session(user_id).await
    }

    /// Remove the session. Unknown tokens are not an error.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        debug!(removed = result.rows_affected(), "session logout");
        Ok(())
    }

    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(AuthError::SessionNotFound);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|_| AuthError::InvalidSession)?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Err(AuthError::SessionExpired);
        }

        let user = self.fetch_user(user_id).await?;
        let session = AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        };

        Ok((user, session))
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.fetch_user(user_id).await
    }

    pub async fn issue_session(&self, user_id: i64) -> Result<AuthSession, AuthError> {
        let token = generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&token)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token,
            user_id,
            expires_at,
        })
    }

    async fn insert_user(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        email: &str,
        full_name: &str,
        role: UserRole,
        phone: Option<&str>,
    ) -> Result<i64, AuthError> {
        let now = Utc::now().to_rfc3339();
        let public_id = new_public_id();

        let result = sqlx::query(
            "INSERT INTO users (public_id, email, full_name, phone, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&public_id)
        .bind(email)
        .bind(full_name)
        .bind(phone.map(str::trim).filter(|value| !value.is_empty()))
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await
        .map_err(email_taken)?;

        Ok(result.last_insert_rowid())
    }

    async fn fetch_user(&self, id: i64) -> Result<User, AuthError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        User::from_row(&row)
    }
}

/// Trim and lower-case an address before it is stored or compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = EMAIL_REGEX
        .as_ref()
        .map(|regex| regex.is_match(email))
        .unwrap_or(false);

    if email.len() > 254 || !valid {
        return Err(AuthError::InvalidEmail);
    }

    Ok(())
}

/// A concurrent registration can win the race between the existence check
/// and the insert.
fn email_taken(err: sqlx::Error) -> AuthError {
    let unique = err
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false);
    if unique {
        AuthError::UserExists
    } else {
        AuthError::Database(err)
    }
}

pub fn new_public_id() -> String {
    CUID.create_id()
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
