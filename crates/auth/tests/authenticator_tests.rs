use std::collections::HashSet;
use std::str::FromStr;

use afscheid_auth::{AuthError, Authenticator, Registration, UserRole};
use afscheid_config::AuthConfig;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

fn default_auth_config() -> AuthConfig {
    AuthConfig {
        session_ttl_seconds: 3_600,
    }
}

struct TestContext {
    pool: SqlitePool,
    authenticator: Authenticator,
    _temp_dir: TempDir,
    config: AuthConfig,
}

impl TestContext {
    async fn new(config: AuthConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("auth.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        let authenticator = Authenticator::new(pool.clone(), config.clone());

        Ok(Self {
            pool,
            authenticator,
            _temp_dir: temp_dir,
            config,
        })
    }

    async fn new_default() -> TestResult<Self> {
        Self::new(default_auth_config()).await
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }
}

fn family(email: &str) -> Registration<'_> {
    Registration {
        email,
        password: "s3cretpass",
        full_name: "Familie de Vries",
        role: UserRole::Family,
        phone: None,
    }
}

#[tokio::test]
async fn register_with_password_persists_user_and_password_identity() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let user = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    assert_eq!(user.role, UserRole::Family);
    assert_eq!(user.full_name, "Familie de Vries");

    let identity =
        sqlx::query("SELECT provider, provider_uid, secret FROM user_identities WHERE user_id = ?")
            .bind(user.id)
            .fetch_one(ctx.pool())
            .await?;

    let provider: String = identity.get("provider");
    let provider_uid: String = identity.get("provider_uid");
    let secret: String = identity.get("secret");

    assert_eq!(provider, "password");
    assert_eq!(provider_uid, "anna@example.com");
    assert!(secret.starts_with("$argon2"), "secret must be an argon2 hash");

    Ok(())
}

#[tokio::test]
async fn register_normalises_email() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let user = ctx
        .authenticator()
        .register_with_password(&family("  Anna@Example.COM "))
        .await?;
    assert_eq!(user.email, "anna@example.com");

    ctx.authenticator()
        .login_with_password("ANNA@example.com", "s3cretpass")
        .await?;

    Ok(())
}

#[tokio::test]
async fn register_with_password_maps_claimed_identity_to_user_exists() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let other = ctx
        .authenticator()
        .register_with_password(&family("oud@example.com"))
        .await?;

    // Another registration already holds the password identity for this address.
    sqlx::query(
        "INSERT INTO user_identities (user_id, provider, provider_uid, secret, created_at, updated_at)
         VALUES (?, 'password', 'anna@example.com', 'x', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
    )
    .bind(other.id)
    .execute(ctx.pool())
    .await?;

    let err = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await
        .expect_err("expected claimed identity to fail");
    assert!(matches!(err, AuthError::UserExists), "got {err:?}");

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(user_count, 1, "the rejected registration must roll back");

    Ok(())
}

#[tokio::test]
async fn register_with_password_rejects_duplicate_email() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let err = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await
        .expect_err("expected duplicate email to fail");

    assert!(matches!(err, AuthError::UserExists));

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(user_count, 1, "no additional users should be created");

    Ok(())
}

#[tokio::test]
async fn register_rejects_short_password_and_bad_email() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let err = ctx
        .authenticator()
        .register_with_password(&Registration {
            password: "short",
            ..family("anna@example.com")
        })
        .await
        .expect_err("short password should be rejected");
    assert!(matches!(err, AuthError::WeakPassword));

    let err = ctx
        .authenticator()
        .register_with_password(&family("not-an-email"))
        .await
        .expect_err("malformed email should be rejected");
    assert!(matches!(err, AuthError::InvalidEmail));

    let err = ctx
        .authenticator()
        .register_with_password(&Registration {
            full_name: "   ",
            ..family("anna@example.com")
        })
        .await
        .expect_err("blank name should be rejected");
    assert!(matches!(err, AuthError::MissingName));

    Ok(())
}

#[tokio::test]
async fn register_creates_inactive_profiles_for_providers() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let director = ctx
        .authenticator()
        .register_with_password(&Registration {
            email: "uitvaart@example.com",
            password: "s3cretpass",
            full_name: "Uitvaartzorg Bakker",
            role: UserRole::Director,
            phone: Some("0612345678"),
        })
        .await?;
    let venue = ctx
        .authenticator()
        .register_with_password(&Registration {
            email: "aula@example.com",
            password: "s3cretpass",
            full_name: "Aula Zuiderhof",
            role: UserRole::Venue,
            phone: None,
        })
        .await?;

    let row = sqlx::query("SELECT company_name, is_active FROM director_profiles WHERE user_id = ?")
        .bind(director.id)
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(row.get::<String, _>("company_name"), "Uitvaartzorg Bakker");
    assert!(!row.get::<bool, _>("is_active"));
    assert_eq!(director.phone.as_deref(), Some("0612345678"));

    let row = sqlx::query("SELECT name, is_active FROM venue_profiles WHERE user_id = ?")
        .bind(venue.id)
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(row.get::<String, _>("name"), "Aula Zuiderhof");
    assert!(!row.get::<bool, _>("is_active"));

    Ok(())
}

#[tokio::test]
async fn register_with_password_hashes_secret_using_random_salt() -> TestResult {
    let ctx = TestContext::new_default().await?;

    let first = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;
    let second = ctx
        .authenticator()
        .register_with_password(&family("bram@example.com"))
        .await?;

    let first_secret: String =
        sqlx::query_scalar("SELECT secret FROM user_identities WHERE user_id = ?")
            .bind(first.id)
            .fetch_one(ctx.pool())
            .await?;
    let second_secret: String =
        sqlx::query_scalar("SELECT secret FROM user_identities WHERE user_id = ?")
            .bind(second.id)
            .fetch_one(ctx.pool())
            .await?;

    assert_ne!(
        first_secret, second_secret,
        "argon2 salts should differ per registration"
    );

    argon2::password_hash::PasswordHash::new(&first_secret)?;
    argon2::password_hash::PasswordHash::new(&second_secret)?;

    Ok(())
}

#[tokio::test]
async fn login_with_password_returns_session_for_valid_credentials() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let session = ctx
        .authenticator()
        .login_with_password("anna@example.com", "s3cretpass")
        .await?;

    let ttl = Duration::seconds(ctx.config.session_ttl_seconds as i64);
    let remaining = session.expires_at - Utc::now();
    assert!(
        (remaining - ttl).num_seconds().abs() <= 2,
        "session ttl should respect configuration"
    );

    let stored_expires: String =
        sqlx::query_scalar("SELECT expires_at FROM sessions WHERE token = ?")
            .bind(&session.token)
            .fetch_one(ctx.pool())
            .await?;
    let parsed = DateTime::parse_from_rfc3339(&stored_expires)?.with_timezone(&Utc);
    assert_eq!(parsed, session.expires_at);

    Ok(())
}

#[tokio::test]
async fn login_with_password_rejects_incorrect_secret() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let err = ctx
        .authenticator()
        .login_with_password("anna@example.com", "bad-secret")
        .await
        .expect_err("expected invalid password");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let session_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(ctx.pool())
        .await?;
    assert_eq!(session_count, 0, "no sessions should be issued on failure");

    Ok(())
}

#[tokio::test]
async fn login_with_password_rejects_unknown_email() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let err = ctx
        .authenticator()
        .login_with_password("unknown@example.com", "s3cretpass")
        .await
        .expect_err("expected unknown email to fail");
    assert!(matches!(err, AuthError::InvalidCredentials));
    Ok(())
}

#[tokio::test]
async fn authenticate_token_returns_user_and_session_for_active_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let user = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;
    let session = ctx
        .authenticator()
        .login_with_password("anna@example.com", "s3cretpass")
        .await?;

    let (resolved_user, resolved_session) = ctx
        .authenticator()
        .authenticate_token(&session.token)
        .await?;

    assert_eq!(resolved_user.id, user.id);
    assert_eq!(resolved_user.role, UserRole::Family);
    assert_eq!(resolved_session.token, session.token);
    Ok(())
}

#[tokio::test]
async fn authenticate_token_deletes_expired_sessions() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let user = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let token = "expired-token";
    let created_at = (Utc::now() - Duration::hours(2)).to_rfc3339();
    let expires_at = (Utc::now() - Duration::hours(1)).to_rfc3339();

    sqlx::query(
        "INSERT INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(token)
    .bind(&created_at)
    .bind(&expires_at)
    .execute(ctx.pool())
    .await?;

    let err = ctx
        .authenticator()
        .authenticate_token(token)
        .await
        .expect_err("expired token should be rejected");
    assert!(matches!(err, AuthError::SessionExpired));

    let remaining: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(ctx.pool())
        .await?;
    assert!(
        remaining.is_none(),
        "expired session should be removed from the database"
    );

    Ok(())
}

#[tokio::test]
async fn authenticate_token_rejects_unknown_token() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let err = ctx
        .authenticator()
        .authenticate_token("missing-token")
        .await
        .expect_err("unknown token should not authenticate");
    assert!(matches!(err, AuthError::SessionNotFound));
    Ok(())
}

#[tokio::test]
async fn logout_removes_the_session() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;
    let session = ctx
        .authenticator()
        .login_with_password("anna@example.com", "s3cretpass")
        .await?;

    ctx.authenticator().logout(&session.token).await?;

    let err = ctx
        .authenticator()
        .authenticate_token(&session.token)
        .await
        .expect_err("logged out token should not authenticate");
    assert!(matches!(err, AuthError::SessionNotFound));

    ctx.authenticator().logout(&session.token).await?;
    Ok(())
}

#[tokio::test]
async fn user_profile_reads_optional_fields() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let user = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let fetched = ctx.authenticator().user_profile(user.id).await?;
    assert!(fetched.city.is_none());

    sqlx::query("UPDATE users SET city = ?, postal_code = ? WHERE id = ?")
        .bind("Utrecht")
        .bind("3511 AA")
        .bind(user.id)
        .execute(ctx.pool())
        .await?;

    let updated = ctx.authenticator().user_profile(user.id).await?;
    assert_eq!(updated.city.as_deref(), Some("Utrecht"));
    assert_eq!(updated.postal_code.as_deref(), Some("3511 AA"));

    let err = ctx
        .authenticator()
        .user_profile(9_999)
        .await
        .expect_err("missing user");
    assert!(matches!(err, AuthError::UserNotFound));
    Ok(())
}

#[tokio::test]
async fn session_tokens_are_unique_and_urlsafe() -> TestResult {
    let ctx = TestContext::new_default().await?;
    ctx.authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let mut tokens = HashSet::new();
    for _ in 0..5 {
        let session = ctx
            .authenticator()
            .login_with_password("anna@example.com", "s3cretpass")
            .await?;
        assert!(
            URL_SAFE_NO_PAD.decode(session.token.as_bytes()).is_ok(),
            "token should be URL safe base64"
        );
        assert!(
            tokens.insert(session.token.clone()),
            "tokens should be unique per session"
        );
    }
    Ok(())
}

#[tokio::test]
async fn serialized_user_hides_row_id() -> TestResult {
    let ctx = TestContext::new_default().await?;
    let user = ctx
        .authenticator()
        .register_with_password(&family("anna@example.com"))
        .await?;

    let json = serde_json::to_value(&user)?;
    assert_eq!(json["id"], serde_json::Value::String(user.public_id.clone()));
    assert_eq!(json["role"], "family");
    Ok(())
}
