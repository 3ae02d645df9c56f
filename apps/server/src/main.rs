use afscheid_api::{
    build_router,
    routes::models::{CreateBookingRequest, UpdateDirectorProfileRequest, UpdateVenueProfileRequest},
    services::{bookings, profiles, ServiceError},
    AppState,
};
use afscheid_auth::{AuthError, Authenticator, Registration, User, UserRole};
use afscheid_backend_runtime::{shutdown_signal, telemetry, BackendServices};
use afscheid_config::load as load_config;
use anyhow::Context;
use chrono::{Duration, DurationRound, Utc};
use clap::{Parser, Subcommand};
use sqlx::Row;
use tokio::net::TcpListener;
use tracing::info;

const SEED_PASSWORD: &str = "afscheid-demo";

/// Tables in dependency order, children first.
const DATA_TABLES: &[&str] = &[
    "message_reads",
    "chat_messages",
    "chat_participants",
    "chat_rooms",
    "compliance_tracking",
    "payment_splits",
    "payments",
    "availability_slots",
    "director_clients",
    "notifications",
    "bookings",
];

#[derive(Parser)]
#[command(name = "afscheid-backend")]
#[command(about = "Afscheid funeral marketplace backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Print row counts and the booking list
    DumpData,
    /// Remove bookings and everything hanging off them; accounts and documents are kept
    ClearData,
    /// Create a demo family, director and venue plus one booking
    SeedData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server().await,
        Commands::DumpData => dump_data().await,
        Commands::ClearData => clear_data().await,
        Commands::SeedData => seed_data().await,
    }
}

async fn services() -> anyhow::Result<(afscheid_config::AppConfig, BackendServices)> {
    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;
    Ok((config, services))
}

async fn run_server() -> anyhow::Result<()> {
    info!("starting Afscheid backend");

    let (config, services) = services().await?;

    let state = AppState::from_config(
        services.db_pool.clone(),
        services.authenticator.clone(),
        services.assistant.clone(),
        &config,
    );
    let app = build_router(state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    services.db_pool.close().await;
    info!("backend shut down");
    Ok(())
}

async fn dump_data() -> anyhow::Result<()> {
    let (_, services) = services().await?;
    let pool = &services.db_pool;

    println!("=== TABLES ===");
    for table in ["users", "documents"].iter().chain(DATA_TABLES.iter().rev()) {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count {table}"))?;
        println!("{table:<22} {count}");
    }

    let rows = sqlx::query(
        r#"
        SELECT b.public_id, f.full_name AS family, d.full_name AS director, v.full_name AS venue,
               b.service_type, b.starts_at, b.status, b.total_price_cents
        FROM bookings b
        JOIN users f ON f.id = b.family_id
        JOIN users d ON d.id = b.director_id
        JOIN users v ON v.id = b.venue_id
        ORDER BY b.starts_at ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch bookings")?;

    println!("\n=== BOOKINGS ===");
    if rows.is_empty() {
        println!("No bookings found in database");
        return Ok(());
    }

    println!(
        "{:<26} {:<20} {:<20} {:<20} {:<10} {:<22} {:<10} {:>10}",
        "ID", "Family", "Director", "Venue", "Type", "Starts At", "Status", "Total"
    );
    println!("{}", "-".repeat(146));

    for row in rows {
        let total: i64 = row.get("total_price_cents");
        println!(
            "{:<26} {:<20} {:<20} {:<20} {:<10} {:<22} {:<10} {:>7}.{:02}",
            row.get::<String, _>("public_id"),
            row.get::<String, _>("family"),
            row.get::<String, _>("director"),
            row.get::<String, _>("venue"),
            row.get::<String, _>("service_type"),
            row.get::<String, _>("starts_at"),
            row.get::<String, _>("status"),
            total / 100,
            total % 100
        );
    }

    Ok(())
}

async fn clear_data() -> anyhow::Result<()> {
    let (_, services) = services().await?;

    let mut tx = services.db_pool.begin().await?;
    println!("Database cleared:");
    for table in DATA_TABLES {
        let deleted = sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to clear {table}"))?;
        println!("- {} rows deleted from {table}", deleted.rows_affected());
    }
    tx.commit().await?;

    Ok(())
}

async fn seed_data() -> anyhow::Result<()> {
    let (_, services) = services().await?;
    let pool = &services.db_pool;
    let authenticator = &services.authenticator;

    let family =
        seed_user(authenticator, "familie@afscheid.test", "Familie Jansen", UserRole::Family).await?;
    let director =
        seed_user(authenticator, "uitvaart@afscheid.test", "Uitvaartzorg De Vries", UserRole::Director).await?;
    let venue =
        seed_user(authenticator, "aula@afscheid.test", "Aula Zonnehof", UserRole::Venue).await?;

    profiles::update_director_profile(
        pool,
        director.id,
        UpdateDirectorProfileRequest {
            company_name: Some("Uitvaartzorg De Vries".into()),
            kvk_number: Some("12345678".into()),
            hourly_rate_cents: Some(6_000),
            service_area: Some("Utrecht".into()),
            is_active: Some(true),
            ..Default::default()
        },
    )
    .await
    .context("failed to activate demo director")?;

    profiles::update_venue_profile(
        pool,
        venue.id,
        UpdateVenueProfileRequest {
            name: Some("Aula Zonnehof".into()),
            venue_type: Some("hall".into()),
            city: Some("Utrecht".into()),
            capacity: Some(150),
            hourly_rate_cents: Some(9_000),
            is_active: Some(true),
            ..Default::default()
        },
    )
    .await
    .context("failed to activate demo venue")?;

    let now = Utc::now();
    let starts = now.duration_trunc(Duration::hours(1)).unwrap_or(now) + Duration::days(5);
    let created = bookings::create_booking(
        pool,
        family.id,
        CreateBookingRequest {
            director_id: director.public_id.clone(),
            venue_id: venue.public_id.clone(),
            service_type: "burial".into(),
            starts_at: starts.to_rfc3339(),
            ends_at: (starts + Duration::hours(2)).to_rfc3339(),
            attendee_count: Some(80),
            notes: Some("Demo booking".into()),
        },
    )
    .await;

    println!("Database seeded with demo data:");
    println!("- 3 accounts (password: {SEED_PASSWORD})");
    match created {
        Ok(booking) => println!("- booking {} on {}", booking.id, booking.starts_at),
        Err(ServiceError::Conflict(reason)) => println!("- booking skipped: {reason}"),
        Err(error) => return Err(error).context("failed to create demo booking"),
    }
    println!("Run 'dump-data' to see the inserted data");

    Ok(())
}

/// Register `email`, or load it when it already exists.
async fn seed_user(
    authenticator: &Authenticator,
    email: &str,
    full_name: &str,
    role: UserRole,
) -> anyhow::Result<User> {
    let registration = Registration {
        email,
        password: SEED_PASSWORD,
        full_name,
        role,
        phone: None,
    };

    match authenticator.register_with_password(&registration).await {
        Ok(user) => Ok(user),
        Err(AuthError::UserExists) => {
            let session = authenticator
                .login_with_password(email, SEED_PASSWORD)
                .await
                .with_context(|| format!("{email} exists with a different password"))?;
            let user = authenticator.user_profile(session.user_id).await?;
            Ok(user)
        }
        Err(error) => Err(error).with_context(|| format!("failed to register {email}")),
    }
}
