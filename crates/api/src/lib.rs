mod docs;
mod error;
mod state;
mod util;

pub mod routes;
pub mod services;
pub mod storage;

pub use docs::ApiDoc;
pub use error::{ApiError, ErrorResponse};
pub use state::{ApiSettings, AppState};

use axum::{
    extract::DefaultBodyLimit,
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.settings().max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let router = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        // Profiles
        .route("/api/profile", get(routes::profiles::get_profile))
        .route(
            "/api/family/profile",
            put(routes::profiles::update_family_profile),
        )
        .route(
            "/api/director/profile",
            get(routes::profiles::get_director_profile)
                .put(routes::profiles::update_director_profile),
        )
        .route(
            "/api/venue/profile",
            get(routes::profiles::get_venue_profile).put(routes::profiles::update_venue_profile),
        )
        .route("/api/directors", get(routes::profiles::search_directors))
        .route("/api/venues", get(routes::profiles::search_venues))
        // Availability
        .route(
            "/api/availability",
            get(routes::availability::list_slots).post(routes::availability::create_slot),
        )
        .route(
            "/api/availability/:id",
            delete(routes::availability::delete_slot),
        )
        // Bookings
        .route(
            "/api/bookings",
            get(routes::bookings::list_bookings).post(routes::bookings::create_booking),
        )
        .route("/api/bookings/:id", get(routes::bookings::get_booking))
        .route(
            "/api/bookings/:id/status",
            put(routes::bookings::update_booking_status),
        )
        // Payments
        .route(
            "/api/payments",
            get(routes::payments::list_payments).post(routes::payments::create_payment),
        )
        .route(
            "/api/payments/splits",
            get(routes::payments::list_splits).put(routes::payments::update_splits),
        )
        .route("/api/payments/:id", get(routes::payments::get_payment))
        // Documents
        .route(
            "/api/documents",
            get(routes::documents::list_documents).post(routes::documents::upload_document),
        )
        .route(
            "/api/documents/:id",
            get(routes::documents::get_document).delete(routes::documents::delete_document),
        )
        .route(
            "/api/documents/:id/download",
            get(routes::documents::download_document),
        )
        .route(
            "/api/documents/:id/share",
            post(routes::documents::share_document),
        )
        // Chat rooms
        .route(
            "/api/chat/rooms",
            get(routes::chat::list_rooms).post(routes::chat::create_room),
        )
        .route(
            "/api/chat/rooms/:id/messages",
            get(routes::chat::list_messages).post(routes::chat::post_message),
        )
        .route(
            "/api/chat/rooms/:id/read",
            post(routes::chat::mark_room_read),
        )
        // Director clients
        .route(
            "/api/director/clients",
            get(routes::clients::list_clients).post(routes::clients::create_client),
        )
        .route(
            "/api/director/clients/:id",
            put(routes::clients::update_client),
        )
        // Compliance
        .route(
            "/api/compliance",
            get(routes::compliance::list_records).post(routes::compliance::create_record),
        )
        .route(
            "/api/compliance/:id",
            get(routes::compliance::get_for_booking),
        )
        .route(
            "/api/compliance/:id/status",
            put(routes::compliance::update_status),
        )
        .route(
            "/api/compliance/:id/emergency",
            post(routes::compliance::declare_emergency),
        )
        // Notifications
        .route(
            "/api/notifications",
            get(routes::notifications::get_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(routes::notifications::get_unread_count),
        )
        .route(
            "/api/notifications/read-all",
            put(routes::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:id",
            delete(routes::notifications::delete_notification),
        )
        .route(
            "/api/notifications/:id/read",
            put(routes::notifications::mark_notification_read),
        )
        .route("/api/assistant/chat", post(routes::assistant::chat))
        .route("/api/dashboard", get(routes::dashboard::get_dashboard));

    #[cfg(debug_assertions)]
    let router = {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
