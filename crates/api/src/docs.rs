use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::profiles::get_profile,
        crate::routes::profiles::update_family_profile,
        crate::routes::profiles::get_director_profile,
        crate::routes::profiles::update_director_profile,
        crate::routes::profiles::get_venue_profile,
        crate::routes::profiles::update_venue_profile,
        crate::routes::profiles::search_directors,
        crate::routes::profiles::search_venues,
        crate::routes::availability::list_slots,
        crate::routes::availability::create_slot,
        crate::routes::availability::delete_slot,
        crate::routes::bookings::create_booking,
        crate::routes::bookings::list_bookings,
        crate::routes::bookings::get_booking,
        crate::routes::bookings::update_booking_status,
        crate::routes::payments::create_payment,
        crate::routes::payments::list_payments,
        crate::routes::payments::get_payment,
        crate::routes::payments::list_splits,
        crate::routes::payments::update_splits,
        crate::routes::documents::upload_document,
        crate::routes::documents::list_documents,
        crate::routes::documents::get_document,
        crate::routes::documents::download_document,
        crate::routes::documents::share_document,
        crate::routes::documents::delete_document,
        crate::routes::chat::list_rooms,
        crate::routes::chat::create_room,
        crate::routes::chat::list_messages,
        crate::routes::chat::post_message,
        crate::routes::chat::mark_room_read,
        crate::routes::clients::list_clients,
        crate::routes::clients::create_client,
        crate::routes::clients::update_client,
        crate::routes::compliance::create_record,
        crate::routes::compliance::list_records,
        crate::routes::compliance::get_for_booking,
        crate::routes::compliance::update_status,
        crate::routes::compliance::declare_emergency,
        crate::routes::notifications::get_notifications,
        crate::routes::notifications::get_unread_count,
        crate::routes::notifications::mark_notification_read,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::delete_notification,
        crate::routes::assistant::chat,
        crate::routes::dashboard::get_dashboard
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::util::Pagination,
            crate::routes::health::HealthResponse,
            crate::routes::models::UserResponse,
            crate::routes::models::DirectorProfile,
            crate::routes::models::VenueProfile,
            crate::routes::models::ProfileResponse,
            crate::routes::models::UpdateFamilyProfileRequest,
            crate::routes::models::UpdateDirectorProfileRequest,
            crate::routes::models::UpdateVenueProfileRequest,
            crate::routes::models::RegisterRequest,
            crate::routes::models::LoginRequest,
            crate::routes::models::SessionResponse,
            crate::routes::models::LogoutResponse,
            crate::routes::models::AvailabilitySlot,
            crate::routes::models::CreateSlotRequest,
            crate::routes::models::Booking,
            crate::routes::models::CreateBookingRequest,
            crate::routes::models::UpdateBookingStatusRequest,
            crate::routes::models::PaymentSplit,
            crate::routes::models::Payment,
            crate::routes::models::CreatePaymentRequest,
            crate::routes::models::UpdateSplitsRequest,
            crate::routes::models::Document,
            crate::routes::models::ShareDocumentRequest,
            crate::routes::models::DocumentShares,
            crate::routes::models::ChatParticipant,
            crate::routes::models::ChatRoom,
            crate::routes::models::ChatMessage,
            crate::routes::models::CreateRoomRequest,
            crate::routes::models::PostMessageRequest,
            crate::routes::models::MarkReadResponse,
            crate::routes::models::DirectorClient,
            crate::routes::models::CreateClientRequest,
            crate::routes::models::UpdateClientRequest,
            crate::routes::models::ComplianceRecord,
            crate::routes::models::CreateComplianceRequest,
            crate::routes::models::UpdateComplianceStatusRequest,
            crate::routes::models::EmergencyRequest,
            crate::routes::models::Notification,
            crate::routes::models::UnreadCountResponse,
            crate::routes::models::MarkAllReadResponse,
            crate::routes::models::AssistantChatRequest,
            crate::routes::models::AssistantChatResponse,
            crate::routes::models::DashboardSummary
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Registration and session management"),
        (name = "Profiles", description = "Family, director and venue profiles"),
        (name = "Availability", description = "Provider calendars"),
        (name = "Bookings", description = "Funeral bookings and their lifecycle"),
        (name = "Payments", description = "Payments and provider splits"),
        (name = "Documents", description = "Document vault"),
        (name = "Chat", description = "Booking chat rooms"),
        (name = "Director clients", description = "Director client book"),
        (name = "Compliance", description = "Legal burial deadline tracking"),
        (name = "Notifications", description = "User notifications"),
        (name = "Assistant", description = "Intake and compliance assistant"),
        (name = "Dashboard", description = "Role-specific overview")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("Bearer".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}
