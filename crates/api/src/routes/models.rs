//! Request and response shapes shared by routes and services.

use afscheid_auth::User;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

// ----- users and profiles -----

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub role: String,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.public_id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            phone: user.phone.clone(),
            address: user.address.clone(),
            city: user.city.clone(),
            postal_code: user.postal_code.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct DirectorProfile {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub company_name: String,
    pub kvk_number: Option<String>,
    pub description: Option<String>,
    pub hourly_rate_cents: i64,
    pub service_area: Option<String>,
    pub is_active: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct VenueProfile {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub name: String,
    pub venue_type: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub capacity: i64,
    pub hourly_rate_cents: i64,
    pub is_active: bool,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub director: Option<DirectorProfile>,
    pub venue: Option<VenueProfile>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFamilyProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateDirectorProfileRequest {
    pub company_name: Option<String>,
    pub kvk_number: Option<String>,
    pub description: Option<String>,
    pub hourly_rate_cents: Option<i64>,
    pub service_area: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateVenueProfileRequest {
    pub name: Option<String>,
    pub venue_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub capacity: Option<i64>,
    pub hourly_rate_cents: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DirectorSearchQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub service_area: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct VenueSearchQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub city: Option<String>,
    pub venue_type: Option<String>,
}

// ----- auth -----

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

// ----- availability -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AvailabilitySlot {
    pub id: String,
    pub starts_at: String,
    pub ends_at: String,
    pub kind: String,
    pub booking_id: Option<String>,
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSlotRequest {
    pub starts_at: String,
    pub ends_at: String,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AvailabilityQuery {
    /// Only slots ending after this instant.
    pub from: Option<String>,
    /// Only slots starting before this instant.
    pub to: Option<String>,
}

// ----- bookings -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: String,
    pub family_id: String,
    pub family_name: String,
    pub director_id: String,
    pub director_name: String,
    pub venue_id: String,
    pub venue_name: String,
    pub service_type: String,
    pub starts_at: String,
    pub ends_at: String,
    pub attendee_count: i64,
    pub notes: Option<String>,
    pub status: String,
    pub director_amount_cents: i64,
    pub venue_amount_cents: i64,
    pub total_price_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub director_id: String,
    pub venue_id: String,
    pub service_type: String,
    pub starts_at: String,
    pub ends_at: String,
    pub attendee_count: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBookingStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BookingListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

// ----- payments -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct PaymentSplit {
    pub id: String,
    pub payment_id: String,
    pub recipient_id: Option<String>,
    pub recipient_role: String,
    pub amount_cents: i64,
    pub status: String,
    pub paid_at: Option<String>,
    pub payout_requested_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub payer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    #[sqlx(skip)]
    pub splits: Vec<PaymentSplit>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub booking_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSplitsRequest {
    pub split_ids: Vec<String>,
    pub status: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PaymentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SplitListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

// ----- documents -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub booking_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub is_encrypted: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShareDocumentRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentShares {
    pub document_id: String,
    pub shared_with: Vec<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DocumentListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ----- chat -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ChatParticipant {
    pub id: String,
    pub full_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatRoom {
    pub id: String,
    pub title: String,
    pub booking_id: Option<String>,
    pub participants: Vec<ChatParticipant>,
    pub unread_count: i64,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: String,
    pub read_by: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub title: String,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    pub booking_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub marked: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MessageListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ----- director clients -----

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DirectorClient {
    pub id: String,
    pub family_id: String,
    pub family_name: String,
    pub family_email: String,
    pub family_phone: Option<String>,
    pub status: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateClientRequest {
    pub family_id: String,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateClientRequest {
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ClientListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub tag: Option<String>,
}

// ----- compliance -----

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComplianceRecord {
    pub id: String,
    pub booking_id: String,
    pub death_registration_date: String,
    pub legal_deadline: String,
    pub days_remaining: i64,
    pub status: String,
    pub emergency_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComplianceRequest {
    pub booking_id: String,
    pub death_registration_date: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateComplianceStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmergencyRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ComplianceListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ----- notifications -----

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub related_entity_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

// ----- assistant -----

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssistantChatRequest {
    #[schema(value_type = String, example = "intake")]
    pub mode: afscheid_assistant::AssistantMode,
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<afscheid_assistant::ChatMessage>,
    pub booking_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssistantChatResponse {
    pub model: String,
    pub content: String,
    #[schema(value_type = Option<Object>)]
    pub usage: Option<afscheid_assistant::TokenUsage>,
}

// ----- dashboard -----

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum DashboardSummary {
    Family {
        upcoming_bookings: Vec<Booking>,
        pending_payments: i64,
        unread_notifications: i64,
    },
    Director {
        pending_bookings: Vec<Booking>,
        active_clients: i64,
        compliance_alerts: Vec<ComplianceRecord>,
        unread_notifications: i64,
    },
    Venue {
        upcoming_bookings: Vec<Booking>,
        pending_split_cents: i64,
        unread_notifications: i64,
    },
}
