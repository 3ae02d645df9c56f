pub mod assistant;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod chat;
pub mod clients;
pub mod compliance;
pub mod dashboard;
pub mod documents;
pub mod health;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod profiles;
