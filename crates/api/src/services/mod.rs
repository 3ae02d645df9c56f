pub mod availability;
pub mod bookings;
pub mod chat;
pub mod clients;
pub mod compliance;
pub mod dashboard;
pub mod documents;
pub mod error;
pub mod notifications;
pub mod payments;
pub mod pricing;
pub mod profiles;
pub mod users;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::ServiceError;
