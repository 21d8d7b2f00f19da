pub mod auth;
pub mod driver;
pub mod notifications;
pub mod passenger;
