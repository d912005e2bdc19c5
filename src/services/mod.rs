// Services module - Business logic

pub mod access_codes;
pub mod attendance;
pub mod password;
pub mod payment_settings;
pub mod qr_generator;
pub mod reporting;
pub mod signature;
pub mod subscriptions;
