// API module - HTTP endpoints

pub mod attendance;
pub mod auth;
pub mod dashboard;
pub mod gyms;
pub mod health;
pub mod members;
pub mod middleware;
pub mod plans;
