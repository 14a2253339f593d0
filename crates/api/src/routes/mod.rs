//! HTTP route handlers.

pub mod auth;
pub mod health;
pub mod metrics;
pub mod reference;
pub mod tickets;
