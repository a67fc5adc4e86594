//! HTTP route handlers.

pub mod cafs;
pub mod callbacks;
pub mod health;
pub mod metrics;
