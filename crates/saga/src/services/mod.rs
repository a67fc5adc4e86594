//! External collaborator traits and in-memory implementations.

pub mod identity;
pub mod integration;

pub use identity::{IdentityProvisioning, InMemoryIdentityProvisioning};
pub use integration::{InMemoryIntegrationClient, IntegrationClient};
