pub mod features;
pub mod in_memory;

use async_trait::async_trait;
use tablebroker_core::{ConnectionDescriptor, Result};
use tokio::time::Instant;

pub use features::postgres_backend::PostgresProvisioningBackend;
pub use in_memory::InMemoryProvisioningBackend;

/// Creates and removes the resources backing a service instance.
///
/// Every call carries a deadline; implementations should give up once it
/// has passed.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Create a credentialed account using the privileged connection.
    async fn create_account(
        &self,
        username: &str,
        password: &str,
        admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()>;

    /// Create a data container (table) as the account behind `connection`.
    async fn create_container(
        &self,
        connection: &ConnectionDescriptor,
        container_name: &str,
        schema_definition: &str,
        deadline: Instant,
    ) -> Result<()>;

    /// Delete an account and everything it owns.
    async fn delete_account(
        &self,
        username: &str,
        admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()>;

    fn metadata(&self) -> BackendMetadata;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendMetadata {
    pub backend_id: String,
    pub kind: BackendKind,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    InMemory,
    Postgres,
}
