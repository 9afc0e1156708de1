pub mod repo;
pub mod service;

use crate::{BackendKind, BackendMetadata, ProvisioningBackend};
use async_trait::async_trait;
use repo::SqlExecutorRepository;
use service::SqlStatementService;
use std::sync::Arc;
use tablebroker_core::{ConnectionDescriptor, Result};
use tokio::time::Instant;
use tracing::info;

/// Provisions a PostgreSQL role plus one table per service instance.
pub struct PostgresProvisioningBackend {
    executor: Arc<dyn SqlExecutorRepository>,
    statements: SqlStatementService,
    metadata: BackendMetadata,
}

impl PostgresProvisioningBackend {
    pub fn new(executor: Arc<dyn SqlExecutorRepository>) -> Self {
        Self {
            executor,
            statements: SqlStatementService::new(),
            metadata: BackendMetadata {
                backend_id: "postgres".to_string(),
                kind: BackendKind::Postgres,
                version: "0.1.0".to_string(),
            },
        }
    }

    #[cfg(feature = "postgres")]
    pub fn with_sqlx() -> Self {
        Self::new(Arc::new(repo::SqlxExecutorRepository::new()))
    }
}

#[async_trait]
impl ProvisioningBackend for PostgresProvisioningBackend {
    async fn create_account(
        &self,
        username: &str,
        password: &str,
        admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()> {
        let statements =
            self.statements
                .create_account_statements(username, password, &admin.service)?;
        self.executor
            .execute_batch(admin, &statements, deadline)
            .await?;
        info!(%username, database = %admin.service, "Created database role");
        Ok(())
    }

    async fn create_container(
        &self,
        connection: &ConnectionDescriptor,
        container_name: &str,
        schema_definition: &str,
        deadline: Instant,
    ) -> Result<()> {
        let statement = self
            .statements
            .create_container_statement(container_name, schema_definition)?;
        self.executor
            .execute_batch(connection, &[statement], deadline)
            .await?;
        info!(owner = %connection.username, table = %container_name, "Created table");
        Ok(())
    }

    async fn delete_account(
        &self,
        username: &str,
        admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()> {
        let statements = self.statements.delete_account_statements(username)?;
        self.executor
            .execute_batch(admin, &statements, deadline)
            .await?;
        info!(%username, "Dropped database role");
        Ok(())
    }

    fn metadata(&self) -> BackendMetadata {
        self.metadata.clone()
    }
}
