use async_trait::async_trait;
use tablebroker_core::{ConnectionDescriptor, Result};
use tokio::time::Instant;

/// Executes a batch of statements on one connection, in order.
#[async_trait]
pub trait SqlExecutorRepository: Send + Sync {
    async fn execute_batch(
        &self,
        connection: &ConnectionDescriptor,
        statements: &[String],
        deadline: Instant,
    ) -> Result<()>;
}

#[cfg(feature = "postgres")]
pub use sqlx_executor::SqlxExecutorRepository;

#[cfg(feature = "postgres")]
mod sqlx_executor {
    use super::SqlExecutorRepository;
    use async_trait::async_trait;
    use sqlx::postgres::PgConnectOptions;
    use sqlx::{Connection, Executor, PgConnection};
    use tablebroker_core::{ConnectionDescriptor, CoreError, Result};
    use tokio::time::Instant;
    use tracing::debug;

    /// Opens a fresh connection per batch; provisioning traffic is rare.
    #[derive(Debug, Clone, Default)]
    pub struct SqlxExecutorRepository;

    impl SqlxExecutorRepository {
        pub fn new() -> Self {
            Self
        }

        pub(crate) fn connect_options(connection: &ConnectionDescriptor) -> PgConnectOptions {
            let options = PgConnectOptions::new()
                .host(&connection.host)
                .username(&connection.username)
                .password(&connection.password)
                .database(&connection.service);
            match connection.port {
                Some(port) => options.port(port),
                None => options,
            }
        }

        /// Runs the batch in one transaction so a failed statement leaves nothing behind.
        async fn run(connection: &ConnectionDescriptor, statements: &[String]) -> Result<()> {
            let mut conn = PgConnection::connect_with(&Self::connect_options(connection))
                .await
                .map_err(|e| {
                    CoreError::Backend(format!(
                        "failed to connect as '{}' to {}: {e}",
                        connection.username, connection.host
                    ))
                })?;

            let mut tx = conn
                .begin()
                .await
                .map_err(|e| CoreError::Backend(format!("failed to begin transaction: {e}")))?;
            for statement in statements {
                let result = (&mut *tx)
                    .execute(statement.as_str())
                    .await
                    .map_err(|e| CoreError::Backend(format!("statement failed: {e}")))?;
                debug!(rows = result.rows_affected(), "Executed statement");
            }
            tx.commit()
                .await
                .map_err(|e| CoreError::Backend(format!("failed to commit: {e}")))?;

            conn.close()
                .await
                .map_err(|e| CoreError::Backend(format!("failed to close connection: {e}")))
        }
    }

    #[async_trait]
    impl SqlExecutorRepository for SqlxExecutorRepository {
        async fn execute_batch(
            &self,
            connection: &ConnectionDescriptor,
            statements: &[String],
            deadline: Instant,
        ) -> Result<()> {
            tokio::time::timeout_at(deadline, Self::run(connection, statements))
                .await
                .map_err(|_| CoreError::Timeout("database call exceeded deadline".to_string()))?
        }
    }

}
