use std::sync::Arc;
use tablebroker_provisioning::{InMemoryProvisioningBackend, ProvisioningBackend};
use tablebroker_service::server;
use tablebroker_service::shared::config::{BackendChoice, BrokerConfig};
use tablebroker_service::shared::error::{BrokerError, BrokerResult};
use tablebroker_service::Broker;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn select_backend(choice: BackendChoice) -> BrokerResult<Arc<dyn ProvisioningBackend>> {
    match choice {
        BackendChoice::Memory => {
            warn!("Using in-memory provisioning backend; nothing is created in a database");
            Ok(Arc::new(InMemoryProvisioningBackend::new()))
        }
        #[cfg(feature = "postgres")]
        BackendChoice::Postgres => Ok(Arc::new(
            tablebroker_provisioning::PostgresProvisioningBackend::with_sqlx(),
        )),
        #[cfg(not(feature = "postgres"))]
        BackendChoice::Postgres => Err(BrokerError::Configuration(
            "BROKER_BACKEND=postgres requires building with the `postgres` feature".to_string(),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tablebroker_service=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Tablebroker");

    let config = BrokerConfig::from_env()?;
    let backend = select_backend(config.backend)?;
    let broker = Broker::from_config(&config, backend)?;

    info!(
        listen_addr = %config.listen_addr,
        async_mode = config.lifecycle.async_mode,
        db_host = %config.lifecycle.db_host,
        db_port = config.lifecycle.db_port,
        "Broker configured"
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| BrokerError::Configuration(format!("bind {}: {e}", config.listen_addr)))?;
    axum::serve(listener, server::router(broker)).await?;

    Ok(())
}
