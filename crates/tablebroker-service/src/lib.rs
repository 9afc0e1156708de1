pub mod features;
pub mod server;
pub mod shared;

use crate::features::catalog::controller::CatalogController;
use crate::features::catalog::repo::{CatalogRepository, StaticCatalogRepository};
use crate::features::catalog::service::CatalogService;
use crate::features::instance_lifecycle::controller::InstanceLifecycleController;
use crate::features::instance_lifecycle::repo::InMemoryInstanceRepository;
use crate::features::instance_lifecycle::service::InstanceLifecycleService;
use crate::features::observability::controller::ObservabilityController;
use crate::shared::config::{BrokerConfig, LifecycleSettings};
use crate::shared::error::BrokerResult;
use std::sync::Arc;
use tablebroker_provisioning::{BackendMetadata, ProvisioningBackend};
use tracing::info;

/// Wires the catalog, lifecycle and metrics controllers around one backend.
///
/// Cheap to clone; every clone shares the same instance store and registry.
#[derive(Clone)]
pub struct Broker {
    catalog: Arc<CatalogController>,
    lifecycle: Arc<InstanceLifecycleController>,
    metrics: Arc<ObservabilityController>,
    backend: BackendMetadata,
}

impl Broker {
    pub fn new(
        settings: LifecycleSettings,
        catalog_repo: Arc<dyn CatalogRepository>,
        backend: Arc<dyn ProvisioningBackend>,
    ) -> BrokerResult<Self> {
        let metrics = Arc::new(ObservabilityController::with_registry()?);
        let backend_metadata = backend.metadata();

        let catalog = Arc::new(CatalogController::new(Arc::new(CatalogService::new(
            catalog_repo,
        ))));

        let lifecycle_service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            backend,
            settings,
        )
        .with_metrics(metrics.clone());
        let lifecycle = Arc::new(InstanceLifecycleController::new(
            Arc::new(lifecycle_service),
            metrics.clone(),
        ));

        info!(
            backend_id = %backend_metadata.backend_id,
            backend_kind = ?backend_metadata.kind,
            "Broker initialized"
        );

        Ok(Self {
            catalog,
            lifecycle,
            metrics,
            backend: backend_metadata,
        })
    }

    /// Build from process configuration, loading the catalog file if one is set.
    pub fn from_config(
        config: &BrokerConfig,
        backend: Arc<dyn ProvisioningBackend>,
    ) -> BrokerResult<Self> {
        let catalog_repo =
            StaticCatalogRepository::from_optional_path(config.catalog_path.as_deref())?;
        Self::new(config.lifecycle.clone(), Arc::new(catalog_repo), backend)
    }

    pub fn catalog(&self) -> &CatalogController {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &InstanceLifecycleController {
        &self.lifecycle
    }

    pub fn metrics(&self) -> &ObservabilityController {
        &self.metrics
    }

    pub fn backend(&self) -> &BackendMetadata {
        &self.backend
    }
}
