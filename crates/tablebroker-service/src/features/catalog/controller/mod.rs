use crate::features::catalog::service::CatalogService;
use crate::shared::types::CatalogResponse;
use std::sync::Arc;
use tracing::debug;

/// Controller for `GET /v2/catalog`
pub struct CatalogController {
    service: Arc<CatalogService>,
}

impl CatalogController {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    pub fn get_catalog(&self) -> CatalogResponse {
        debug!("Received catalog request");
        self.service.get_catalog()
    }
}
