use crate::shared::error::BrokerResult;
use crate::shared::types::CatalogResponse;
use std::path::Path;
use tracing::info;

/// Source of the advertised catalog
pub trait CatalogRepository: Send + Sync {
    fn catalog(&self) -> CatalogResponse;
}

/// Catalog fixed at startup, either built in or read from a JSON file
#[derive(Debug, Clone)]
pub struct StaticCatalogRepository {
    catalog: CatalogResponse,
}

impl StaticCatalogRepository {
    pub fn new(catalog: CatalogResponse) -> Self {
        Self { catalog }
    }

    pub fn builtin() -> Self {
        Self::new(CatalogResponse::builtin())
    }

    pub fn from_path(path: &Path) -> BrokerResult<Self> {
        let catalog = CatalogResponse::load(path)?;
        info!(path = %path.display(), services = catalog.services.len(), "Using catalog file");
        Ok(Self::new(catalog))
    }

    /// Load from `path` when given, otherwise fall back to the built-in catalog.
    pub fn from_optional_path(path: Option<&Path>) -> BrokerResult<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }
}

impl CatalogRepository for StaticCatalogRepository {
    fn catalog(&self) -> CatalogResponse {
        self.catalog.clone()
    }
}
