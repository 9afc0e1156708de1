use crate::features::catalog::repo::CatalogRepository;
use crate::shared::types::CatalogResponse;
use std::sync::Arc;

/// Service answering catalog queries
pub struct CatalogService {
    repo: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        Self { repo }
    }

    pub fn get_catalog(&self) -> CatalogResponse {
        self.repo.catalog()
    }
}
