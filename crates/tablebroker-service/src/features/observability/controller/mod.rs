use crate::features::observability::repo::ObservabilityRepository;
use crate::features::observability::service::ObservabilityService;
use crate::shared::error::{BrokerError, BrokerResult};
use std::sync::Arc;

pub struct ObservabilityController {
    service: ObservabilityService,
}

impl ObservabilityController {
    pub fn new(service: ObservabilityService) -> Self {
        Self { service }
    }

    /// Controller backed by its own metrics registry.
    pub fn with_registry() -> BrokerResult<Self> {
        let repo = ObservabilityRepository::new()
            .map_err(|e| BrokerError::Configuration(format!("metrics init: {e}")))?;
        Ok(Self::new(ObservabilityService::new(Arc::new(repo))))
    }

    pub fn record_operation(&self, operation: &str, status: &str, seconds: f64) {
        self.service.record_operation(operation, status, seconds);
    }

    pub fn set_instance_count(&self, count: usize) {
        self.service.set_instance_count(count);
    }

    pub fn record_backend_failure(&self, call: &str) {
        self.service.record_backend_failure(call);
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        self.service.render_metrics()
    }
}
