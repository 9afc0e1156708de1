use crate::features::observability::repo::ObservabilityRepository;
use std::sync::Arc;

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn record_operation(&self, operation: &str, status: &str, seconds: f64) {
        self.repo.observe_operation(operation, status, seconds);
    }

    pub fn set_instance_count(&self, count: usize) {
        self.repo.set_instance_count(count as f64);
    }

    pub fn record_backend_failure(&self, call: &str) {
        self.repo.inc_backend_failure(call);
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        self.repo.render_metrics()
    }
}
