use crate::features::instance_lifecycle::service::InstanceLifecycleService;
use crate::features::observability::controller::ObservabilityController;
use crate::shared::error::BrokerResult;
use crate::shared::types::{
    BindRequest, BindResult, DeprovisionRequest, DeprovisionResult, LastOperationRequest,
    ProvisionRequest, ProvisionResult, UnbindRequest, UnbindResult, UpdateRequest, UpdateResult,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tablebroker_core::ErrorResponse;
use tracing::{info, warn};
use uuid::Uuid;

/// Controller for the instance lifecycle endpoints
pub struct InstanceLifecycleController {
    service: Arc<InstanceLifecycleService>,
    metrics: Arc<ObservabilityController>,
}

impl InstanceLifecycleController {
    pub fn new(service: Arc<InstanceLifecycleService>, metrics: Arc<ObservabilityController>) -> Self {
        Self { service, metrics }
    }

    /// Record outcome and latency, then convert errors for the wire.
    fn finish<T>(
        &self,
        operation: &str,
        request_id: Uuid,
        started: Instant,
        result: BrokerResult<T>,
    ) -> Result<T, ErrorResponse> {
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.error_code(),
        };
        self.metrics
            .record_operation(operation, status, started.elapsed().as_secs_f64());

        result.map_err(|e| {
            warn!(%request_id, operation, error = %e, "Request failed");
            e.into()
        })
    }

    async fn refresh_instance_count(&self) {
        if let Ok(count) = self.service.instance_count().await {
            self.metrics.set_instance_count(count);
        }
    }

    /// Handle provision request
    pub async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionResult, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, plan_id = %request.plan_id, "Received provision request");

        let started = Instant::now();
        let result = self.service.provision(request).await;
        self.refresh_instance_count().await;
        self.finish("provision", request_id, started, result)
    }

    /// Handle deprovision request
    pub async fn deprovision(
        &self,
        request: DeprovisionRequest,
    ) -> Result<DeprovisionResult, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, "Received deprovision request");

        let started = Instant::now();
        let result = self.service.deprovision(request).await;
        self.refresh_instance_count().await;
        self.finish("deprovision", request_id, started, result)
    }

    /// Handle bind request
    pub async fn bind(&self, request: BindRequest) -> Result<BindResult, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, binding_id = %request.binding_id, "Received bind request");

        let started = Instant::now();
        let result = self.service.bind(request).await;
        self.finish("bind", request_id, started, result)
    }

    /// Handle unbind request
    pub async fn unbind(&self, request: UnbindRequest) -> Result<UnbindResult, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, binding_id = %request.binding_id, "Received unbind request");

        let started = Instant::now();
        let result = self.service.unbind(request).await;
        self.finish("unbind", request_id, started, result)
    }

    /// Handle update request
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateResult, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, "Received update request");

        let started = Instant::now();
        let result = self.service.update(request).await;
        self.finish("update", request_id, started, result)
    }

    pub async fn last_operation(
        &self,
        request: LastOperationRequest,
    ) -> Result<Infallible, ErrorResponse> {
        let request_id = Uuid::new_v4();
        info!(%request_id, instance_id = %request.instance_id, "Received last operation request");

        let started = Instant::now();
        let result = self.service.last_operation(request).await;
        self.finish("last_operation", request_id, started, result)
    }
}
