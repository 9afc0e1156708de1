use crate::features::instance_lifecycle::repo::locks::InstanceLocks;
use crate::features::instance_lifecycle::repo::InstanceRepository;
use crate::features::observability::controller::ObservabilityController;
use crate::shared::config::LifecycleSettings;
use crate::shared::error::{BrokerError, BrokerResult};
use crate::shared::types::{
    BindRequest, BindResult, DeprovisionRequest, DeprovisionResult, InstanceRecord,
    LastOperationRequest, ProvisionRequest, ProvisionResult, UnbindRequest, UnbindResult,
    UpdateRequest, UpdateResult,
};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tablebroker_core::{
    async_response, AccountCredentials, ConnectionDescriptor, CoreError, ProvisionParameters,
};
use tablebroker_provisioning::ProvisioningBackend;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// A failed backend call.
enum CallError {
    Failed(BrokerError),
    /// The deadline passed; the backend may or may not have applied the call.
    TimedOut(BrokerError),
}

impl CallError {
    fn timed_out(&self) -> bool {
        matches!(self, CallError::TimedOut(_))
    }
}

impl From<CallError> for BrokerError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Failed(e) | CallError::TimedOut(e) => e,
        }
    }
}

/// Backend access shared by request handlers and detached provisioning tasks
#[derive(Clone)]
struct BackendCalls {
    backend: Arc<dyn ProvisioningBackend>,
    settings: Arc<LifecycleSettings>,
    metrics: Option<Arc<ObservabilityController>>,
}

impl BackendCalls {
    fn deadline(&self) -> Instant {
        Instant::now() + self.settings.backend_timeout
    }

    /// Connection the instance's own account uses.
    fn instance_connection(&self, username: &str, password: &str) -> ConnectionDescriptor {
        self.settings.admin_connection.for_account(
            username,
            password,
            self.settings.db_host.as_str(),
            self.settings.db_port,
        )
    }

    /// Run one backend call under `deadline`, counting backend failures.
    async fn call<F>(&self, call: &'static str, deadline: Instant, fut: F) -> Result<(), CallError>
    where
        F: Future<Output = tablebroker_core::Result<()>>,
    {
        let err = match timeout_at(deadline, fut).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e @ CoreError::Timeout(_))) => CallError::TimedOut(e.into()),
            Ok(Err(e)) => CallError::Failed(e.into()),
            Err(_) => CallError::TimedOut(BrokerError::BackendFailure(format!(
                "{call} exceeded {:?}",
                self.settings.backend_timeout
            ))),
        };

        let (CallError::Failed(inner) | CallError::TimedOut(inner)) = &err;
        if let (Some(metrics), BrokerError::BackendFailure(_)) = (&self.metrics, inner) {
            metrics.record_backend_failure(call);
        }
        Err(err)
    }

    async fn remove_account(&self, instance_id: &str, username: &str) {
        let deadline = self.deadline();
        if let Err(e) = self
            .call(
                "delete_account",
                deadline,
                self.backend
                    .delete_account(username, &self.settings.admin_connection, deadline),
            )
            .await
        {
            let e = BrokerError::from(e);
            warn!(instance_id = %instance_id, username = %username, error = %e, "Failed to remove account after provisioning failure");
        }
    }

    /// Create the account and its table; undo the account if either step fails partway.
    async fn materialize(&self, instance_id: &str, params: &ProvisionParameters) -> BrokerResult<()> {
        let deadline = self.deadline();
        let created = self
            .call(
                "create_account",
                deadline,
                self.backend.create_account(
                    &params.db_username,
                    &params.db_password,
                    &self.settings.admin_connection,
                    deadline,
                ),
            )
            .await;
        if let Err(err) = created {
            // a rejected call left nothing behind; an expired one might have
            if err.timed_out() {
                self.remove_account(instance_id, &params.db_username).await;
            }
            return Err(err.into());
        }
        debug!(instance_id = %instance_id, username = %params.db_username, "Account created");

        let connection = self.instance_connection(&params.db_username, &params.db_password);
        let deadline = self.deadline();
        let created = self
            .call(
                "create_container",
                deadline,
                self.backend.create_container(
                    &connection,
                    &params.table_name,
                    &params.table_schema,
                    deadline,
                ),
            )
            .await;

        if let Err(err) = created {
            self.remove_account(instance_id, &params.db_username).await;
            return Err(err.into());
        }

        Ok(())
    }
}

/// Service implementing the broker-side lifecycle of service instances
pub struct InstanceLifecycleService {
    repo: Arc<dyn InstanceRepository>,
    locks: InstanceLocks,
    calls: BackendCalls,
}

impl InstanceLifecycleService {
    pub fn new(
        repo: Arc<dyn InstanceRepository>,
        backend: Arc<dyn ProvisioningBackend>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            repo,
            locks: InstanceLocks::new(),
            calls: BackendCalls {
                backend,
                settings: Arc::new(settings),
                metrics: None,
            },
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ObservabilityController>) -> Self {
        self.calls.metrics = Some(metrics);
        self
    }

    fn require(field: &str, value: &str) -> BrokerResult<()> {
        if value.trim().is_empty() {
            return Err(BrokerError::InvalidRequest(format!(
                "{field} cannot be empty"
            )));
        }
        Ok(())
    }

    fn is_async(&self, accepts_incomplete: bool) -> bool {
        async_response(accepts_incomplete, self.calls.settings.async_mode)
    }

    /// Provision a new instance, or acknowledge an identical replay
    pub async fn provision(&self, request: ProvisionRequest) -> BrokerResult<ProvisionResult> {
        Self::require("instance_id", &request.instance_id)?;
        Self::require("service_id", &request.service_id)?;
        Self::require("plan_id", &request.plan_id)?;

        let guard = self.locks.acquire(&request.instance_id).await?;
        let is_async = self.is_async(request.accepts_incomplete);

        let candidate = InstanceRecord::new(
            request.instance_id,
            request.service_id,
            request.plan_id,
            request.parameters,
        );

        if let Some(existing) = self.repo.get(&candidate.instance_id).await? {
            if existing.matches(&candidate) {
                info!(instance_id = %candidate.instance_id, "Instance already provisioned with identical attributes");
                return Ok(ProvisionResult {
                    already_exists: true,
                    is_async,
                });
            }
            return Err(BrokerError::Conflict(format!(
                "instance {} exists with different attributes",
                candidate.instance_id
            )));
        }

        let params = ProvisionParameters::from_parameters(&candidate.parameters)?;
        let repo = self.repo.clone();
        let calls = self.calls.clone();

        // Reservation and backend work run detached and keep the instance lock,
        // so dropping this future never strands a reservation.
        let work = tokio::spawn(async move {
            let _guard = guard;
            let instance_id = candidate.instance_id.clone();
            repo.create(candidate).await?;

            if let Err(err) = calls.materialize(&instance_id, &params).await {
                warn!(instance_id = %instance_id, error = %err, "Provisioning failed; releasing reservation");
                if let Err(e) = repo.delete(&instance_id).await {
                    warn!(instance_id = %instance_id, error = %e, "Failed to release reservation");
                }
                return Err(err);
            }

            info!(instance_id = %instance_id, table = %params.table_name, "Instance provisioned");
            Ok::<(), BrokerError>(())
        });

        work.await
            .map_err(|e| BrokerError::StorageError(format!("provisioning task failed: {e}")))??;

        Ok(ProvisionResult {
            already_exists: false,
            is_async,
        })
    }

    /// Deprovision an instance; unknown ids succeed without backend work
    pub async fn deprovision(
        &self,
        request: DeprovisionRequest,
    ) -> BrokerResult<DeprovisionResult> {
        Self::require("instance_id", &request.instance_id)?;

        let _guard = self.locks.acquire(&request.instance_id).await?;
        let is_async = self.is_async(request.accepts_incomplete);

        let Some(record) = self.repo.get(&request.instance_id).await? else {
            info!(instance_id = %request.instance_id, "Deprovision of unknown instance; nothing to do");
            return Ok(DeprovisionResult { is_async });
        };

        match AccountCredentials::from_parameters(&record.parameters) {
            Ok(account) => {
                let deadline = self.calls.deadline();
                if let Err(e) = self
                    .calls
                    .call(
                        "delete_account",
                        deadline,
                        self.calls.backend.delete_account(
                            &account.username,
                            &self.calls.settings.admin_connection,
                            deadline,
                        ),
                    )
                    .await
                {
                    let e = BrokerError::from(e);
                    warn!(instance_id = %request.instance_id, username = %account.username, error = %e, "Account deletion failed; removing instance anyway");
                }
            }
            Err(e) => {
                warn!(instance_id = %request.instance_id, error = %e, "Stored record has no account; skipping backend cleanup");
            }
        }

        self.repo.delete(&request.instance_id).await?;
        info!(instance_id = %request.instance_id, "Instance deprovisioned");

        Ok(DeprovisionResult { is_async })
    }

    /// Bind to an instance, returning its parameters plus the connection uri
    pub async fn bind(&self, request: BindRequest) -> BrokerResult<BindResult> {
        Self::require("instance_id", &request.instance_id)?;

        let _guard = self.locks.acquire(&request.instance_id).await?;
        let is_async = self.is_async(request.accepts_incomplete);

        let mut record = self
            .repo
            .get(&request.instance_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(request.instance_id.clone()))?;

        let account = AccountCredentials::from_parameters(&record.parameters)?;
        let uri = self
            .calls
            .instance_connection(&account.username, &account.password)
            .to_string();

        self.repo
            .set_connection_uri(&request.instance_id, uri.clone())
            .await?;
        record.connection_uri = Some(uri);

        info!(instance_id = %request.instance_id, binding_id = %request.binding_id, "Instance bound");

        Ok(BindResult {
            credentials: record.credentials(),
            is_async,
        })
    }

    /// Bindings carry no state, so there is nothing to remove
    pub async fn unbind(&self, request: UnbindRequest) -> BrokerResult<UnbindResult> {
        debug!(instance_id = %request.instance_id, binding_id = %request.binding_id, "Unbind is a no-op");
        Ok(UnbindResult)
    }

    pub async fn update(&self, request: UpdateRequest) -> BrokerResult<UpdateResult> {
        debug!(instance_id = %request.instance_id, "Update accepted without changes");
        Ok(UpdateResult {
            is_async: self.is_async(request.accepts_incomplete),
        })
    }

    /// Operation polling is not supported; every call fails.
    pub async fn last_operation(&self, request: LastOperationRequest) -> BrokerResult<Infallible> {
        Err(BrokerError::NotImplemented(format!(
            "last operation polling for instance {}",
            request.instance_id
        )))
    }

    pub async fn instance_count(&self) -> BrokerResult<usize> {
        self.repo.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::instance_lifecycle::repo::InMemoryInstanceRepository;
    use crate::shared::types::Parameters;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::time::Duration;
    use tablebroker_core::CREDENTIAL_URI;
    use tablebroker_provisioning::{BackendKind, BackendMetadata, InMemoryProvisioningBackend};
    use tokio_test::assert_ok;

    mock! {
        pub Backend {}

        #[async_trait]
        impl ProvisioningBackend for Backend {
            async fn create_account(
                &self,
                username: &str,
                password: &str,
                admin: &ConnectionDescriptor,
                deadline: Instant,
            ) -> tablebroker_core::Result<()>;

            async fn create_container(
                &self,
                connection: &ConnectionDescriptor,
                container_name: &str,
                schema_definition: &str,
                deadline: Instant,
            ) -> tablebroker_core::Result<()>;

            async fn delete_account(
                &self,
                username: &str,
                admin: &ConnectionDescriptor,
                deadline: Instant,
            ) -> tablebroker_core::Result<()>;

            fn metadata(&self) -> BackendMetadata;
        }
    }

    fn settings(async_mode: bool) -> LifecycleSettings {
        LifecycleSettings {
            async_mode,
            admin_connection: ConnectionDescriptor::new(
                "sys",
                "adminpw",
                "admin.local",
                Some(1521),
                "service",
            ),
            db_host: "host".to_string(),
            db_port: 1521,
            backend_timeout: Duration::from_secs(5),
        }
    }

    fn table_params(user: &str, table: &str) -> Parameters {
        json!({
            "dbusername": user,
            "dbpassword": "p1",
            "tablename": table,
            "tableschema": "ID int"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn provision_request(id: &str, params: Parameters) -> ProvisionRequest {
        ProvisionRequest {
            instance_id: id.to_string(),
            service_id: "S1".to_string(),
            plan_id: "P1".to_string(),
            parameters: params,
            accepts_incomplete: false,
        }
    }

    fn bind_request(id: &str) -> BindRequest {
        BindRequest {
            instance_id: id.to_string(),
            binding_id: "b1".to_string(),
            accepts_incomplete: false,
        }
    }

    fn deprovision_request(id: &str) -> DeprovisionRequest {
        DeprovisionRequest {
            instance_id: id.to_string(),
            accepts_incomplete: false,
        }
    }

    fn create_test_service(
        backend: InMemoryProvisioningBackend,
        async_mode: bool,
    ) -> InstanceLifecycleService {
        InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(async_mode),
        )
    }

    #[tokio::test]
    async fn test_provision_bind_deprovision_scenario() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        assert!(!result.already_exists);
        assert!(!result.is_async);
        assert!(backend.has_account("u1").unwrap());
        assert_eq!(backend.container("T").unwrap().unwrap().owner, "u1");

        let bound = service.bind(bind_request("A")).await.unwrap();
        assert_eq!(
            bound.credentials.get(CREDENTIAL_URI),
            Some(&json!("u1/p1@host:1521/service"))
        );
        assert_eq!(bound.credentials.get("tablename"), Some(&json!("T")));

        service.deprovision(deprovision_request("A")).await.unwrap();
        assert_eq!(service.instance_count().await.unwrap(), 0);
        assert!(!backend.has_account("u1").unwrap());

        let result = service.bind(bind_request("A")).await;
        assert!(matches!(result, Err(BrokerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_identical_provision_is_idempotent() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        let replay = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();

        assert!(replay.already_exists);
        assert_eq!(backend.create_account_calls(), 1);
        assert_eq!(service.instance_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replay_after_bind_is_still_idempotent() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        service.bind(bind_request("A")).await.unwrap();

        let replay = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        assert!(replay.already_exists);
    }

    #[tokio::test]
    async fn test_provision_with_different_parameters_conflicts() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        let result = service
            .provision(provision_request("A", table_params("u1", "Other")))
            .await;

        assert!(matches!(result, Err(BrokerError::Conflict(_))));
        assert_eq!(backend.create_account_calls(), 1);

        let bound = service.bind(bind_request("A")).await.unwrap();
        assert_eq!(bound.credentials.get("tablename"), Some(&json!("T")));
    }

    #[tokio::test]
    async fn test_provision_with_different_plan_conflicts() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        let mut request = provision_request("A", table_params("u1", "T"));
        request.plan_id = "P2".to_string();

        let result = service.provision(request).await;
        assert!(matches!(result, Err(BrokerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_provision_rejects_missing_parameters() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        let mut params = table_params("u1", "T");
        params.remove("tableschema");
        let result = service.provision(provision_request("A", params)).await;

        assert!(matches!(result, Err(BrokerError::InvalidParameters(_))));
        assert_eq!(backend.create_account_calls(), 0);
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_provision_rejects_empty_ids() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);

        let result = service
            .provision(provision_request("", table_params("u1", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidRequest(_))));

        let mut request = provision_request("A", table_params("u1", "T"));
        request.service_id = String::new();
        let result = service.provision(request).await;
        assert!(matches!(result, Err(BrokerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_account_failure_rolls_back_and_retry_succeeds() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        backend.set_unavailable(true);
        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));
        assert_eq!(service.instance_count().await.unwrap(), 0);

        backend.set_unavailable(false);
        let retry = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        assert!(!retry.already_exists);
        assert_eq!(backend.create_account_calls(), 2);
        assert!(backend.has_account("u1").unwrap());
    }

    #[tokio::test]
    async fn test_container_failure_removes_account_and_reservation() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();

        // same table name under another account fails at create_container
        let result = service
            .provision(provision_request("B", table_params("u2", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));

        assert!(!backend.has_account("u2").unwrap());
        assert_eq!(backend.delete_account_calls(), 1);
        assert_eq!(service.instance_count().await.unwrap(), 1);
        assert!(matches!(
            service.bind(bind_request("B")).await,
            Err(BrokerError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_call_is_bounded_by_timeout() {
        let backend = InMemoryProvisioningBackend::new().with_latency(Duration::from_secs(30));
        let service = create_test_service(backend.clone(), false);

        let started = Instant::now();
        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await;

        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));
        // one deadline for the account, one for removing whatever it left
        assert!(started.elapsed() <= Duration::from_secs(11));
        assert_eq!(backend.delete_account_calls(), 1);
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deprovision_unknown_instance_skips_backend() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        assert_ok!(service.deprovision(deprovision_request("missing")).await);
        assert_eq!(backend.delete_account_calls(), 0);
    }

    #[tokio::test]
    async fn test_deprovision_removes_record_when_backend_fails() {
        let backend = InMemoryProvisioningBackend::new();
        let service = create_test_service(backend.clone(), false);

        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();

        backend.set_unavailable(true);
        assert_ok!(service.deprovision(deprovision_request("A")).await);
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bind_is_idempotent() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);
        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();

        let first = service.bind(bind_request("A")).await.unwrap();
        let second = service.bind(bind_request("A")).await.unwrap();

        assert_eq!(first.credentials, second.credentials);
        assert_eq!(second.credentials.len(), 5);
    }

    #[tokio::test]
    async fn test_async_flag_requires_both_opt_in_and_async_mode() {
        let sync_broker = create_test_service(InMemoryProvisioningBackend::new(), false);
        let async_broker = create_test_service(InMemoryProvisioningBackend::new(), true);

        let mut request = provision_request("A", table_params("u1", "T"));
        request.accepts_incomplete = true;
        assert!(!sync_broker.provision(request.clone()).await.unwrap().is_async);
        assert!(async_broker.provision(request).await.unwrap().is_async);

        let update = |accepts_incomplete| UpdateRequest {
            instance_id: "A".to_string(),
            service_id: "S1".to_string(),
            plan_id: None,
            parameters: None,
            accepts_incomplete,
        };
        assert!(!async_broker.update(update(false)).await.unwrap().is_async);
        assert!(async_broker.update(update(true)).await.unwrap().is_async);
    }

    #[tokio::test]
    async fn test_unbind_and_update_do_not_touch_state() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);

        let unbind = service
            .unbind(UnbindRequest {
                instance_id: "never-provisioned".to_string(),
                binding_id: "b1".to_string(),
            })
            .await;
        assert_eq!(unbind.unwrap(), UnbindResult);

        let update = service
            .update(UpdateRequest {
                instance_id: "never-provisioned".to_string(),
                service_id: "S1".to_string(),
                plan_id: Some("P2".to_string()),
                parameters: None,
                accepts_incomplete: false,
            })
            .await;
        assert!(update.is_ok());
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_operation_is_not_implemented() {
        let service = create_test_service(InMemoryProvisioningBackend::new(), false);
        let result = service
            .last_operation(LastOperationRequest {
                instance_id: "A".to_string(),
                operation: None,
            })
            .await;
        assert!(matches!(result, Err(BrokerError::NotImplemented(_))));
    }

    #[tokio::test]
    async fn test_concurrent_identical_provisions_create_one_account() {
        let backend = InMemoryProvisioningBackend::new().with_latency(Duration::from_millis(20));
        let service = Arc::new(create_test_service(backend.clone(), false));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .provision(provision_request("A", table_params("u1", "T")))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            if !result.already_exists {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(backend.create_account_calls(), 1);
        assert_eq!(service.instance_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_instances_provision_in_parallel() {
        let backend = InMemoryProvisioningBackend::new().with_latency(Duration::from_secs(1));
        let service = Arc::new(create_test_service(backend, false));

        let started = Instant::now();
        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .provision(provision_request("A", table_params("u1", "T1")))
                    .await
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .provision(provision_request("B", table_params("u2", "T2")))
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // two round trips each; serialized execution would take four seconds
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_backend_receives_instance_connection() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_account()
            .times(1)
            .returning(|username, _, admin, _| {
                assert_eq!(username, "u1");
                assert_eq!(admin.username, "sys");
                Ok(())
            });
        backend
            .expect_create_container()
            .times(1)
            .returning(|connection, table, schema, _| {
                assert_eq!(connection.to_string(), "u1/p1@host:1521/service");
                assert_eq!(table, "T");
                assert_eq!(schema, "ID int");
                Ok(())
            });
        backend.expect_delete_account().times(0);
        backend.expect_metadata().returning(|| BackendMetadata {
            backend_id: "mock".to_string(),
            kind: BackendKind::InMemory,
            version: "0".to_string(),
        });

        let service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(false),
        );
        service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_backend_failures_are_counted() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_account()
            .times(1)
            .returning(|_, _, _, _| Err(tablebroker_core::CoreError::Backend("down".to_string())));
        backend.expect_create_container().times(0);

        let metrics = Arc::new(ObservabilityController::with_registry().unwrap());
        let service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(false),
        )
        .with_metrics(metrics.clone());

        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));

        let rendered = metrics.render_metrics().unwrap();
        assert!(rendered.contains("tablebroker_backend_failure_total{call=\"create_account\"} 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_provision_still_completes() {
        let backend =
            InMemoryProvisioningBackend::new().with_latency(Duration::from_millis(200));
        let service = Arc::new(create_test_service(backend.clone(), false));

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .provision(provision_request("A", table_params("u1", "T")))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let replay = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        assert!(replay.already_exists);
        assert!(backend.has_account("u1").unwrap());
        assert!(backend.container("T").unwrap().is_some());
        assert_eq!(backend.create_account_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_failing_provision_releases_reservation() {
        let backend =
            InMemoryProvisioningBackend::new().with_latency(Duration::from_millis(200));
        backend.set_unavailable(true);
        let service = Arc::new(create_test_service(backend.clone(), false));

        let first = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .provision(provision_request("A", table_params("u1", "T")))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.abort();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(service.instance_count().await.unwrap(), 0);
        assert_eq!(backend.delete_account_calls(), 0);

        backend.set_unavailable(false);
        let retry = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await
            .unwrap();
        assert!(!retry.already_exists);
        assert!(backend.has_account("u1").unwrap());
    }

    #[tokio::test]
    async fn test_timed_out_account_creation_is_undone() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_account()
            .times(1)
            .returning(|_, _, _, _| Err(tablebroker_core::CoreError::Timeout("slow".to_string())));
        backend.expect_create_container().times(0);
        backend
            .expect_delete_account()
            .times(1)
            .returning(|username, _, _| {
                assert_eq!(username, "u1");
                Ok(())
            });

        let service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(false),
        );
        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejected_account_creation_deletes_nothing() {
        let mut backend = MockBackend::new();
        backend.expect_create_account().times(1).returning(|_, _, _, _| {
            Err(tablebroker_core::CoreError::Backend(
                "role \"u1\" already exists".to_string(),
            ))
        });
        backend.expect_create_container().times(0);
        backend.expect_delete_account().times(0);

        let service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(false),
        );
        let result = service
            .provision(provision_request("A", table_params("u1", "T")))
            .await;
        assert!(matches!(result, Err(BrokerError::BackendFailure(_))));
        assert_eq!(service.instance_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_identifiers_are_not_counted_as_backend_failures() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_account()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        backend.expect_create_container().times(1).returning(|_, _, _, _| {
            Err(tablebroker_core::CoreError::InvalidParameters(
                "invalid table name".to_string(),
            ))
        });
        backend
            .expect_delete_account()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let metrics = Arc::new(ObservabilityController::with_registry().unwrap());
        let service = InstanceLifecycleService::new(
            Arc::new(InMemoryInstanceRepository::new()),
            Arc::new(backend),
            settings(false),
        )
        .with_metrics(metrics.clone());

        let result = service
            .provision(provision_request("A", table_params("u1", "bad table")))
            .await;
        assert!(matches!(result, Err(BrokerError::InvalidParameters(_))));

        let rendered = metrics.render_metrics().unwrap();
        assert!(!rendered.contains("tablebroker_backend_failure_total{call=\"create_container\"}"));
    }
}
