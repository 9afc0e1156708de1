pub use tablebroker_core::{CatalogResponse, InstanceRecord, Parameters};

/// Request to provision a service instance
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Parameters,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionResult {
    /// An identical instance was already provisioned; nothing was done.
    pub already_exists: bool,
    pub is_async: bool,
}

/// Request to deprovision a service instance
#[derive(Debug, Clone)]
pub struct DeprovisionRequest {
    pub instance_id: String,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeprovisionResult {
    pub is_async: bool,
}

/// Request to bind to a service instance
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub instance_id: String,
    pub binding_id: String,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindResult {
    pub credentials: Parameters,
    pub is_async: bool,
}

/// Request to remove a binding
#[derive(Debug, Clone)]
pub struct UnbindRequest {
    pub instance_id: String,
    pub binding_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnbindResult;

/// Request to update a service instance
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: Option<String>,
    pub parameters: Option<Parameters>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub is_async: bool,
}

/// Request to poll the state of an asynchronous operation
#[derive(Debug, Clone)]
pub struct LastOperationRequest {
    pub instance_id: String,
    pub operation: Option<String>,
}
