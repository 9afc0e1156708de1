pub mod catalog;
pub mod connection;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

pub use catalog::{CatalogResponse, Plan, Service};
pub use connection::ConnectionDescriptor;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Invalid connection descriptor: {0}")]
    InvalidConnection(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Caller-supplied provision parameters, kept verbatim.
///
/// `serde_json::Map` compares by key/value content, so two maps built in
/// different insertion orders are equal.
pub type Parameters = serde_json::Map<String, Value>;

pub const PARAM_DB_USERNAME: &str = "dbusername";
pub const PARAM_DB_PASSWORD: &str = "dbpassword";
pub const PARAM_TABLE_NAME: &str = "tablename";
pub const PARAM_TABLE_SCHEMA: &str = "tableschema";
pub const CREDENTIAL_URI: &str = "uri";

/// One provisioned service instance as held by the instance store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Parameters,
    /// Set by the first bind; never part of the idempotency comparison.
    pub connection_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn new(
        instance_id: impl Into<String>,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        parameters: Parameters,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            parameters,
            connection_uri: None,
            created_at: Utc::now(),
        }
    }

    /// Structural equality over the fields fixed at provision time.
    pub fn matches(&self, other: &InstanceRecord) -> bool {
        self.instance_id == other.instance_id
            && self.service_id == other.service_id
            && self.plan_id == other.plan_id
            && self.parameters == other.parameters
    }

    /// Parameters plus the cached connection uri, as handed out on bind.
    pub fn credentials(&self) -> Parameters {
        let mut credentials = self.parameters.clone();
        if let Some(uri) = &self.connection_uri {
            credentials.insert(CREDENTIAL_URI.to_string(), Value::String(uri.clone()));
        }
        credentials
    }
}

/// Typed view over the provision parameters the backend needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionParameters {
    pub db_username: String,
    pub db_password: String,
    pub table_name: String,
    pub table_schema: String,
}

impl ProvisionParameters {
    pub fn from_parameters(parameters: &Parameters) -> Result<Self> {
        let mut missing = Vec::new();
        let mut field = |key: &'static str| match parameters.get(key) {
            Some(Value::String(value)) if !value.is_empty() => value.clone(),
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let params = Self {
            db_username: field(PARAM_DB_USERNAME),
            db_password: field(PARAM_DB_PASSWORD),
            table_name: field(PARAM_TABLE_NAME),
            table_schema: field(PARAM_TABLE_SCHEMA),
        };

        if !missing.is_empty() {
            return Err(CoreError::InvalidParameters(format!(
                "missing or non-string parameters: {}",
                missing.join(", ")
            )));
        }

        Ok(params)
    }
}

/// Account credentials stored with an instance; enough to build its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub username: String,
    pub password: String,
}

impl AccountCredentials {
    pub fn from_parameters(parameters: &Parameters) -> Result<Self> {
        let username = string_param(parameters, PARAM_DB_USERNAME)?;
        let password = string_param(parameters, PARAM_DB_PASSWORD)?;
        Ok(Self { username, password })
    }
}

fn string_param(parameters: &Parameters, key: &str) -> Result<String> {
    match parameters.get(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        _ => Err(CoreError::InvalidParameters(format!(
            "missing or non-string parameter: {key}"
        ))),
    }
}

/// Whether a response may be reported as asynchronous.
///
/// Independent of how the work was actually executed.
pub fn async_response(accepts_incomplete: bool, async_mode: bool) -> bool {
    accepts_incomplete && async_mode
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(status: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}
