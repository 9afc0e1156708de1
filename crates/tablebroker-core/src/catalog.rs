//! Catalog types advertised on `GET /v2/catalog`.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_SERVICE_ID: &str = "4f6e6cf6-ffdd-425f-a2c7-3c9258ad246a";
pub const DEFAULT_PLAN_ID: &str = "86064792-7ea2-467b-af93-ac9694d96d5b";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub id: String,
    pub description: String,
    pub bindable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_updateable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Schemas>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schemas {
    pub service_instance: ServiceInstanceSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<InputParametersSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<InputParametersSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParametersSchema {
    pub parameters: Value,
}

impl CatalogResponse {
    /// The single table-provisioning service offered out of the box.
    pub fn builtin() -> Self {
        Self {
            services: vec![Service {
                name: "create-db-table".to_string(),
                id: DEFAULT_SERVICE_ID.to_string(),
                description: "Create a database user and table with the specified schema"
                    .to_string(),
                bindable: true,
                plan_updateable: Some(true),
                metadata: Some(json!({
                    "displayName": "Create DB Table",
                    "imageUrl": "https://avatars2.githubusercontent.com/u/19862012?s=200&v=4"
                })),
                plans: vec![Plan {
                    name: "default".to_string(),
                    id: DEFAULT_PLAN_ID.to_string(),
                    description: "The default plan".to_string(),
                    free: Some(true),
                    schemas: Some(Schemas {
                        service_instance: ServiceInstanceSchema {
                            create: Some(InputParametersSchema {
                                parameters: provision_parameters_schema(),
                            }),
                            update: None,
                        },
                    }),
                }],
            }],
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(raw)
            .map_err(|e| CoreError::SerializationError(format!("invalid catalog: {e}")))?;
        if catalog.services.is_empty() {
            return Err(CoreError::SerializationError(
                "catalog must offer at least one service".to_string(),
            ));
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::SerializationError(format!(
                "failed to read catalog {}: {e}",
                path.display()
            ))
        })?;
        let catalog = Self::from_json(&raw)?;
        debug!(path = %path.display(), services = catalog.services.len(), "Loaded catalog");
        Ok(catalog)
    }
}

fn provision_parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dbusername": {
                "type": "string",
                "description": "DB User to create"
            },
            "dbpassword": {
                "type": "string",
                "description": "DB Password"
            },
            "tablename": {
                "type": "string",
                "description": "Table Name"
            },
            "tableschema": {
                "type": "string",
                "description": "Table Schema as SQL Statement"
            }
        },
        "required": ["dbusername", "dbpassword", "tablename", "tableschema"]
    })
}
