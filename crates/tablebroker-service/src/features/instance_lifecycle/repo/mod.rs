pub mod locks;

use crate::shared::error::{BrokerError, BrokerResult};
use crate::shared::types::InstanceRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Repository trait for instance record storage
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Store a new record; fails if the id is already taken
    async fn create(&self, record: InstanceRecord) -> BrokerResult<()>;

    /// Retrieve a record by ID
    async fn get(&self, instance_id: &str) -> BrokerResult<Option<InstanceRecord>>;

    /// Cache the derived connection uri on a record
    async fn set_connection_uri(&self, instance_id: &str, uri: String) -> BrokerResult<()>;

    /// Delete a record
    async fn delete(&self, instance_id: &str) -> BrokerResult<bool>;

    /// Number of stored records
    async fn count(&self) -> BrokerResult<usize>;
}

/// In-memory implementation of instance repository
#[derive(Clone)]
pub struct InMemoryInstanceRepository {
    storage: Arc<RwLock<HashMap<String, InstanceRecord>>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned() -> BrokerError {
    BrokerError::StorageError("Lock poisoned".to_string())
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn create(&self, record: InstanceRecord) -> BrokerResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        if storage.contains_key(&record.instance_id) {
            return Err(BrokerError::Conflict(format!(
                "instance {} already exists",
                record.instance_id
            )));
        }
        storage.insert(record.instance_id.clone(), record);
        Ok(())
    }

    async fn get(&self, instance_id: &str) -> BrokerResult<Option<InstanceRecord>> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.get(instance_id).cloned())
    }

    async fn set_connection_uri(&self, instance_id: &str, uri: String) -> BrokerResult<()> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;

        if let Some(record) = storage.get_mut(instance_id) {
            record.connection_uri = Some(uri);
            Ok(())
        } else {
            Err(BrokerError::NotFound(instance_id.to_string()))
        }
    }

    async fn delete(&self, instance_id: &str) -> BrokerResult<bool> {
        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        Ok(storage.remove(instance_id).is_some())
    }

    async fn count(&self) -> BrokerResult<usize> {
        let storage = self.storage.read().map_err(|_| lock_poisoned())?;
        Ok(storage.len())
    }
}
