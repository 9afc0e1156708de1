use crate::{BackendKind, BackendMetadata, ProvisioningBackend};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tablebroker_core::{ConnectionDescriptor, CoreError, Result};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub owner: String,
    pub schema_definition: String,
}

/// Thread-safe backend that keeps accounts and containers in memory.
///
/// Mirrors the failure modes of a real database closely enough for the
/// lifecycle manager: duplicate accounts and tables are rejected, and a
/// table can only be created by an account that exists with the given
/// password.
#[derive(Clone)]
pub struct InMemoryProvisioningBackend {
    accounts: Arc<RwLock<HashMap<String, String>>>,
    containers: Arc<RwLock<HashMap<String, ContainerRecord>>>,
    create_account_calls: Arc<AtomicUsize>,
    create_container_calls: Arc<AtomicUsize>,
    delete_account_calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    latency: Option<Duration>,
    metadata: BackendMetadata,
}

impl InMemoryProvisioningBackend {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            containers: Arc::new(RwLock::new(HashMap::new())),
            create_account_calls: Arc::new(AtomicUsize::new(0)),
            create_container_calls: Arc::new(AtomicUsize::new(0)),
            delete_account_calls: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
            latency: None,
            metadata: BackendMetadata {
                backend_id: "in-memory".to_string(),
                kind: BackendKind::InMemory,
                version: "0.1.0".to_string(),
            },
        }
    }

    /// Delay every call by `latency`, bounded by the call's deadline.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn has_account(&self, username: &str) -> Result<bool> {
        let accounts = self.accounts.read().map_err(|_| lock_poisoned())?;
        Ok(accounts.contains_key(username))
    }

    pub fn account_count(&self) -> Result<usize> {
        let accounts = self.accounts.read().map_err(|_| lock_poisoned())?;
        Ok(accounts.len())
    }

    pub fn container(&self, name: &str) -> Result<Option<ContainerRecord>> {
        let containers = self.containers.read().map_err(|_| lock_poisoned())?;
        Ok(containers.get(name).cloned())
    }

    pub fn create_account_calls(&self) -> usize {
        self.create_account_calls.load(Ordering::SeqCst)
    }

    pub fn create_container_calls(&self) -> usize {
        self.create_container_calls.load(Ordering::SeqCst)
    }

    pub fn delete_account_calls(&self) -> usize {
        self.delete_account_calls.load(Ordering::SeqCst)
    }

    async fn simulate_round_trip(&self, deadline: Instant) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::timeout_at(deadline, tokio::time::sleep(latency))
                .await
                .map_err(|_| CoreError::Timeout("in-memory backend deadline exceeded".to_string()))?;
        } else if Instant::now() >= deadline {
            return Err(CoreError::Timeout(
                "in-memory backend deadline exceeded".to_string(),
            ));
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Backend("backend unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryProvisioningBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned() -> CoreError {
    CoreError::Backend("Storage lock poisoned".to_string())
}

#[async_trait]
impl ProvisioningBackend for InMemoryProvisioningBackend {
    async fn create_account(
        &self,
        username: &str,
        password: &str,
        _admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()> {
        self.create_account_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip(deadline).await?;

        let mut accounts = self.accounts.write().map_err(|_| lock_poisoned())?;
        if accounts.contains_key(username) {
            return Err(CoreError::Backend(format!(
                "account '{username}' already exists"
            )));
        }
        accounts.insert(username.to_string(), password.to_string());
        debug!(%username, "Created account");
        Ok(())
    }

    async fn create_container(
        &self,
        connection: &ConnectionDescriptor,
        container_name: &str,
        schema_definition: &str,
        deadline: Instant,
    ) -> Result<()> {
        self.create_container_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip(deadline).await?;

        {
            let accounts = self.accounts.read().map_err(|_| lock_poisoned())?;
            match accounts.get(&connection.username) {
                Some(password) if *password == connection.password => {}
                _ => {
                    return Err(CoreError::Backend(format!(
                        "authentication failed for '{}'",
                        connection.username
                    )))
                }
            }
        }

        let mut containers = self.containers.write().map_err(|_| lock_poisoned())?;
        if containers.contains_key(container_name) {
            return Err(CoreError::Backend(format!(
                "table '{container_name}' already exists"
            )));
        }
        containers.insert(
            container_name.to_string(),
            ContainerRecord {
                owner: connection.username.clone(),
                schema_definition: schema_definition.to_string(),
            },
        );
        debug!(owner = %connection.username, table = %container_name, "Created table");
        Ok(())
    }

    async fn delete_account(
        &self,
        username: &str,
        _admin: &ConnectionDescriptor,
        deadline: Instant,
    ) -> Result<()> {
        self.delete_account_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip(deadline).await?;

        let mut accounts = self.accounts.write().map_err(|_| lock_poisoned())?;
        if accounts.remove(username).is_none() {
            return Err(CoreError::Backend(format!(
                "account '{username}' does not exist"
            )));
        }
        drop(accounts);

        // cascade: drop everything the account owned
        let mut containers = self.containers.write().map_err(|_| lock_poisoned())?;
        containers.retain(|_, container| container.owner != username);
        debug!(%username, "Deleted account");
        Ok(())
    }

    fn metadata(&self) -> BackendMetadata {
        self.metadata.clone()
    }
}
