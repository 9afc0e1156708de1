use crate::shared::error::{BrokerError, BrokerResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Arena of per-instance locks.
///
/// A lock is created the first time an id is acquired and dropped from the
/// arena once no caller holds or waits on it.
#[derive(Clone, Default)]
pub struct InstanceLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `instance_id`.
    pub async fn acquire(&self, instance_id: &str) -> BrokerResult<InstanceLockGuard> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| BrokerError::StorageError("Lock arena poisoned".to_string()))?;
            locks
                .entry(instance_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        Ok(InstanceLockGuard {
            instance_id: instance_id.to_string(),
            guard: Some(guard),
            locks: self.locks.clone(),
        })
    }

    /// Number of ids currently tracked by the arena.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

pub struct InstanceLockGuard {
    instance_id: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl InstanceLockGuard {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Drop for InstanceLockGuard {
    fn drop(&mut self) {
        // Release first so the strong count only reflects the arena and waiters.
        drop(self.guard.take());

        if let Ok(mut locks) = self.locks.lock() {
            let idle = locks
                .get(&self.instance_id)
                .map(|lock| Arc::strong_count(lock) == 1)
                .unwrap_or(false);
            if idle {
                locks.remove(&self.instance_id);
            }
        }
    }
}
