//! Connection Pool (C3) — owns physical instrument connections; lends
//! scoped, exclusive handles.
//!
//! Grounded on the teacher's `RwLock<HashMap<..>>`-guarded device map in
//! `hardware::registry::DeviceRegistry`, generalised here to a
//! lease-per-id pool with idle eviction instead of a static device table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::driver::Driver;
use crate::drivers::generic::GenericDriver;
use crate::error::{PdError, PdResult};
use crate::registry::InstrumentRegistry;

struct Entry {
    driver: Arc<Mutex<Box<dyn Driver>>>,
    last_used: Instant,
}

/// Process-wide pool keyed by instrument id. `acquire` returns a lease
/// guaranteed exclusive for that id (invariant 3); `release` happens when
/// the lease (an `OwnedMutexGuard`) is dropped.
pub struct ConnectionPool {
    registry: Arc<InstrumentRegistry>,
    entries: RwLock<HashMap<String, Entry>>,
    idle_timeout: Duration,
}

/// A scoped, exclusive acquisition of an instrument connection. Release
/// is guaranteed on every exit path because it is tied to `Drop` of the
/// inner guard (success, failure, and cancellation of the holding task
/// all release the same way).
pub struct InstrumentLease {
    guard: OwnedMutexGuard<Box<dyn Driver>>,
}

impl InstrumentLease {
    pub fn driver(&self) -> &dyn Driver {
        &**self.guard
    }
}

impl ConnectionPool {
    pub fn new(registry: Arc<InstrumentRegistry>) -> Self {
        ConnectionPool {
            registry,
            entries: RwLock::new(HashMap::new()),
            idle_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Acquire an exclusive lease for `id`, constructing and initialising
    /// the connection lazily on first request. If construction fails, no
    /// lease is created and the pool's key is not poisoned — the next
    /// attempt retries from scratch.
    pub async fn acquire(&self, id: &str) -> PdResult<InstrumentLease> {
        self.evict_idle().await;

        let mutex = {
            let entries = self.entries.read().await;
            entries.get(id).map(|e| e.driver.clone())
        };

        let mutex = match mutex {
            Some(m) => m,
            None => {
                let config = self.registry.get_config(id)?;
                let driver: Box<dyn Driver> = Box::new(GenericDriver::new(config.connection.clone()));
                driver
                    .initialize()
                    .await
                    .map_err(|e| PdError::ConnectionFailed(id.to_string(), e.to_string()))?;
                let mutex = Arc::new(Mutex::new(driver));
                let mut entries = self.entries.write().await;
                // Another task may have raced us to construction; prefer
                // whichever entry is already there to avoid leaking a
                // connection that was never leased out.
                let entry = entries.entry(id.to_string()).or_insert_with(|| Entry {
                    driver: mutex.clone(),
                    last_used: Instant::now(),
                });
                entry.driver.clone()
            }
        };

        let guard = mutex.lock_owned().await;
        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(id) {
                entry.last_used = Instant::now();
            }
        }
        Ok(InstrumentLease { guard })
    }

    async fn evict_idle(&self) {
        let mut entries = self.entries.write().await;
        let idle_timeout = self.idle_timeout;
        let mut to_remove = Vec::new();
        for (id, entry) in entries.iter() {
            if entry.last_used.elapsed() > idle_timeout && entry.driver.try_lock().is_ok() {
                to_remove.push(id.clone());
            }
        }
        for id in to_remove {
            if let Some(entry) = entries.remove(&id) {
                if let Ok(driver) = entry.driver.try_lock() {
                    let _ = driver.close().await;
                }
                tracing::info!(instrument_id = %id, "evicted idle connection");
            }
        }
    }
}
