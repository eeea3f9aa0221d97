//! Per-name exclusive write locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive locks keyed by (backend scope, raster name).
///
/// A writer holds its lock across the whole multi-step write protocol.
/// The guard releases on every exit path, including errors and
/// cancellation, so an aborted write never wedges a name.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `name` within `scope`, waiting for any
    /// current holder to finish.
    pub async fn acquire(&self, scope: &str, name: &str) -> OwnedMutexGuard<()> {
        let key = format!("{}::{}", scope, name);
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}
