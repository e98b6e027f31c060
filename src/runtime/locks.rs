//! Per-key async mutual exclusion

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_AT: usize = 1024;

/// One async mutex per key, created on demand. The map only holds weak
/// references, so a key's mutex is freed once nobody holds or awaits it.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    if map.len() >= PRUNE_AT {
                        map.retain(|_, weak| weak.strong_count() > 0);
                    }
                    let created = Arc::new(AsyncMutex::new(()));
                    map.insert(key.to_string(), Arc::downgrade(&created));
                    created
                }
            }
        };
        mutex.lock_owned().await
    }

    /// Keys whose mutex is still alive
    pub fn live_keys(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
