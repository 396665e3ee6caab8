//! Versioned config cell with change notification.
//!
//! `ConfigStore<T>` wraps `Arc<RwLock<T>>`; every `update` bumps a version
//! published on a `watch` channel, so processors can `select!` on
//! [`ConfigWatcher::changed`] instead of polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, RwLockReadGuard, watch};

/// A shared, versioned configuration value.
pub struct ConfigStore<T> {
    inner: Arc<ConfigStoreInner<T>>,
}

struct ConfigStoreInner<T> {
    data: RwLock<T>,
    version: AtomicU64,
    version_tx: watch::Sender<u64>,
}

/// Notified when a [`ConfigStore`] is updated.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(ConfigStoreInner {
                data: RwLock::new(initial),
                version: AtomicU64::new(0),
                version_tx,
            }),
        }
    }

    /// Replace the stored value and notify all watchers.
    pub async fn update(&self, value: T) {
        let mut guard = self.inner.data.write().await;
        *guard = value;
        let new_version = self.inner.version.fetch_add(1, Ordering::Relaxed) + 1;
        // Release the write lock before notifying so watchers can read at once.
        drop(guard);
        let _ = self.inner.version_tx.send(new_version);
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.data.read().await
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T: Clone> ConfigStore<T> {
    /// Clone of the current value.
    pub async fn snapshot(&self) -> T {
        self.inner.data.read().await.clone()
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConfigWatcher {
    /// Wait for the next update. Errors once the store is dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_update_notifies_watcher() {
        let store = ConfigStore::new(1u32);
        let mut watcher = store.subscribe();

        store.update(2).await;
        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.snapshot().await, 2);
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn test_watcher_errors_after_store_dropped() {
        let store = ConfigStore::new(());
        let mut watcher = store.subscribe();
        drop(store);
        assert!(watcher.changed().await.is_err());
    }
}
