use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry<K> = Arc<StdMutex<HashMap<K, Arc<Mutex<()>>>>>;

/// One async mutex per key, created on demand and dropped once unused.
pub struct KeyedLocks<K> {
    registry: Registry<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            registry: Arc::new(StdMutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: K) -> KeyedGuard<K> {
        let lock = {
            let mut map = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        KeyedGuard {
            key,
            guard: Some(guard),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct KeyedGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry<K>,
}

impl<K> Drop for KeyedGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // release first so the count below only sees the registry and waiters
        self.guard.take();
        let mut map = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.active_keys(), 2);
        }
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(StdMutex::new(Vec::new()));

        let first = locks.acquire(1u32).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let _guard = locks.acquire(1u32).await;
                counter.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        counter.lock().unwrap().push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*counter.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(locks.active_keys(), 0);
    }
}
