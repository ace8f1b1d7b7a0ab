//! Per-key async locks.
//!
//! Serialises fetch/build work for the same place within a process, so
//! concurrent selections of one place perform at most one upstream fetch
//! and at most one index build.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::models::PlaceId;

#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<PlaceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &PlaceId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop slots nobody holds or waits on.
            slots.retain(|_, m| Arc::strong_count(m) > 1);
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let key = PlaceId::new("p1").unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let a = PlaceId::new("a").unwrap();
        let b = PlaceId::new("b").unwrap();
        let _ga = locks.lock(&a).await;
        let gb = tokio::time::timeout(Duration::from_millis(100), locks.lock(&b)).await;
        assert!(gb.is_ok());
    }
}
