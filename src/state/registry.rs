//! Per-key case registry
//!
//! Each `(user, chat)` key owns a slot guarded by an async mutex. Every
//! mutation of a case, including timer-driven ones, happens while holding the
//! slot's guard, so events for the same key are processed one at a time while
//! different keys proceed in parallel.

use std::sync::Arc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use crate::models::CaseKey;

type Slot<C> = Arc<Mutex<Option<C>>>;

/// Registry of short-lived moderation cases of one kind
pub struct CaseRegistry<C> {
    name: &'static str,
    slots: DashMap<CaseKey, Slot<C>>,
}

impl<C: Clone + Send + 'static> CaseRegistry<C> {
    /// Create an empty registry; `name` tags trace output
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: DashMap::new(),
        }
    }

    /// Acquire exclusive access to the slot of `key`, creating it if needed
    pub async fn lock(&self, key: CaseKey) -> CaseGuard<'_, C> {
        // The shard guard must be released before awaiting the slot
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let guard = slot.lock_owned().await;
        trace!(registry = self.name, user_id = key.user_id.0, chat_id = key.chat_id.0, "Case slot locked");

        CaseGuard {
            registry: self,
            key,
            guard,
        }
    }

    /// Snapshot of the case for `key`, if one exists
    pub async fn find(&self, key: CaseKey) -> Option<C> {
        let slot = self.slots.get(&key).map(|entry| entry.value().clone())?;
        let case = (*slot.lock().await).clone();
        if case.is_none() {
            // A guard emptied this slot while we were waiting and could not drop it
            drop(slot);
            self.release_idle(&key);
        }
        case
    }

    /// Whether a case exists for `key`
    pub async fn contains(&self, key: CaseKey) -> bool {
        self.find(key).await.is_some()
    }

    /// Number of allocated slots, including ones currently being resolved
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop the slot of an emptied case unless another task still holds a
    /// handle to it. Called with the slot locked, so the map and the dropping
    /// guard are the only two owners when nobody is waiting.
    fn release(&self, key: &CaseKey) {
        let removed = self
            .slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 2);
        if removed.is_some() {
            trace!(registry = self.name, user_id = key.user_id.0, chat_id = key.chat_id.0, "Empty case slot dropped");
        }
    }

    /// Drop the slot of `key` if it is empty, unlocked and held by the map alone
    fn release_idle(&self, key: &CaseKey) {
        let removed = self.slots.remove_if(key, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().map(|case| case.is_none()).unwrap_or(false)
        });
        if removed.is_some() {
            trace!(registry = self.name, user_id = key.user_id.0, chat_id = key.chat_id.0, "Idle case slot dropped");
        }
    }
}

/// Exclusive access to one case slot for the duration of a processing step
pub struct CaseGuard<'a, C: Clone + Send + 'static> {
    registry: &'a CaseRegistry<C>,
    key: CaseKey,
    guard: OwnedMutexGuard<Option<C>>,
}

impl<'a, C: Clone + Send + 'static> CaseGuard<'a, C> {
    pub fn key(&self) -> CaseKey {
        self.key
    }

    /// The guarded case, if any
    pub fn find(&mut self) -> Option<&mut C> {
        (*self.guard).as_mut()
    }

    /// Store `case`, replacing whatever was there
    pub fn create(&mut self, case: C) -> &mut C {
        self.guard.insert(case)
    }

    /// Existing case, or a freshly created one
    pub fn find_or_create_with(&mut self, make: impl FnOnce() -> C) -> &mut C {
        self.guard.get_or_insert_with(make)
    }

    /// Take the case out of the registry
    pub fn remove(&mut self) -> Option<C> {
        self.guard.take()
    }
}

impl<'a, C: Clone + Send + 'static> Drop for CaseGuard<'a, C> {
    fn drop(&mut self) {
        if self.guard.is_none() {
            self.registry.release(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{ChatId, UserId};

    fn key(user: u64) -> CaseKey {
        CaseKey::new(UserId(user), ChatId(-100))
    }

    #[tokio::test]
    async fn test_create_find_remove() {
        let registry: CaseRegistry<u32> = CaseRegistry::new("test");

        assert_eq!(registry.find(key(1)).await, None);
        {
            let mut guard = registry.lock(key(1)).await;
            assert!(guard.find().is_none());
            guard.create(7);
        }
        assert_eq!(registry.find(key(1)).await, Some(7));
        assert_eq!(registry.find(key(2)).await, None);

        {
            let mut guard = registry.lock(key(1)).await;
            assert_eq!(guard.remove(), Some(7));
        }
        assert_eq!(registry.find(key(1)).await, None);
        assert_eq!(registry.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_lock_leaves_no_slot() {
        let registry: CaseRegistry<u32> = CaseRegistry::new("test");
        {
            let _guard = registry.lock(key(3)).await;
        }
        assert_eq!(registry.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_lookup_waiting_on_an_emptied_slot_drops_it() {
        let registry: Arc<CaseRegistry<u32>> = Arc::new(CaseRegistry::new("test"));
        let guard = registry.lock(key(4)).await;

        let lookup = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.find(key(4)).await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        drop(guard);

        assert_eq!(lookup.await.unwrap(), None);
        assert_eq!(registry.slot_count(), 0);
    }

    #[tokio::test]
    async fn test_lookup_keeps_a_live_case() {
        let registry: CaseRegistry<u32> = CaseRegistry::new("test");
        registry.lock(key(5)).await.create(3);

        assert_eq!(registry.find(key(5)).await, Some(3));
        assert_eq!(registry.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_mutations_are_serialized_per_key() {
        let registry: Arc<CaseRegistry<u32>> = Arc::new(CaseRegistry::new("test"));
        registry.lock(key(1)).await.create(0);

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let mut guard = registry.lock(key(1)).await;
                let value = *guard.find().unwrap();
                tokio::task::yield_now().await;
                *guard.find().unwrap() = value + 1;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.find(key(1)).await, Some(50));
    }
}
