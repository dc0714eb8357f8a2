//! Default in-memory membership backend.
//!
//! Subscribers are kept in insertion order. Uniqueness is enforced by a
//! linear scan on insert. Every operation completes without suspending; the
//! lock is never held across an await.

use super::MembershipBackend;
use crate::errors::BackendError;
use async_trait::async_trait;
use common::types::Address;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered, duplicate-free subscriber list held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    subscribers: Mutex<Vec<Address>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Address>> {
        // A panic mid-mutation cannot leave the Vec structurally invalid
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MembershipBackend for InMemoryBackend {
    async fn subscribers(&self) -> Vec<Address> {
        self.lock().clone()
    }

    async fn on_subscribe(&self, address: &Address) -> Result<(), BackendError> {
        let mut subscribers = self.lock();
        if !subscribers.contains(address) {
            subscribers.push(address.clone());
        }
        Ok(())
    }

    async fn on_unsubscribe(&self, address: &Address) -> Result<(), BackendError> {
        self.lock().retain(|existing| existing != address);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    #[tokio::test]
    async fn test_subscribe_preserves_insertion_order() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("bob")).await.unwrap();
        backend.on_subscribe(&addr("alice")).await.unwrap();
        backend.on_subscribe(&addr("carol")).await.unwrap();

        assert_eq!(
            backend.subscribers().await,
            vec![addr("bob"), addr("alice"), addr("carol")]
        );
    }

    #[tokio::test]
    async fn test_subscribe_twice_keeps_single_entry() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("alice")).await.unwrap();
        backend.on_subscribe(&addr("bob")).await.unwrap();
        backend.on_subscribe(&addr("alice")).await.unwrap();

        assert_eq!(backend.subscribers().await, vec![addr("alice"), addr("bob")]);
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_absent_address_is_noop() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("alice")).await.unwrap();

        assert!(backend.on_unsubscribe(&addr("mallory")).await.is_ok());
        assert_eq!(backend.subscribers().await, vec![addr("alice")]);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_address() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("alice")).await.unwrap();
        backend.on_subscribe(&addr("bob")).await.unwrap();

        backend.on_unsubscribe(&addr("alice")).await.unwrap();
        assert_eq!(backend.subscribers().await, vec![addr("bob")]);

        backend.on_unsubscribe(&addr("bob")).await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe_appends() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("alice")).await.unwrap();
        backend.on_subscribe(&addr("bob")).await.unwrap();
        backend.on_unsubscribe(&addr("alice")).await.unwrap();
        backend.on_subscribe(&addr("alice")).await.unwrap();

        assert_eq!(backend.subscribers().await, vec![addr("bob"), addr("alice")]);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_backend() {
        let backend = InMemoryBackend::new();
        backend.on_subscribe(&addr("alice")).await.unwrap();

        let snapshot = backend.subscribers().await;
        backend.on_subscribe(&addr("bob")).await.unwrap();

        assert_eq!(snapshot, vec![addr("alice")]);
    }
}
