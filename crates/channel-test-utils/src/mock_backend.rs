//! Mock membership backends.
//!
//! - [`FailingBackend`] refuses every membership change with a fixed error
//! - [`GatedBackend`] holds each membership change until the test releases it
//!
//! # Example
//!
//! ```rust,ignore
//! use channel_test_utils::GatedBackend;
//!
//! let backend = GatedBackend::new();
//! // ... issue a subscribe request in a spawned task ...
//! backend.wait_for_pending(1).await;
//! backend.release(1);
//! ```

use async_trait::async_trait;
use channel_service::{BackendError, InMemoryBackend, MembershipBackend};
use common::types::Address;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Backend that refuses every subscription with a fixed error.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    error: BackendError,
    fail_unsubscribe: bool,
    attempts: Arc<Mutex<Vec<Address>>>,
}

impl FailingBackend {
    /// Fail subscriptions with `error`; unsubscriptions succeed.
    #[must_use]
    pub fn new(error: BackendError) -> Self {
        Self {
            error,
            fail_unsubscribe: false,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail with `BackendError::CapacityExceeded`.
    #[must_use]
    pub fn at_capacity() -> Self {
        Self::new(BackendError::CapacityExceeded("max 0".to_string()))
    }

    /// Also fail unsubscriptions.
    #[must_use]
    pub fn failing_unsubscribe(mut self) -> Self {
        self.fail_unsubscribe = true;
        self
    }

    /// Addresses that attempted a membership change, in order.
    pub fn attempts(&self) -> Vec<Address> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MembershipBackend for FailingBackend {
    async fn subscribers(&self) -> Vec<Address> {
        Vec::new()
    }

    async fn on_subscribe(&self, address: &Address) -> Result<(), BackendError> {
        self.attempts.lock().unwrap().push(address.clone());
        Err(self.error.clone())
    }

    async fn on_unsubscribe(&self, address: &Address) -> Result<(), BackendError> {
        self.attempts.lock().unwrap().push(address.clone());
        if self.fail_unsubscribe {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

/// Backend whose membership changes complete only when the test allows it.
///
/// Each `on_subscribe`/`on_unsubscribe` waits for one permit, then applies
/// the change to an inner [`InMemoryBackend`]. `subscribers()` is never
/// gated.
#[derive(Debug, Clone)]
pub struct GatedBackend {
    inner: Arc<InMemoryBackend>,
    gate: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
}

impl Default for GatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedBackend {
    /// Create a closed gate with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryBackend::new()),
            gate: Arc::new(Semaphore::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let `n` waiting (or future) membership changes complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Membership changes currently held at the gate.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` membership changes are held at the gate.
    ///
    /// Panics after one second.
    pub async fn wait_for_pending(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while self.pending() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("membership changes never reached the gate");
    }

    async fn pass(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.unwrap().forget();
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MembershipBackend for GatedBackend {
    async fn subscribers(&self) -> Vec<Address> {
        self.inner.subscribers().await
    }

    async fn on_subscribe(&self, address: &Address) -> Result<(), BackendError> {
        self.pass().await;
        self.inner.on_subscribe(address).await
    }

    async fn on_unsubscribe(&self, address: &Address) -> Result<(), BackendError> {
        self.pass().await;
        self.inner.on_unsubscribe(address).await
    }
}
