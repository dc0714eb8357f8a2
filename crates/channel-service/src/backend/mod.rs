//! Membership backends.
//!
//! A [`MembershipBackend`] tracks which addresses are subscribed to one
//! channel. Any implementation must uphold:
//!
//! - After `on_subscribe(a)` succeeds, with no later `on_unsubscribe(a)`,
//!   `a` appears exactly once in `subscribers()`, however many times it
//!   subscribed.
//! - After `on_unsubscribe(a)` completes, `a` is absent from `subscribers()`.
//! - Both operations are idempotent: re-subscribing or unsubscribing an
//!   absent address succeeds without change.
//!
//! Operations may suspend for as long as the backend needs; callers never
//! impose a timeout.

pub mod memory;

pub use memory::InMemoryBackend;

use crate::errors::BackendError;
use async_trait::async_trait;
use common::types::Address;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Subscriber membership store for a single channel.
#[async_trait]
pub trait MembershipBackend: Send + Sync {
    /// Snapshot of the current subscribers, in the backend's order.
    ///
    /// Reflects every add/remove completed before the call.
    async fn subscribers(&self) -> Vec<Address>;

    /// Register `address` as a subscriber.
    ///
    /// # Errors
    ///
    /// Backend-specific refusal (capacity, policy, storage).
    async fn on_subscribe(&self, address: &Address) -> Result<(), BackendError>;

    /// Remove every occurrence of `address`.
    ///
    /// # Errors
    ///
    /// Backend-specific failure (storage).
    async fn on_unsubscribe(&self, address: &Address) -> Result<(), BackendError>;
}

/// Backends that can be selected by name in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// [`InMemoryBackend`].
    #[default]
    InMemory,
}

/// Unknown backend name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackend(pub String);

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown membership backend '{}'", self.0)
    }
}

impl std::error::Error for UnknownBackend {}

impl BackendKind {
    /// Configuration name of this backend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InMemory => "memory",
        }
    }

    /// Parse a backend name, substituting the in-memory backend for unknown
    /// names. Never fails.
    #[must_use]
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: UnknownBackend| {
            warn!(
                target: "channel.backend",
                requested = %e.0,
                "Invalid membership backend requested; using default implementation (in memory)"
            );
            BackendKind::InMemory
        })
    }

    /// Build a fresh backend instance of this kind.
    #[must_use]
    pub fn build(&self) -> Arc<dyn MembershipBackend> {
        match self {
            BackendKind::InMemory => Arc::new(InMemoryBackend::new()),
        }
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(BackendKind::InMemory),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Pick the backend a new channel is bound to.
///
/// A provided candidate is used as-is; otherwise a fresh backend of
/// `default_kind` is built.
#[must_use]
pub fn resolve_backend(
    candidate: Option<Arc<dyn MembershipBackend>>,
    default_kind: BackendKind,
) -> Arc<dyn MembershipBackend> {
    match candidate {
        Some(backend) => backend,
        None => {
            debug!(
                target: "channel.backend",
                backend = default_kind.as_str(),
                "No membership backend provided; using default"
            );
            default_kind.build()
        }
    }
}
