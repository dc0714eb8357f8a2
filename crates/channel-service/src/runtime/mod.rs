//! Actor runtime boundary.
//!
//! Channels are layered on an actor-style messaging runtime that provides:
//!
//! - Named endpoints (`add_actor` / `remove_actor`) receiving routed requests
//! - Fire-and-forget delivery (`send`) and request/reply (`request`)
//! - A process-wide "actor removed" notification stream; removal completes
//!   once every listener has handled the notification
//!
//! [`ActorRuntime`] is the seam; [`LocalRuntime`] is the in-process
//! implementation used by the service binary and the tests.
//!
//! # Modules
//!
//! - [`local`] - `LocalRuntime` and its per-address endpoint actors
//! - [`mailbox`] - Mailbox depth and pressure monitoring
//! - [`messages`] - `Request`, `Reply` and `ReplyError`

pub mod local;
pub mod mailbox;
pub mod messages;

pub use local::LocalRuntime;
pub use mailbox::{ActorType, MailboxMonitor};
pub use messages::{ActorRemoved, Reply, ReplyError, Request};

use crate::errors::RuntimeError;
use async_trait::async_trait;
use common::types::Address;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Handler invoked for each request routed to an endpoint.
///
/// Requests to one endpoint are delivered one at a time, in arrival order.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handle a routed request within the endpoint's execution context.
    async fn handle(&self, request: Request, ctx: &Context);
}

/// Capabilities the channel layer consumes from an actor runtime.
#[async_trait]
pub trait ActorRuntime: Send + Sync {
    /// Register a named endpoint.
    async fn add_actor(&self, address: Address, handler: Arc<dyn Handler>)
        -> Result<(), RuntimeError>;

    /// Register several endpoints atomically: either all are registered or none.
    async fn add_actors(&self, actors: Vec<(Address, Arc<dyn Handler>)>) -> Result<(), RuntimeError>;

    /// Deregister an endpoint. Returns whether it was registered.
    ///
    /// Returns after every "actor removed" listener has handled the
    /// notification.
    async fn remove_actor(&self, address: &Address) -> bool;

    /// Deregister several endpoints atomically. Returns how many were registered.
    ///
    /// Same completion guarantee as [`remove_actor`](Self::remove_actor).
    async fn remove_actors(&self, addresses: &[Address]) -> usize;

    /// Fire-and-forget delivery. `Ok` means the runtime accepted the message.
    async fn send(&self, from: Address, to: Address, content: Value) -> Result<(), RuntimeError>;

    /// Deliver a request and wait for the handler's reply.
    async fn request(&self, from: Address, to: Address, content: Value)
        -> Result<Reply, RuntimeError>;

    /// Subscribe to the "actor removed" notification stream.
    ///
    /// A listener acknowledges a notification by dropping it. A receiver
    /// that is held but never read delays removals until the runtime's
    /// acknowledgement timeout.
    fn actor_removed(&self) -> broadcast::Receiver<ActorRemoved>;
}

/// Execution context a handler runs in.
///
/// Messages sent through the context carry the endpoint's own address as
/// sender, so replies from recipients route back to it. The context holds a
/// weak reference: once the runtime is dropped, sends fail with
/// [`RuntimeError::ShutDown`].
#[derive(Clone)]
pub struct Context {
    address: Address,
    runtime: Weak<dyn ActorRuntime>,
}

impl Context {
    pub(crate) fn from_weak(address: Address, runtime: Weak<dyn ActorRuntime>) -> Self {
        Self { address, runtime }
    }

    /// Address of the endpoint this context belongs to.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send `content` to `to` on behalf of this endpoint.
    pub async fn send(&self, to: Address, content: Value) -> Result<(), RuntimeError> {
        let runtime = self.runtime.upgrade().ok_or(RuntimeError::ShutDown)?;
        runtime.send(self.address.clone(), to, content).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("address", &self.address)
            .field("runtime_alive", &(self.runtime.strong_count() > 0))
            .finish()
    }
}
