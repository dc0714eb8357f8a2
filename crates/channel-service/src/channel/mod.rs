//! Named publish/subscribe channels.
//!
//! A [`Channel`] owns one membership backend and is reachable at three
//! runtime addresses (see [`endpoint`]). Publishing raises a local
//! [`PublishedMessage`] event, then forwards the content to every subscriber
//! in the backend's order. Subscribers removed from the runtime are purged by
//! the [`lifecycle`] hook until the channel is disposed.
//!
//! Channels are created and registered through
//! [`ChannelRegistryHandle`](crate::registry::ChannelRegistryHandle).

pub mod endpoint;
mod lifecycle;

pub use endpoint::EndpointKind;

use crate::backend::MembershipBackend;
use crate::runtime::{ActorRuntime, Handler};

use chrono::{DateTime, Utc};
use common::types::{Address, ChannelId};
use endpoint::Endpoint;
use lifecycle::LifecycleHook;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Event raised locally for every publish, before fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedMessage {
    /// Channel the message was published to.
    pub channel: ChannelId,
    /// Original sender.
    pub from: Address,
    /// Published content.
    pub content: Value,
}

/// Point-in-time description of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub subscriber_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Shared channel state, referenced by the handle and its endpoint handlers.
pub(crate) struct ChannelInner {
    pub(crate) id: ChannelId,
    pub(crate) backend: Arc<dyn MembershipBackend>,
    pub(crate) published_tx: broadcast::Sender<PublishedMessage>,
    cancel_token: CancellationToken,
    hook_handle: Mutex<Option<JoinHandle<()>>>,
    created_at: DateTime<Utc>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        // Unreachable channel: stop purging on its behalf
        self.cancel_token.cancel();
    }
}

/// Handle to a channel. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel bound to `backend` and attach its lifecycle hook.
    ///
    /// The endpoints are not registered; see [`Channel::endpoints`].
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(
        id: ChannelId,
        backend: Arc<dyn MembershipBackend>,
        runtime: &Arc<dyn ActorRuntime>,
        event_capacity: usize,
    ) -> Self {
        let (published_tx, _) = broadcast::channel(event_capacity.max(1));
        let cancel_token = CancellationToken::new();

        let hook_handle = LifecycleHook::spawn(
            id.clone(),
            Arc::clone(&backend),
            runtime.actor_removed(),
            cancel_token.clone(),
        );

        Self {
            inner: Arc::new(ChannelInner {
                id,
                backend,
                published_tx,
                cancel_token,
                hook_handle: Mutex::new(Some(hook_handle)),
                created_at: Utc::now(),
            }),
        }
    }

    /// Channel identifier.
    #[must_use]
    pub fn id(&self) -> &ChannelId {
        &self.inner.id
    }

    /// The publish, subscribe and unsubscribe addresses.
    #[must_use]
    pub fn endpoint_addresses(&self) -> [Address; 3] {
        self.inner.id.endpoint_addresses()
    }

    /// Handlers for the three endpoints, paired with their addresses, ready
    /// for an atomic `add_actors`.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(Address, Arc<dyn Handler>)> {
        EndpointKind::ALL
            .into_iter()
            .map(|kind| {
                let address = match kind {
                    EndpointKind::Publish => self.inner.id.publish_address(),
                    EndpointKind::Subscribe => self.inner.id.subscribe_address(),
                    EndpointKind::Unsubscribe => self.inner.id.unsubscribe_address(),
                };
                let handler: Arc<dyn Handler> =
                    Arc::new(Endpoint::new(kind, Arc::clone(&self.inner)));
                (address, handler)
            })
            .collect()
    }

    /// Observe published messages. Dropping the receiver unregisters.
    ///
    /// Each receiver buffers up to the channel's event capacity. A receiver
    /// that falls further behind loses the oldest events and its next `recv`
    /// returns `RecvError::Lagged` with the number skipped. Fan-out to
    /// subscribers is unaffected.
    #[must_use]
    pub fn on_published(&self) -> broadcast::Receiver<PublishedMessage> {
        self.inner.published_tx.subscribe()
    }

    /// Current subscribers, in fan-out order.
    pub async fn subscribers(&self) -> Vec<Address> {
        self.inner.backend.subscribers().await
    }

    /// Snapshot of the channel's state.
    pub async fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.inner.id.clone(),
            subscriber_count: self.inner.backend.subscribers().await.len(),
            created_at: self.inner.created_at,
        }
    }

    /// Detach the lifecycle hook. Idempotent.
    ///
    /// Endpoint registration is owned by the registry and is not touched.
    pub fn dispose(&self) {
        self.inner.cancel_token.cancel();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }

    /// Take the lifecycle hook's join handle, for awaiting its exit after
    /// disposal. Returns `None` on subsequent calls.
    pub(crate) fn take_hook_handle(&self) -> Option<JoinHandle<()>> {
        self.inner
            .hook_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
