//! Recording actors.
//!
//! A [`RecordingActor`] stands in for a subscriber: it accepts every
//! request routed to its address and forwards it to an [`Inbox`] the test
//! reads from.

use async_trait::async_trait;
use channel_service::{ActorRuntime, Context, Handler, Request};
use common::types::Address;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long [`Inbox::recv`] waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// A request observed by a [`RecordingActor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    /// Sender address.
    pub from: Address,
    /// Message content.
    pub content: Value,
}

/// Handler forwarding every request to an [`Inbox`].
pub struct RecordingActor {
    tx: mpsc::UnboundedSender<Received>,
}

impl RecordingActor {
    /// Create a recorder and the inbox it feeds.
    #[must_use]
    pub fn new() -> (Arc<Self>, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), Inbox { rx })
    }

    /// Register a recorder at `address` and return its inbox.
    pub async fn register(runtime: &Arc<dyn ActorRuntime>, address: impl Into<Address>) -> Inbox {
        let (actor, inbox) = Self::new();
        runtime
            .add_actor(address.into(), actor)
            .await
            .expect("recording actor address already in use");
        inbox
    }
}

#[async_trait]
impl Handler for RecordingActor {
    async fn handle(&self, request: Request, _ctx: &Context) {
        let _ = self.tx.send(Received {
            from: request.from.clone(),
            content: request.content.clone(),
        });
    }
}

/// Messages delivered to a [`RecordingActor`].
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Received>,
}

impl Inbox {
    /// Next message. Panics if none arrives within [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> Received {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a delivery")
            .expect("recording actor dropped")
    }

    /// Next message, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Received> {
        self.rx.try_recv().ok()
    }

    /// Panics if any message is queued.
    pub fn assert_empty(&mut self) {
        if let Some(received) = self.try_recv() {
            panic!("unexpected delivery: {received:?}");
        }
    }
}
