//! Request handlers behind a channel's three endpoint addresses.
//!
//! | Address | Behaviour |
//! |---------|-----------|
//! | `<id>` | Publish: notify local observers, fan out to subscribers, no reply |
//! | `<id>#subscribe` | Add the sender to the backend, reply on completion |
//! | `<id>#unsubscribe` | Remove the sender from the backend, reply on completion |

use super::{ChannelInner, PublishedMessage};
use crate::observability::metrics;
use crate::runtime::{Context, Handler, ReplyError, Request};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Which of the three channel endpoints a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// `<id>`
    Publish,
    /// `<id>#subscribe`
    Subscribe,
    /// `<id>#unsubscribe`
    Unsubscribe,
}

impl EndpointKind {
    /// All endpoint kinds, in registration order.
    pub const ALL: [EndpointKind; 3] = [
        EndpointKind::Publish,
        EndpointKind::Subscribe,
        EndpointKind::Unsubscribe,
    ];

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Publish => "publish",
            EndpointKind::Subscribe => "subscribe",
            EndpointKind::Unsubscribe => "unsubscribe",
        }
    }
}

/// Handler registered with the runtime for one channel endpoint.
pub(crate) struct Endpoint {
    kind: EndpointKind,
    channel: Arc<ChannelInner>,
}

impl Endpoint {
    pub(crate) fn new(kind: EndpointKind, channel: Arc<ChannelInner>) -> Self {
        Self { kind, channel }
    }

    async fn publish(&self, request: Request, ctx: &Context) {
        let from = request.from;
        let content = request.content;

        // Local observers first; having none is not an error
        let _ = self.channel.published_tx.send(PublishedMessage {
            channel: self.channel.id.clone(),
            from: from.clone(),
            content: content.clone(),
        });

        let subscribers = self.channel.backend.subscribers().await;
        metrics::record_published(subscribers.len());

        debug!(
            target: "channel.endpoint",
            channel = %self.channel.id,
            endpoint = %ctx.address(),
            from = %from,
            fanout = subscribers.len(),
            "Publishing to subscribers"
        );

        for subscriber in subscribers {
            match ctx.send(subscriber.clone(), content.clone()).await {
                Ok(()) => metrics::record_delivery("success"),
                Err(e) => {
                    metrics::record_delivery("error");
                    warn!(
                        target: "channel.endpoint",
                        channel = %self.channel.id,
                        subscriber = %subscriber,
                        error = %e,
                        "Delivery to subscriber failed"
                    );
                }
            }
        }
    }

    /// Apply the membership change, then reply.
    ///
    /// Runs on the endpoint task, so changes reach the backend in arrival
    /// order. A slow backend holds up only this endpoint's mailbox.
    async fn membership(&self, request: Request) {
        let kind = self.kind;
        let start = Instant::now();
        let result = match kind {
            EndpointKind::Unsubscribe => self.channel.backend.on_unsubscribe(&request.from).await,
            _ => self.channel.backend.on_subscribe(&request.from).await,
        };

        let reply = match result {
            Ok(()) => {
                metrics::record_membership_op(kind.as_str(), "success", start.elapsed());
                debug!(
                    target: "channel.endpoint",
                    channel = %self.channel.id,
                    address = %request.from,
                    operation = kind.as_str(),
                    "Membership updated"
                );
                Ok(Value::Null)
            }
            Err(e) => {
                metrics::record_membership_op(kind.as_str(), "error", start.elapsed());
                warn!(
                    target: "channel.endpoint",
                    channel = %self.channel.id,
                    address = %request.from,
                    operation = kind.as_str(),
                    error = %e,
                    "Membership backend refused request"
                );
                Err(ReplyError::from(&e))
            }
        };

        let address = request.from.clone();
        if !request.reply(reply) {
            debug!(
                target: "channel.endpoint",
                channel = %self.channel.id,
                address = %address,
                "Requester not waiting for membership reply"
            );
        }
    }
}

#[async_trait]
impl Handler for Endpoint {
    async fn handle(&self, request: Request, ctx: &Context) {
        match self.kind {
            EndpointKind::Publish => self.publish(request, ctx).await,
            EndpointKind::Subscribe | EndpointKind::Unsubscribe => {
                self.membership(request).await;
            }
        }
    }
}
