//! Mailbox monitoring for runtime actors.
//!
//! Every mailbox is bounded, so pressure is measured against its capacity:
//!
//! - Depth reaching the high watermark (3/4 of capacity) logs one warning
//!   and marks the mailbox as under pressure
//! - Depth falling back to the low watermark (1/4 of capacity) clears it
//!
//! The gap between the two marks keeps a mailbox hovering near one of them
//! from logging on every message.
//!
//! Depth is counted on the sending side (enqueue) and decremented when the
//! owning actor takes the message off its queue (dequeue).

use crate::observability::metrics;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `ChannelRegistryActor`.
    Registry,
    /// Endpoint actor (one per registered address).
    Endpoint,
}

impl ActorType {
    /// Label used in metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Endpoint => "endpoint",
        }
    }
}

/// Depth tracking for one bounded mailbox.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    high_watermark: usize,
    low_watermark: usize,
    depth: AtomicUsize,
    under_pressure: AtomicBool,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    /// Monitor a mailbox holding at most `capacity` messages.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>, capacity: usize) -> Self {
        let high_watermark = (capacity.saturating_mul(3) / 4).max(1);
        Self {
            actor_type,
            actor_id: actor_id.into(),
            high_watermark,
            low_watermark: (capacity / 4).min(high_watermark - 1),
            depth: AtomicUsize::new(0),
            under_pressure: AtomicBool::new(false),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        if depth >= self.high_watermark && !self.under_pressure.swap(true, Ordering::Relaxed) {
            warn!(
                target: "channel.runtime.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                high_watermark = self.high_watermark,
                "Mailbox nearing capacity"
            );
        }
    }

    /// Record a message being taken off the mailbox.
    pub fn record_dequeue(&self) {
        let depth = self.decrement_depth();
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::set_actor_mailbox_depth(self.actor_type.as_str(), depth);

        if depth <= self.low_watermark && self.under_pressure.swap(false, Ordering::Relaxed) {
            debug!(
                target: "channel.runtime.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                "Mailbox pressure relieved"
            );
        }
    }

    /// Record an enqueue that the mailbox refused (full or closed).
    ///
    /// Undoes the depth increment of the preceding [`record_enqueue`](Self::record_enqueue).
    pub fn record_drop(&self) {
        self.decrement_depth();
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_message_dropped(self.actor_type.as_str());
        warn!(
            target: "channel.runtime.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped = dropped,
            "Message dropped, mailbox full"
        );
    }

    /// Messages currently queued.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Whether depth has reached the high watermark and not yet drained to
    /// the low one.
    #[must_use]
    pub fn is_under_pressure(&self) -> bool {
        self.under_pressure.load(Ordering::Relaxed)
    }

    /// Messages taken off the queue.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Messages refused at enqueue.
    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Saturating decrement; returns the new depth.
    fn decrement_depth(&self) -> usize {
        match self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| d.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }
}
