//! Lifecycle cleanup hook.
//!
//! Each channel listens to the runtime's "actor removed" stream and purges
//! removed addresses from its backend, so subscribers that vanish never
//! linger in the membership set. A notification is held until the purge
//! completes; the runtime's removal call waits for that. The hook runs until
//! the channel is disposed.

use crate::backend::MembershipBackend;
use crate::observability::metrics;
use crate::runtime::ActorRemoved;

use common::types::{Address, ChannelId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Background task purging removed actors from one channel's backend.
pub(crate) struct LifecycleHook {
    channel: ChannelId,
    backend: Arc<dyn MembershipBackend>,
    removed: broadcast::Receiver<ActorRemoved>,
    cancel_token: CancellationToken,
}

impl LifecycleHook {
    /// Spawn the hook.
    ///
    /// `removed` must be subscribed before the channel's endpoints are
    /// registered so no notification is missed.
    pub(crate) fn spawn(
        channel: ChannelId,
        backend: Arc<dyn MembershipBackend>,
        removed: broadcast::Receiver<ActorRemoved>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let hook = Self {
            channel,
            backend,
            removed,
            cancel_token,
        };
        tokio::spawn(hook.run())
    }

    #[instrument(skip_all, name = "channel.lifecycle", fields(channel = %self.channel))]
    async fn run(mut self) {
        debug!(
            target: "channel.lifecycle",
            channel = %self.channel,
            "Lifecycle hook attached"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    break;
                }

                notification = self.removed.recv() => {
                    match notification {
                        // Dropping the notification after the purge acknowledges it
                        Ok(removed) => self.purge(&removed.address).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "channel.lifecycle",
                                channel = %self.channel,
                                skipped = skipped,
                                "Lifecycle hook lagged; removed actors may linger as subscribers"
                            );
                        }
                        Err(RecvError::Closed) => {
                            debug!(
                                target: "channel.lifecycle",
                                channel = %self.channel,
                                "Actor removal stream closed"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(
            target: "channel.lifecycle",
            channel = %self.channel,
            "Lifecycle hook detached"
        );
    }

    async fn purge(&self, address: &Address) {
        match self.backend.on_unsubscribe(address).await {
            Ok(()) => {
                metrics::record_lifecycle_purge("success");
                debug!(
                    target: "channel.lifecycle",
                    channel = %self.channel,
                    address = %address,
                    "Purged removed actor"
                );
            }
            Err(e) => {
                metrics::record_lifecycle_purge("error");
                warn!(
                    target: "channel.lifecycle",
                    channel = %self.channel,
                    address = %address,
                    error = %e,
                    "Failed to purge removed actor"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn subscribed(addresses: &[&str]) -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        for a in addresses {
            backend.on_subscribe(&Address::new(*a)).await.unwrap();
        }
        backend
    }

    fn spawn_hook(
        backend: &Arc<InMemoryBackend>,
        rx: broadcast::Receiver<ActorRemoved>,
        token: &CancellationToken,
    ) -> JoinHandle<()> {
        LifecycleHook::spawn(
            ChannelId::new("room1"),
            Arc::clone(backend) as Arc<dyn MembershipBackend>,
            rx,
            token.clone(),
        )
    }

    /// Publish removals and wait until every listener has dropped them.
    async fn remove_and_wait(tx: &broadcast::Sender<ActorRemoved>, addresses: &[&str]) {
        let (ack_tx, mut ack_rx) = mpsc::channel(1);
        for a in addresses {
            let _ = tx.send(ActorRemoved::new(Address::new(*a), ack_tx.clone()));
        }
        drop(ack_tx);
        tokio::time::timeout(Duration::from_secs(1), ack_rx.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_removed_actor_is_purged_before_ack() {
        let backend = subscribed(&["alice", "bob"]).await;
        let (tx, rx) = broadcast::channel(8);
        let token = CancellationToken::new();
        let handle = spawn_hook(&backend, rx, &token);

        remove_and_wait(&tx, &["alice"]).await;
        assert_eq!(backend.subscribers().await, vec![Address::new("bob")]);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_hook_ignores_notifications() {
        let backend = subscribed(&["alice"]).await;
        let (tx, rx) = broadcast::channel(8);
        let token = CancellationToken::new();
        let handle = spawn_hook(&backend, rx, &token);

        token.cancel();
        handle.await.unwrap();

        // No receiver remains once the hook has exited
        let (ack_tx, _ack_rx) = mpsc::channel(1);
        assert!(tx
            .send(ActorRemoved::new(Address::new("alice"), ack_tx))
            .is_err());
        assert_eq!(backend.subscribers().await, vec![Address::new("alice")]);
    }

    #[tokio::test]
    async fn test_hook_exits_when_stream_closes() {
        let backend = subscribed(&[]).await;
        let (tx, rx) = broadcast::channel::<ActorRemoved>(8);
        let handle = spawn_hook(&backend, rx, &CancellationToken::new());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_hook_survives_lag() {
        let backend = subscribed(&["alice", "bob", "carol"]).await;
        let (tx, rx) = broadcast::channel(1);
        let token = CancellationToken::new();

        // Overflow the stream before the hook starts reading: "alice" is
        // skipped, "bob" is retained
        let (ack_tx, mut ack_rx) = mpsc::channel::<()>(1);
        tx.send(ActorRemoved::new(Address::new("alice"), ack_tx.clone()))
            .unwrap();
        tx.send(ActorRemoved::new(Address::new("bob"), ack_tx)).unwrap();

        let handle = spawn_hook(&backend, rx, &token);
        tokio::time::timeout(Duration::from_secs(1), ack_rx.recv())
            .await
            .unwrap();
        assert_eq!(
            backend.subscribers().await,
            vec![Address::new("alice"), Address::new("carol")]
        );

        remove_and_wait(&tx, &["carol"]).await;
        assert_eq!(backend.subscribers().await, vec![Address::new("alice")]);

        token.cancel();
        handle.await.unwrap();
    }
}
