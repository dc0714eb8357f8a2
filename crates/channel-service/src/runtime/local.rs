//! `LocalRuntime` - in-process actor runtime.
//!
//! Each registered address is served by an endpoint actor task:
//!
//! - Bounded `mpsc` mailbox, processed one request at a time
//! - Cancellation via a child of the runtime's root `CancellationToken`
//! - Mailbox depth tracked by a shared [`MailboxMonitor`]
//!
//! Sends never wait on a recipient: a full mailbox rejects the message
//! (`RuntimeError::MailboxFull`) instead of applying backpressure.
//!
//! Every removal, explicit or during shutdown, is published on the
//! "actor removed" broadcast. The removing call returns once every
//! listener has dropped its copy of the notification, or after
//! `RuntimeConfig::removal_ack_timeout`.

use crate::config::RuntimeConfig;
use crate::errors::RuntimeError;

use super::mailbox::{ActorType, MailboxMonitor};
use super::messages::{ActorRemoved, Reply, Request};
use super::{ActorRuntime, Context, Handler};

use async_trait::async_trait;
use common::types::Address;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long shutdown waits for each endpoint task to finish.
const ENDPOINT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Registered endpoint state.
struct ActorEntry {
    /// Mailbox sender.
    sender: mpsc::Sender<Request>,
    /// Cancellation token (child of the runtime's root token).
    cancel_token: CancellationToken,
    /// Mailbox monitor shared with the endpoint task.
    mailbox: Arc<MailboxMonitor>,
    /// Join handle of the endpoint task.
    task_handle: JoinHandle<()>,
}

/// In-process implementation of [`ActorRuntime`].
///
/// Always handled through an `Arc`; endpoint contexts keep only a weak
/// reference back to the runtime.
pub struct LocalRuntime {
    /// Weak self reference handed to endpoint contexts.
    self_ref: Weak<LocalRuntime>,
    /// Registered endpoints by address.
    actors: RwLock<HashMap<Address, ActorEntry>>,
    /// "Actor removed" notification stream.
    removed_tx: broadcast::Sender<ActorRemoved>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    /// Runtime settings.
    config: RuntimeConfig,
}

impl LocalRuntime {
    /// Create a runtime with the given settings. Zero capacities are
    /// raised to 1.
    #[must_use]
    pub fn new(mut config: RuntimeConfig) -> Arc<Self> {
        config.mailbox_capacity = config.mailbox_capacity.max(1);
        config.lifecycle_capacity = config.lifecycle_capacity.max(1);
        let (removed_tx, _) = broadcast::channel(config.lifecycle_capacity);

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            actors: RwLock::new(HashMap::new()),
            removed_tx,
            cancel_token: CancellationToken::new(),
            config,
        })
    }

    /// Create a runtime with default settings.
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(RuntimeConfig::default())
    }

    /// Whether an endpoint is registered at `address`.
    pub async fn contains(&self, address: &Address) -> bool {
        self.actors.read().await.contains_key(address)
    }

    /// Number of registered endpoints.
    pub async fn actor_count(&self) -> usize {
        self.actors.read().await.len()
    }

    /// Registered addresses, sorted.
    pub async fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.actors.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stop every endpoint and refuse further operations.
    ///
    /// Removed addresses are published on the "actor removed" stream.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let drained: Vec<(Address, ActorEntry)> = self.actors.write().await.drain().collect();

        info!(
            target: "channel.runtime",
            endpoints = drained.len(),
            "Shutting down local runtime"
        );

        let addresses: Vec<Address> = drained.iter().map(|(a, _)| a.clone()).collect();
        self.notify_removed(&addresses).await;

        for (address, entry) in drained {
            match tokio::time::timeout(ENDPOINT_SHUTDOWN_TIMEOUT, entry.task_handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "channel.runtime",
                        address = %address,
                        error = ?e,
                        "Endpoint task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "channel.runtime",
                        address = %address,
                        "Endpoint task shutdown timed out"
                    );
                }
            }
        }

        info!(target: "channel.runtime", "Local runtime stopped");
    }

    /// Spawn the endpoint actor serving `address`.
    fn spawn_endpoint(&self, address: Address, handler: Arc<dyn Handler>) -> ActorEntry {
        let capacity = self.config.mailbox_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel_token = self.cancel_token.child_token();
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Endpoint,
            address.as_str(),
            capacity,
        ));

        let runtime: Weak<dyn ActorRuntime> = self.self_ref.clone();
        let actor = EndpointActor {
            ctx: Context::from_weak(address.clone(), runtime),
            address,
            receiver,
            handler,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        ActorEntry {
            sender,
            cancel_token,
            mailbox,
            task_handle,
        }
    }

    /// Publish removals and wait for every listener to drop its copy.
    async fn notify_removed(&self, addresses: &[Address]) {
        if addresses.is_empty() {
            return;
        }

        let (ack_tx, mut ack_rx) = mpsc::channel::<()>(1);
        for address in addresses {
            // No receivers is fine: nobody is watching removals
            let _ = self
                .removed_tx
                .send(ActorRemoved::new(address.clone(), ack_tx.clone()));
        }
        drop(ack_tx);

        // Nothing is ever sent on the ack channel; it closes when the last copy drops
        if tokio::time::timeout(self.config.removal_ack_timeout, ack_rx.recv())
            .await
            .is_err()
        {
            warn!(
                target: "channel.runtime",
                removed = addresses.len(),
                timeout = ?self.config.removal_ack_timeout,
                "Timed out waiting for actor removal listeners"
            );
        }
    }

    /// Put a request in the mailbox of `to` without waiting.
    async fn enqueue(&self, to: &Address, request: Request) -> Result<(), RuntimeError> {
        if self.cancel_token.is_cancelled() {
            return Err(RuntimeError::ShutDown);
        }

        let actors = self.actors.read().await;
        let entry = actors
            .get(to)
            .ok_or_else(|| RuntimeError::UnknownAddress(to.clone()))?;

        entry.mailbox.record_enqueue();
        match entry.sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                entry.mailbox.record_drop();
                Err(RuntimeError::MailboxFull(to.clone()))
            }
            Err(TrySendError::Closed(_)) => {
                // Endpoint task is already stopping
                entry.mailbox.record_drop();
                Err(RuntimeError::UnknownAddress(to.clone()))
            }
        }
    }
}

#[async_trait]
impl ActorRuntime for LocalRuntime {
    async fn add_actor(
        &self,
        address: Address,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RuntimeError> {
        self.add_actors(vec![(address, handler)]).await
    }

    async fn add_actors(&self, batch: Vec<(Address, Arc<dyn Handler>)>) -> Result<(), RuntimeError> {
        if self.cancel_token.is_cancelled() {
            return Err(RuntimeError::ShutDown);
        }

        let mut actors = self.actors.write().await;

        // Validate the whole batch before registering anything
        let mut seen = HashSet::new();
        for (address, _) in &batch {
            if actors.contains_key(address) || !seen.insert(address) {
                return Err(RuntimeError::AddressInUse(address.clone()));
            }
        }

        for (address, handler) in batch {
            let entry = self.spawn_endpoint(address.clone(), handler);
            debug!(
                target: "channel.runtime",
                address = %address,
                "Endpoint registered"
            );
            actors.insert(address, entry);
        }

        Ok(())
    }

    async fn remove_actor(&self, address: &Address) -> bool {
        self.remove_actors(std::slice::from_ref(address)).await == 1
    }

    async fn remove_actors(&self, addresses: &[Address]) -> usize {
        let removed: Vec<Address> = {
            let mut actors = self.actors.write().await;
            addresses
                .iter()
                .filter_map(|address| {
                    actors.remove(address).map(|entry| {
                        entry.cancel_token.cancel();
                        address.clone()
                    })
                })
                .collect()
        };

        for address in &removed {
            debug!(
                target: "channel.runtime",
                address = %address,
                "Endpoint removed"
            );
        }
        self.notify_removed(&removed).await;

        removed.len()
    }

    async fn send(&self, from: Address, to: Address, content: Value) -> Result<(), RuntimeError> {
        let request = Request::new(from, to.clone(), content);
        self.enqueue(&to, request).await
    }

    async fn request(
        &self,
        from: Address,
        to: Address,
        content: Value,
    ) -> Result<Reply, RuntimeError> {
        let (request, rx) = Request::with_reply(from, to.clone(), content);
        self.enqueue(&to, request).await?;

        rx.await.map_err(|_| RuntimeError::NoReply(to))
    }

    fn actor_removed(&self) -> broadcast::Receiver<ActorRemoved> {
        self.removed_tx.subscribe()
    }
}

/// Actor task serving one registered address.
struct EndpointActor {
    /// Served address.
    address: Address,
    /// Mailbox receiver.
    receiver: mpsc::Receiver<Request>,
    /// Request handler.
    handler: Arc<dyn Handler>,
    /// Execution context passed to the handler.
    ctx: Context,
    /// Cancellation token (child of the runtime's root token).
    cancel_token: CancellationToken,
    /// Mailbox monitor.
    mailbox: Arc<MailboxMonitor>,
}

impl EndpointActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "channel.runtime.endpoint", fields(address = %self.address))]
    async fn run(mut self) {
        debug!(
            target: "channel.runtime.endpoint",
            address = %self.address,
            "Endpoint actor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "channel.runtime.endpoint",
                        address = %self.address,
                        "Endpoint actor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(request) => {
                            self.mailbox.record_dequeue();
                            self.handler.handle(request, &self.ctx).await;
                        }
                        None => {
                            debug!(
                                target: "channel.runtime.endpoint",
                                address = %self.address,
                                "Endpoint actor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(
            target: "channel.runtime.endpoint",
            address = %self.address,
            messages_processed = self.mailbox.messages_processed(),
            "Endpoint actor stopped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Forwards every request to a test-owned channel.
    struct Forward {
        tx: mpsc::UnboundedSender<(Address, Address, Value)>,
    }

    #[async_trait]
    impl Handler for Forward {
        async fn handle(&self, request: Request, _ctx: &Context) {
            let _ = self
                .tx
                .send((request.from.clone(), request.to.clone(), request.content.clone()));
        }
    }

    /// Replies with the request content.
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, request: Request, _ctx: &Context) {
            let content = request.content.clone();
            request.reply(Ok(content));
        }
    }

    /// Drops requests without replying.
    struct Silent;

    #[async_trait]
    impl Handler for Silent {
        async fn handle(&self, _request: Request, _ctx: &Context) {}
    }

    /// Blocks until released, holding up the mailbox.
    struct Blocked {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Handler for Blocked {
        async fn handle(&self, _request: Request, _ctx: &Context) {
            self.release.notified().await;
        }
    }

    /// Relays the content to the address named in it, via the context.
    struct Relay;

    #[async_trait]
    impl Handler for Relay {
        async fn handle(&self, request: Request, ctx: &Context) {
            let to = Address::new(request.content["to"].as_str().unwrap_or_default());
            let _ = ctx.send(to, request.content["body"].clone()).await;
        }
    }

    fn forward() -> (
        Arc<dyn Handler>,
        mpsc::UnboundedReceiver<(Address, Address, Value)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Forward { tx }), rx)
    }

    #[tokio::test]
    async fn test_send_reaches_registered_actor() {
        let runtime = LocalRuntime::with_defaults();
        let (handler, mut rx) = forward();
        runtime.add_actor(Address::new("alice"), handler).await.unwrap();

        runtime
            .send(Address::new("carol"), Address::new("alice"), json!("hi"))
            .await
            .unwrap();

        let (from, to, content) = rx.recv().await.unwrap();
        assert_eq!(from, Address::new("carol"));
        assert_eq!(to, Address::new("alice"));
        assert_eq!(content, json!("hi"));
    }

    #[tokio::test]
    async fn test_send_to_unknown_address() {
        let runtime = LocalRuntime::with_defaults();

        let result = runtime
            .send(Address::new("carol"), Address::new("nobody"), json!("hi"))
            .await;
        assert_eq!(
            result,
            Err(RuntimeError::UnknownAddress(Address::new("nobody")))
        );
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let runtime = LocalRuntime::with_defaults();
        runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await.unwrap();

        let result = runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await;
        assert_eq!(result, Err(RuntimeError::AddressInUse(Address::new("alice"))));
    }

    #[tokio::test]
    async fn test_add_actors_is_all_or_nothing() {
        let runtime = LocalRuntime::with_defaults();
        runtime
            .add_actor(Address::new("room1#unsubscribe"), Arc::new(Silent))
            .await
            .unwrap();

        let batch: Vec<(Address, Arc<dyn Handler>)> = vec![
            (Address::new("room1"), Arc::new(Silent)),
            (Address::new("room1#subscribe"), Arc::new(Silent)),
            (Address::new("room1#unsubscribe"), Arc::new(Silent)),
        ];
        let result = runtime.add_actors(batch).await;

        assert_eq!(
            result,
            Err(RuntimeError::AddressInUse(Address::new("room1#unsubscribe")))
        );
        assert!(!runtime.contains(&Address::new("room1")).await);
        assert!(!runtime.contains(&Address::new("room1#subscribe")).await);
        assert_eq!(runtime.actor_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_actors_rejects_duplicates_within_batch() {
        let runtime = LocalRuntime::with_defaults();

        let batch: Vec<(Address, Arc<dyn Handler>)> = vec![
            (Address::new("a"), Arc::new(Silent)),
            (Address::new("a"), Arc::new(Silent)),
        ];
        assert!(runtime.add_actors(batch).await.is_err());
        assert_eq!(runtime.actor_count().await, 0);
    }

    /// Receive one removal notification in the background.
    fn next_removal(runtime: &LocalRuntime) -> tokio::task::JoinHandle<Address> {
        let mut removed = runtime.actor_removed();
        tokio::spawn(async move { removed.recv().await.unwrap().address })
    }

    #[tokio::test]
    async fn test_remove_actor_publishes_notification() {
        let runtime = LocalRuntime::with_defaults();
        let listener = next_removal(&runtime);
        runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await.unwrap();

        assert!(runtime.remove_actor(&Address::new("alice")).await);
        assert_eq!(listener.await.unwrap(), Address::new("alice"));

        // Removing again is a no-op and publishes nothing
        let mut removed = runtime.actor_removed();
        assert!(!runtime.remove_actor(&Address::new("alice")).await);
        assert!(removed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_actor_waits_for_listeners() {
        let runtime = LocalRuntime::with_defaults();
        let handled = Arc::new(AtomicBool::new(false));
        let mut removed = runtime.actor_removed();
        let listener = {
            let handled = Arc::clone(&handled);
            tokio::spawn(async move {
                let notification = removed.recv().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
                handled.store(true, Ordering::SeqCst);
                drop(notification);
            })
        };
        runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await.unwrap();

        assert!(runtime.remove_actor(&Address::new("alice")).await);
        assert!(handled.load(Ordering::SeqCst));
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_unread_listener_delays_removal_until_timeout() {
        let runtime = LocalRuntime::new(RuntimeConfig {
            removal_ack_timeout: Duration::from_millis(50),
            ..RuntimeConfig::default()
        });
        let _unread = runtime.actor_removed();
        runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await.unwrap();

        let removed = tokio::time::timeout(
            Duration::from_secs(1),
            runtime.remove_actor(&Address::new("alice")),
        )
        .await
        .unwrap();
        assert!(removed);
        assert!(!runtime.contains(&Address::new("alice")).await);
    }

    #[tokio::test]
    async fn test_zero_capacities_raised_to_one() {
        let runtime = LocalRuntime::new(RuntimeConfig {
            mailbox_capacity: 0,
            lifecycle_capacity: 0,
            ..RuntimeConfig::default()
        });
        let (handler, mut rx) = forward();
        runtime.add_actor(Address::new("alice"), handler).await.unwrap();
        let listener = next_removal(&runtime);

        runtime
            .send(Address::new("carol"), Address::new("alice"), json!("hi"))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().2, json!("hi"));

        assert!(runtime.remove_actor(&Address::new("alice")).await);
        assert_eq!(listener.await.unwrap(), Address::new("alice"));
    }

    #[tokio::test]
    async fn test_remove_actors_counts_registered_only() {
        let runtime = LocalRuntime::with_defaults();
        runtime.add_actor(Address::new("a"), Arc::new(Silent)).await.unwrap();
        runtime.add_actor(Address::new("b"), Arc::new(Silent)).await.unwrap();

        let removed = runtime
            .remove_actors(&[Address::new("a"), Address::new("b"), Address::new("c")])
            .await;
        assert_eq!(removed, 2);
        assert_eq!(runtime.actor_count().await, 0);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let runtime = LocalRuntime::with_defaults();
        runtime.add_actor(Address::new("echo"), Arc::new(Echo)).await.unwrap();

        let reply = runtime
            .request(Address::new("alice"), Address::new("echo"), json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(reply, Ok(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_request_without_reply() {
        let runtime = LocalRuntime::with_defaults();
        runtime.add_actor(Address::new("silent"), Arc::new(Silent)).await.unwrap();

        let result = runtime
            .request(Address::new("alice"), Address::new("silent"), Value::Null)
            .await;
        assert_eq!(result, Err(RuntimeError::NoReply(Address::new("silent"))));
    }

    #[tokio::test]
    async fn test_full_mailbox_rejects_without_blocking() {
        let runtime = LocalRuntime::new(RuntimeConfig {
            mailbox_capacity: 1,
            ..RuntimeConfig::default()
        });
        let release = Arc::new(Notify::new());
        runtime
            .add_actor(
                Address::new("slow"),
                Arc::new(Blocked {
                    release: Arc::clone(&release),
                }),
            )
            .await
            .unwrap();

        // First message is taken by the handler, which then blocks
        runtime
            .send(Address::new("a"), Address::new("slow"), json!(1))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second fills the single slot, third is rejected
        runtime
            .send(Address::new("a"), Address::new("slow"), json!(2))
            .await
            .unwrap();
        let result = runtime
            .send(Address::new("a"), Address::new("slow"), json!(3))
            .await;
        assert_eq!(result, Err(RuntimeError::MailboxFull(Address::new("slow"))));

        release.notify_waiters();
    }

    #[tokio::test]
    async fn test_context_send_uses_endpoint_address() {
        let runtime = LocalRuntime::with_defaults();
        let (handler, mut rx) = forward();
        runtime.add_actor(Address::new("bob"), handler).await.unwrap();
        runtime.add_actor(Address::new("relay"), Arc::new(Relay)).await.unwrap();

        runtime
            .send(
                Address::new("carol"),
                Address::new("relay"),
                json!({"to": "bob", "body": "hello"}),
            )
            .await
            .unwrap();

        let (from, _, content) = rx.recv().await.unwrap();
        assert_eq!(from, Address::new("relay"));
        assert_eq!(content, json!("hello"));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_operations() {
        let runtime = LocalRuntime::with_defaults();
        let listener = next_removal(&runtime);
        runtime.add_actor(Address::new("alice"), Arc::new(Silent)).await.unwrap();

        runtime.shutdown().await;

        assert!(runtime.is_shut_down());
        assert_eq!(runtime.actor_count().await, 0);
        assert_eq!(listener.await.unwrap(), Address::new("alice"));
        assert_eq!(
            runtime
                .send(Address::new("a"), Address::new("alice"), Value::Null)
                .await,
            Err(RuntimeError::ShutDown)
        );
        assert_eq!(
            runtime.add_actor(Address::new("bob"), Arc::new(Silent)).await,
            Err(RuntimeError::ShutDown)
        );
    }

    #[tokio::test]
    async fn test_addresses_sorted() {
        let runtime = LocalRuntime::with_defaults();
        runtime.add_actor(Address::new("b"), Arc::new(Silent)).await.unwrap();
        runtime.add_actor(Address::new("a"), Arc::new(Silent)).await.unwrap();

        assert_eq!(
            runtime.addresses().await,
            vec![Address::new("a"), Address::new("b")]
        );
    }
}
