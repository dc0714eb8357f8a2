//! `ChannelRegistryActor` - owner of the channels registered with a runtime.
//!
//! The registry is the single place channels are created and removed:
//!
//! - Resolves each channel's membership backend (default when none is given)
//! - Registers the three endpoints of a channel atomically, or none of them
//! - Removes the endpoints and detaches the lifecycle hook on removal
//!
//! # Graceful Shutdown
//!
//! `shutdown()` stops accepting new channels and retires every existing one;
//! the actor keeps answering queries (creation returns `Draining`).
//! `cancel()` does the same and then stops the actor.

use crate::backend::{resolve_backend, MembershipBackend};
use crate::channel::{Channel, ChannelInfo};
use crate::config::ChannelConfig;
use crate::errors::ChannelError;
use crate::observability::metrics;
use crate::runtime::{ActorRuntime, ActorType, MailboxMonitor};

use common::types::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long a retired channel's lifecycle hook gets to exit.
const HOOK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages handled by the registry actor.
pub enum RegistryMessage {
    CreateChannel {
        id: ChannelId,
        backend: Option<Arc<dyn MembershipBackend>>,
        respond_to: oneshot::Sender<Result<Channel, ChannelError>>,
    },
    RemoveChannel {
        id: ChannelId,
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    },
    GetChannel {
        id: ChannelId,
        respond_to: oneshot::Sender<Result<Channel, ChannelError>>,
    },
    ListChannels {
        respond_to: oneshot::Sender<Vec<ChannelInfo>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
    Shutdown {
        respond_to: oneshot::Sender<Result<(), ChannelError>>,
    },
}

/// Registry status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    /// Registered channels.
    pub channel_count: usize,
    /// Messages waiting in the registry mailbox.
    pub mailbox_depth: usize,
    /// Whether the registry mailbox is near capacity.
    pub mailbox_under_pressure: bool,
    /// Whether new channels are refused.
    pub is_draining: bool,
}

/// Handle to the `ChannelRegistryActor`.
///
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct ChannelRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ChannelRegistryHandle {
    /// Spawn a registry bound to `runtime` and return a handle to it.
    #[must_use]
    pub fn new(runtime: Arc<dyn ActorRuntime>, config: ChannelConfig) -> Self {
        let capacity = config.registry_mailbox_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Registry, "registry", capacity));

        let actor = ChannelRegistryActor {
            receiver,
            cancel_token: cancel_token.clone(),
            runtime,
            config,
            channels: HashMap::new(),
            accepting_new: true,
            mailbox: Arc::clone(&mailbox),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, ChannelError> {
        let (tx, rx) = oneshot::channel();

        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(build(tx)).await {
            self.mailbox.record_drop();
            return Err(ChannelError::Internal(format!("channel send failed: {e}")));
        }

        rx.await
            .map_err(|e| ChannelError::Internal(format!("response receive failed: {e}")))
    }

    /// Create a channel and register its endpoints.
    ///
    /// `None` binds the configured default backend. An existing channel with
    /// the same id is retired and replaced.
    ///
    /// # Errors
    ///
    /// `Runtime` if the runtime refuses the endpoints (nothing stays
    /// registered), `Draining` after shutdown.
    pub async fn create_channel(
        &self,
        id: impl Into<ChannelId>,
        backend: Option<Arc<dyn MembershipBackend>>,
    ) -> Result<Channel, ChannelError> {
        let id = id.into();
        self.call(|respond_to| RegistryMessage::CreateChannel {
            id,
            backend,
            respond_to,
        })
        .await?
    }

    /// Unregister a channel's endpoints and detach its lifecycle hook.
    ///
    /// Unknown ids still have their endpoint addresses removed.
    pub async fn remove_channel(&self, id: impl Into<ChannelId>) -> Result<(), ChannelError> {
        let id = id.into();
        self.call(|respond_to| RegistryMessage::RemoveChannel { id, respond_to })
            .await?
    }

    /// Look up a registered channel.
    pub async fn get_channel(&self, id: impl Into<ChannelId>) -> Result<Channel, ChannelError> {
        let id = id.into();
        self.call(|respond_to| RegistryMessage::GetChannel { id, respond_to })
            .await?
    }

    /// Describe every registered channel, sorted by id.
    pub async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChannelError> {
        self.call(|respond_to| RegistryMessage::ListChannels { respond_to })
            .await
    }

    /// Get the current registry status.
    pub async fn get_status(&self) -> Result<RegistryStatus, ChannelError> {
        self.call(|respond_to| RegistryMessage::GetStatus { respond_to })
            .await
    }

    /// Stop accepting channels and retire the existing ones.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        self.call(|respond_to| RegistryMessage::Shutdown { respond_to })
            .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the registry.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `ChannelRegistryActor` implementation.
struct ChannelRegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    cancel_token: CancellationToken,
    runtime: Arc<dyn ActorRuntime>,
    config: ChannelConfig,
    channels: HashMap<ChannelId, Channel>,
    accepting_new: bool,
    mailbox: Arc<MailboxMonitor>,
}

impl ChannelRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "channel.registry")]
    async fn run(mut self) {
        info!(target: "channel.registry", "ChannelRegistryActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "channel.registry",
                        "ChannelRegistryActor received cancellation signal"
                    );
                    self.retire_all().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_dequeue();
                            self.handle_message(message).await;
                        }
                        None => {
                            info!(
                                target: "channel.registry",
                                "ChannelRegistryActor channel closed, exiting"
                            );
                            self.retire_all().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "channel.registry",
            messages_processed = self.mailbox.messages_processed(),
            "ChannelRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::CreateChannel {
                id,
                backend,
                respond_to,
            } => {
                let result = self.create_channel(id, backend).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::RemoveChannel { id, respond_to } => {
                self.remove_channel(&id).await;
                let _ = respond_to.send(Ok(()));
            }

            RegistryMessage::GetChannel { id, respond_to } => {
                let result = self
                    .channels
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| ChannelError::ChannelNotFound(id.to_string()));
                let _ = respond_to.send(result);
            }

            RegistryMessage::ListChannels { respond_to } => {
                let infos = self.list_channels().await;
                let _ = respond_to.send(infos);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(RegistryStatus {
                    channel_count: self.channels.len(),
                    mailbox_depth: self.mailbox.current_depth(),
                    mailbox_under_pressure: self.mailbox.is_under_pressure(),
                    is_draining: !self.accepting_new,
                });
            }

            RegistryMessage::Shutdown { respond_to } => {
                info!(
                    target: "channel.registry",
                    channel_count = self.channels.len(),
                    "Initiating registry shutdown"
                );
                self.retire_all().await;
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    async fn create_channel(
        &mut self,
        id: ChannelId,
        backend: Option<Arc<dyn MembershipBackend>>,
    ) -> Result<Channel, ChannelError> {
        if !self.accepting_new {
            return Err(ChannelError::Draining);
        }

        if self.channels.contains_key(&id) {
            warn!(
                target: "channel.registry",
                channel = %id,
                "Channel already exists; replacing it"
            );
            self.remove_channel(&id).await;
        }

        let backend = resolve_backend(backend, self.config.default_backend);
        let channel = Channel::new(
            id.clone(),
            backend,
            &self.runtime,
            self.config.event_capacity,
        );

        if let Err(e) = self.runtime.add_actors(channel.endpoints()).await {
            channel.dispose();
            warn!(
                target: "channel.registry",
                channel = %id,
                error = %e,
                "Runtime refused channel endpoints"
            );
            return Err(ChannelError::Runtime(e));
        }

        self.channels.insert(id.clone(), channel.clone());
        metrics::set_channels_active(self.channels.len());

        info!(
            target: "channel.registry",
            channel = %id,
            total_channels = self.channels.len(),
            "Channel created"
        );

        Ok(channel)
    }

    /// Detach the hook first so the channel ignores its own endpoint removals.
    async fn remove_channel(&mut self, id: &ChannelId) {
        let channel = self.channels.remove(id);
        if let Some(channel) = &channel {
            channel.dispose();
        }

        let removed = self.runtime.remove_actors(&id.endpoint_addresses()).await;

        match channel {
            Some(channel) => {
                Self::await_hook(channel);
                metrics::set_channels_active(self.channels.len());
                info!(
                    target: "channel.registry",
                    channel = %id,
                    endpoints_removed = removed,
                    total_channels = self.channels.len(),
                    "Channel removed"
                );
            }
            None => {
                debug!(
                    target: "channel.registry",
                    channel = %id,
                    endpoints_removed = removed,
                    "Removal requested for unknown channel"
                );
            }
        }
    }

    /// Wait for a disposed channel's hook in the background.
    fn await_hook(channel: Channel) {
        let Some(handle) = channel.take_hook_handle() else {
            return;
        };
        let id = channel.id().clone();

        tokio::spawn(async move {
            match tokio::time::timeout(HOOK_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "channel.registry",
                        channel = %id,
                        "Lifecycle hook completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "channel.registry",
                        channel = %id,
                        error = ?e,
                        "Lifecycle hook panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "channel.registry",
                        channel = %id,
                        "Lifecycle hook cleanup timed out"
                    );
                }
            }
        });
    }

    async fn list_channels(&self) -> Vec<ChannelInfo> {
        let mut ids: Vec<&ChannelId> = self.channels.keys().collect();
        ids.sort();

        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(channel) = self.channels.get(id) {
                infos.push(channel.info().await);
            }
        }
        infos
    }

    async fn retire_all(&mut self) {
        self.accepting_new = false;

        let ids: Vec<ChannelId> = self.channels.keys().cloned().collect();
        for id in &ids {
            self.remove_channel(id).await;
        }
    }
}
