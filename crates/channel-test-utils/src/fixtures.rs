//! Pre-configured runtime and registry fixtures.

use crate::recording::{Inbox, RecordingActor};
use channel_service::config::{ChannelConfig, RuntimeConfig};
use channel_service::{
    ActorRuntime, Channel, ChannelRegistryHandle, LocalRuntime, MembershipBackend, Reply,
};
use common::types::{Address, ChannelId};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A channel id unique to this test.
#[must_use]
pub fn random_channel_id() -> ChannelId {
    ChannelId::new(format!("channel-{}", Uuid::new_v4()))
}

/// A local runtime with a channel registry on top.
pub struct TestHarness {
    /// Concrete runtime, for inspection and shutdown.
    pub local: Arc<LocalRuntime>,
    /// The same runtime behind the trait object the channel layer uses.
    pub runtime: Arc<dyn ActorRuntime>,
    /// Registry bound to `runtime`.
    pub registry: ChannelRegistryHandle,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Harness with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default(), ChannelConfig::default())
    }

    /// Harness with explicit settings.
    #[must_use]
    pub fn with_config(runtime_config: RuntimeConfig, channel_config: ChannelConfig) -> Self {
        let local = LocalRuntime::new(runtime_config);
        let runtime: Arc<dyn ActorRuntime> = local.clone();
        let registry = ChannelRegistryHandle::new(Arc::clone(&runtime), channel_config);
        Self {
            local,
            runtime,
            registry,
        }
    }

    /// Create a channel with the default backend.
    pub async fn create_channel(&self, id: impl Into<ChannelId>) -> Channel {
        self.registry
            .create_channel(id, None)
            .await
            .expect("channel creation failed")
    }

    /// Create a channel bound to `backend`.
    pub async fn create_channel_with(
        &self,
        id: impl Into<ChannelId>,
        backend: Arc<dyn MembershipBackend>,
    ) -> Channel {
        self.registry
            .create_channel(id, Some(backend))
            .await
            .expect("channel creation failed")
    }

    /// Register a recording actor at `address`.
    pub async fn inbox(&self, address: &str) -> Inbox {
        RecordingActor::register(&self.runtime, address).await
    }

    /// Subscribe `who` to `channel` and wait for the reply.
    pub async fn subscribe(&self, who: &str, channel: &str) -> Reply {
        self.runtime
            .request(
                Address::new(who),
                ChannelId::new(channel).subscribe_address(),
                Value::Null,
            )
            .await
            .expect("subscribe request not delivered")
    }

    /// Unsubscribe `who` from `channel` and wait for the reply.
    pub async fn unsubscribe(&self, who: &str, channel: &str) -> Reply {
        self.runtime
            .request(
                Address::new(who),
                ChannelId::new(channel).unsubscribe_address(),
                Value::Null,
            )
            .await
            .expect("unsubscribe request not delivered")
    }

    /// Publish `content` to `channel` on behalf of `from`.
    pub async fn publish(&self, from: &str, channel: &str, content: impl Into<Value>) {
        self.runtime
            .send(
                Address::new(from),
                ChannelId::new(channel).publish_address(),
                content.into(),
            )
            .await
            .expect("publish not accepted");
    }
}
