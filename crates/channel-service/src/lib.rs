//! Channel Service Library
//!
//! Named publish/subscribe channels layered on an actor messaging runtime.
//! A channel with id `room1` is reachable at three runtime addresses:
//!
//! - `room1` - publish: the content is forwarded to every subscriber
//! - `room1#subscribe` - the sender joins the channel
//! - `room1#unsubscribe` - the sender leaves the channel
//!
//! Membership is stored by a pluggable backend, and subscribers removed from
//! the runtime are purged automatically.
//!
//! # Architecture
//!
//! ```text
//! ChannelRegistryActor (one per runtime)
//! └── owns N Channels
//!     ├── MembershipBackend (one per channel)
//!     ├── 3 endpoint handlers, registered atomically with the runtime
//!     └── lifecycle hook (listens to "actor removed")
//!
//! LocalRuntime
//! └── EndpointActor per registered address (bounded mailbox)
//! ```
//!
//! # Modules
//!
//! - [`backend`] - Membership backend trait and the in-memory default
//! - [`channel`] - Channel, endpoint handlers, lifecycle hook
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with error codes
//! - [`observability`] - Metrics and health endpoints
//! - [`registry`] - Channel registry actor
//! - [`runtime`] - Actor runtime boundary and `LocalRuntime`

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod channel;
pub mod config;
pub mod errors;
pub mod observability;
pub mod registry;
pub mod runtime;

pub use backend::{BackendKind, InMemoryBackend, MembershipBackend};
pub use channel::{Channel, ChannelInfo, PublishedMessage};
pub use errors::{BackendError, ChannelError, RuntimeError};
pub use registry::{ChannelRegistryHandle, RegistryStatus};
pub use runtime::{
    ActorRemoved, ActorRuntime, Context, Handler, LocalRuntime, Reply, ReplyError, Request,
};
