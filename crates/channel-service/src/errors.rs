//! Channel service error types.
//!
//! Error types map to numeric error codes used in logs. Backend failures are
//! relayed to requesters through [`ReplyError`](crate::runtime::ReplyError).

use common::types::Address;
use thiserror::Error;

/// Channel service error type.
///
/// Maps to error codes:
/// - `ChannelNotFound`: `NOT_FOUND` (4)
/// - `Runtime(AddressInUse)`: `CONFLICT` (5)
/// - Internal, other runtime failures: `INTERNAL_ERROR` (6)
/// - `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The actor runtime refused or failed an operation.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// No channel with that id is registered.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// The registry is shutting down and accepts no new channels.
    #[error("Channel registry is draining")]
    Draining,

    /// Internal error (mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by a membership backend.
///
/// Relayed verbatim to the requester of a subscribe/unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend cannot hold more subscribers.
    #[error("Subscriber capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The backend refused the address by policy.
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// The backend's storage is unavailable.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures at the actor runtime boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No actor is registered at the address.
    #[error("No actor registered at {0}")]
    UnknownAddress(Address),

    /// An actor is already registered at the address.
    #[error("Address already in use: {0}")]
    AddressInUse(Address),

    /// The target mailbox is full; the message was dropped.
    #[error("Mailbox full: {0}")]
    MailboxFull(Address),

    /// The handler dropped the request without replying.
    #[error("No reply from {0}")]
    NoReply(Address),

    /// The runtime has been shut down.
    #[error("Runtime is shut down")]
    ShutDown,
}

impl BackendError {
    /// Returns the reply error code for this backend failure.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            BackendError::Rejected(_) => 3,         // FORBIDDEN
            BackendError::Unavailable(_) => 6,      // INTERNAL_ERROR
            BackendError::CapacityExceeded(_) => 7, // CAPACITY_EXCEEDED
        }
    }
}

impl ChannelError {
    /// Returns the error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            ChannelError::ChannelNotFound(_) => 4, // NOT_FOUND
            ChannelError::Runtime(RuntimeError::AddressInUse(_)) => 5, // CONFLICT
            ChannelError::Runtime(_) | ChannelError::Internal(_) => 6, // INTERNAL_ERROR
            ChannelError::Draining => 7,           // CAPACITY_EXCEEDED
        }
    }
}
