//! Request and reply types routed by the actor runtime.
//!
//! A [`Request`] optionally carries a `oneshot` reply slot. Replying consumes
//! the request, so a handler can answer at most once.
//!
//! An [`ActorRemoved`] notification carries an acknowledgement handle. The
//! runtime waits until every copy of it has been dropped, that is until
//! every listener has finished handling the removal.

use crate::errors::BackendError;
use common::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Outcome sent back to a requester.
pub type Reply = Result<Value, ReplyError>;

/// Error carried in a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    /// Numeric error code (see `BackendError::error_code`).
    pub code: i32,
    /// Requester-safe message.
    pub message: String,
}

impl ReplyError {
    /// Create a reply error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ReplyError {}

impl From<&BackendError> for ReplyError {
    fn from(err: &BackendError) -> Self {
        Self::new(err.error_code(), err.to_string())
    }
}

impl From<BackendError> for ReplyError {
    fn from(err: BackendError) -> Self {
        Self::from(&err)
    }
}

/// A message routed to an actor endpoint.
pub struct Request {
    /// Address of the sender.
    pub from: Address,
    /// Address the request was routed to.
    pub to: Address,
    /// Message content.
    pub content: Value,
    /// Reply slot, present only for request/reply traffic.
    respond_to: Option<oneshot::Sender<Reply>>,
}

impl Request {
    /// Create a fire-and-forget request (no reply slot).
    #[must_use]
    pub fn new(from: Address, to: Address, content: Value) -> Self {
        Self {
            from,
            to,
            content,
            respond_to: None,
        }
    }

    /// Create a request with a reply slot, returning the receiving half.
    #[must_use]
    pub fn with_reply(from: Address, to: Address, content: Value) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            from,
            to,
            content,
            respond_to: Some(tx),
        };
        (request, rx)
    }

    /// Whether the sender is waiting for a reply.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.respond_to.is_some()
    }

    /// Reply to the sender.
    ///
    /// Returns `true` if the reply was handed to a waiting requester. A
    /// fire-and-forget request, or a requester that stopped waiting, yields
    /// `false`.
    pub fn reply(self, reply: Reply) -> bool {
        match self.respond_to {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("expects_reply", &self.expects_reply())
            .finish_non_exhaustive()
    }
}

/// Notification that an actor was removed from the runtime.
#[derive(Debug, Clone)]
pub struct ActorRemoved {
    /// Address of the removed actor.
    pub address: Address,
    /// Released when the listener drops the notification.
    _ack: mpsc::Sender<()>,
}

impl ActorRemoved {
    /// Create a notification tied to `ack`. The receiving half of `ack`
    /// sees the channel close once every copy has been dropped.
    #[must_use]
    pub fn new(address: Address, ack: mpsc::Sender<()>) -> Self {
        Self { address, _ack: ack }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_reply_reaches_requester() {
        let (request, rx) = Request::with_reply(
            Address::new("alice"),
            Address::new("room1#subscribe"),
            Value::Null,
        );
        assert!(request.expects_reply());

        assert!(request.reply(Ok(json!("done"))));
        assert_eq!(rx.await.unwrap(), Ok(json!("done")));
    }

    #[test]
    fn test_reply_without_slot_is_noop() {
        let request = Request::new(Address::new("carol"), Address::new("room1"), json!("hi"));
        assert!(!request.expects_reply());
        assert!(!request.reply(Ok(Value::Null)));
    }

    #[test]
    fn test_reply_to_dropped_requester() {
        let (request, rx) = Request::with_reply(
            Address::new("alice"),
            Address::new("room1#subscribe"),
            Value::Null,
        );
        drop(rx);
        assert!(!request.reply(Ok(Value::Null)));
    }

    #[test]
    fn test_reply_error_from_backend_error() {
        let err = ReplyError::from(BackendError::CapacityExceeded("max 2".to_string()));
        assert_eq!(err.code, 7);
        assert_eq!(err.message, "Subscriber capacity exceeded: max 2");
        assert_eq!(err.to_string(), "Subscriber capacity exceeded: max 2 (code 7)");
    }

    #[tokio::test]
    async fn test_actor_removed_ack_released_on_drop() {
        let (ack_tx, mut ack_rx) = mpsc::channel(1);
        let notification = ActorRemoved::new(Address::new("alice"), ack_tx);
        let copy = notification.clone();

        drop(notification);
        assert_eq!(ack_rx.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(copy.address, Address::new("alice"));
        drop(copy);
        assert_eq!(ack_rx.recv().await, None);
    }

    #[test]
    fn test_debug_omits_content() {
        let request = Request::new(
            Address::new("carol"),
            Address::new("room1"),
            json!({"token": "do-not-log"}),
        );
        let debug = format!("{request:?}");
        assert!(debug.contains("carol"));
        assert!(!debug.contains("do-not-log"));
    }
}
