//! Common data types for channel service components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Suffix of a channel's subscribe endpoint.
pub const SUBSCRIBE_SUFFIX: &str = "#subscribe";

/// Suffix of a channel's unsubscribe endpoint.
pub const UNSUBSCRIBE_SUFFIX: &str = "#unsubscribe";

/// Routable name of an actor endpoint.
///
/// Addresses are compared by value; two addresses with the same text name
/// the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from any string-like value.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Create a unique, throwaway address (e.g. for one-off requesters).
    #[must_use]
    pub fn ephemeral(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a publish/subscribe channel.
///
/// A channel owns three endpoint addresses derived from its id:
/// `<id>` (publish), `<id>#subscribe` and `<id>#unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a channel id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address of the publish endpoint (`<id>`).
    #[must_use]
    pub fn publish_address(&self) -> Address {
        Address::new(self.0.clone())
    }

    /// Address of the subscribe endpoint (`<id>#subscribe`).
    #[must_use]
    pub fn subscribe_address(&self) -> Address {
        Address::new(format!("{}{SUBSCRIBE_SUFFIX}", self.0))
    }

    /// Address of the unsubscribe endpoint (`<id>#unsubscribe`).
    #[must_use]
    pub fn unsubscribe_address(&self) -> Address {
        Address::new(format!("{}{UNSUBSCRIBE_SUFFIX}", self.0))
    }

    /// All three endpoint addresses, in publish, subscribe, unsubscribe order.
    #[must_use]
    pub fn endpoint_addresses(&self) -> [Address; 3] {
        [
            self.publish_address(),
            self.subscribe_address(),
            self.unsubscribe_address(),
        ]
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
