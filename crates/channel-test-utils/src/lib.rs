//! # Channel Test Utilities
//!
//! Shared test utilities for the channel service.
//!
//! This crate provides mock backends, recording actors and fixtures for
//! exercising channels end to end on a [`LocalRuntime`](channel_service::LocalRuntime).
//!
//! ## Modules
//!
//! - `mock_backend` - `FailingBackend` and `GatedBackend` (completion released by the test)
//! - `recording` - `RecordingActor` endpoints and their `Inbox`
//! - `fixtures` - `TestHarness` (runtime + registry) and id helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use channel_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let channel = harness.create_channel("room1").await;
//!
//!     let mut alice = harness.inbox("alice").await;
//!     harness.subscribe("alice", "room1").await.unwrap();
//!     harness.publish("carol", "room1", "hi").await;
//!
//!     assert_eq!(alice.recv().await.content, "hi");
//! }
//! ```

pub mod fixtures;
pub mod mock_backend;
pub mod recording;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_backend::*;
pub use recording::*;
