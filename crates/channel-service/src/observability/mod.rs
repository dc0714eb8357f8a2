//! Observability module for the channel service.
//!
//! Metric labels are bounded to prevent cardinality explosion; channel ids
//! and subscriber addresses appear only in log fields, never in labels.
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `channel_channels_active` | Gauge | none | Registered channels |
//! | `channel_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator |
//! | `channel_messages_published_total` | Counter | none | Publish requests handled |
//! | `channel_fanout_size` | Histogram | none | Subscribers per publish |
//! | `channel_deliveries_total` | Counter | `status` | Per-recipient delivery outcome |
//! | `channel_membership_ops_total` | Counter | `operation`, `status` | Subscribe/unsubscribe outcome |
//! | `channel_membership_duration_seconds` | Histogram | `operation` | Backend call latency |
//! | `channel_lifecycle_purges_total` | Counter | `status` | Subscribers purged on actor removal |
//! | `channel_messages_dropped_total` | Counter | `actor_type` | Full-mailbox rejections |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
