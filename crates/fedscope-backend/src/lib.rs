//! Client side of the monitoring backend.
//!
//! Bulk experiment snapshots come over REST, live samples over a WebSocket
//! feed; both land in the `fedscope-store` command queue. The loader treats
//! experiments independently, so one broken experiment never blocks the
//! rest.

pub mod client;
pub mod config;
pub mod feed;
pub mod loader;

pub use client::{BackendClient, BackendError};
pub use config::BackendConfig;
pub use feed::{connect_metric_feed, run_metric_feed, MetricFeed};
pub use loader::{load_all_experiments, load_experiment, LoadReport};
