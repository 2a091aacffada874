//! Metric ingestion store for fedscope.
//!
//! One task owns the store and drains a single command queue; every bulk
//! snapshot commit and every streamed sample serializes through it, and each
//! mutation publishes one immutable snapshot to watchers. Consumers never
//! observe a half-updated experiment and never need a lock.

pub mod content;
pub mod selector;
pub mod service;
pub mod store;

pub use content::{flatten_metrics, group_by_role, ExperimentContent, RoleGroups};
pub use selector::{DistributionSelector, Selection};
pub use service::{StoreError, StoreHandle, StoreService};
pub use store::{ExperimentStore, SampleDisposition, StoreSnapshot};
