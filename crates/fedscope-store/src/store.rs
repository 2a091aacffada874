//! The append-only experiment store and its published snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use fedscope_protocol::{DistributionMap, Metadata, MetricSample, NodeMap, RawMetricsByRole};

use crate::content::ExperimentContent;

/// What became of a streamed sample handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDisposition {
    /// Appended to its series.
    Applied,
    /// The sample's experiment is not in the store; nothing changed.
    DroppedUnknownExperiment,
}

/// Metric store keyed by experiment id.
///
/// Contents are `Arc`ed so published snapshots stay frozen: appends go
/// through `Arc::make_mut`, which clones a content only while a reader still
/// holds the previously published version and mutates in place otherwise.
#[derive(Debug, Clone, Default)]
pub struct ExperimentStore {
    experiments: BTreeMap<String, Arc<ExperimentContent>>,
    dropped_unknown: u64,
}

impl ExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire content for `exp_id` from a bulk snapshot.
    ///
    /// Idempotent: loading identical input twice yields identical state.
    pub fn load_snapshot(
        &mut self,
        exp_id: impl Into<String>,
        raw_metrics: RawMetricsByRole,
        metadata: Metadata,
        distributions: DistributionMap,
        topology: NodeMap,
    ) {
        let content =
            ExperimentContent::from_snapshot(raw_metrics, metadata, distributions, topology);
        self.experiments.insert(exp_id.into(), Arc::new(content));
    }

    /// Append one streamed sample to its experiment's series.
    ///
    /// A sample whose `exp_id` is unknown is a counted no-op: the live feed
    /// can outrun the initial snapshot load, and such samples are dropped
    /// rather than buffered.
    pub fn apply_streamed_sample(&mut self, sample: MetricSample) -> SampleDisposition {
        match self.experiments.get_mut(&sample.exp_id) {
            Some(content) => {
                Arc::make_mut(content).append(sample);
                SampleDisposition::Applied
            }
            None => {
                self.dropped_unknown += 1;
                tracing::debug!(exp_id = %sample.exp_id, "dropped sample for unknown experiment");
                SampleDisposition::DroppedUnknownExperiment
            }
        }
    }

    /// Content of one experiment.
    pub fn experiment(&self, exp_id: &str) -> Option<&Arc<ExperimentContent>> {
        self.experiments.get(exp_id)
    }

    /// Known experiment ids in map order.
    pub fn experiment_ids(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Streamed samples dropped because their experiment was unknown.
    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown
    }

    /// Frozen view of every experiment, for publication.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            experiments: self.experiments.clone(),
            dropped_unknown: self.dropped_unknown,
        }
    }
}

/// Immutable published view of the store.
///
/// Cloning is cheap: experiment contents are shared `Arc`s. A snapshot taken
/// before a mutation never reflects it.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    experiments: BTreeMap<String, Arc<ExperimentContent>>,
    dropped_unknown: u64,
}

impl StoreSnapshot {
    /// Content of one experiment.
    pub fn experiment(&self, exp_id: &str) -> Option<&Arc<ExperimentContent>> {
        self.experiments.get(exp_id)
    }

    /// Known experiment ids in map order.
    pub fn experiment_ids(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    /// Iterate over (experiment id, content) in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<ExperimentContent>)> {
        self.experiments
            .iter()
            .map(|(id, content)| (id.as_str(), content))
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Streamed samples dropped so far because their experiment was unknown.
    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown
    }
}
