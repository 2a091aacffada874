//! Per-experiment content and role-based series grouping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fedscope_protocol::{
    DistributionMap, Metadata, MetricSample, NodeMap, RawMetricsByRole, Role, SeriesKey,
};

/// Everything the console knows about one experiment.
///
/// Created on the first snapshot load, replaced wholesale on reload, mutated
/// incrementally by streamed samples. Lives for the session; never destroyed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentContent {
    /// Series key → samples in arrival order.
    pub metrics: BTreeMap<SeriesKey, Vec<MetricSample>>,
    /// Static run metadata.
    pub metadata: Metadata,
    /// Client device → loader → label histogram.
    pub distributions: DistributionMap,
    /// Flat topology map as published.
    pub topology: NodeMap,
}

impl ExperimentContent {
    /// Build content from a bulk snapshot, flattening the nested metric form.
    pub fn from_snapshot(
        raw_metrics: RawMetricsByRole,
        metadata: Metadata,
        distributions: DistributionMap,
        topology: NodeMap,
    ) -> Self {
        Self {
            metrics: flatten_metrics(raw_metrics),
            metadata,
            distributions,
            topology,
        }
    }

    /// Append one streamed sample to its series, creating the series if new.
    pub fn append(&mut self, sample: MetricSample) {
        self.metrics
            .entry(sample.series_key())
            .or_default()
            .push(sample);
    }

    /// Highest round number seen across all series.
    pub fn latest_round(&self) -> Option<u64> {
        self.metrics
            .values()
            .flat_map(|samples| samples.iter().map(|s| s.round))
            .max()
    }
}

/// Flatten `role → device → samples` into the series-key-indexed form.
///
/// Exactly one series per (role, device) pair, keyed `role-device`, each
/// sequence keeping the input order and content.
pub fn flatten_metrics(raw: RawMetricsByRole) -> BTreeMap<SeriesKey, Vec<MetricSample>> {
    let mut metrics = BTreeMap::new();
    for (role, devices) in raw {
        for (device, samples) in devices {
            metrics.insert(SeriesKey::new(role, &device), samples);
        }
    }
    metrics
}

/// Series of one experiment partitioned by role prefix.
///
/// Borrowed views in store iteration order. Keys outside the three known
/// prefixes land in no partition.
#[derive(Debug, Default)]
pub struct RoleGroups<'a> {
    pub central: Vec<(&'a SeriesKey, &'a [MetricSample])>,
    pub edge: Vec<(&'a SeriesKey, &'a [MetricSample])>,
    pub clients: Vec<(&'a SeriesKey, &'a [MetricSample])>,
}

impl RoleGroups<'_> {
    pub fn is_empty(&self) -> bool {
        self.central.is_empty() && self.edge.is_empty() && self.clients.is_empty()
    }

    /// Total number of grouped series.
    pub fn len(&self) -> usize {
        self.central.len() + self.edge.len() + self.clients.len()
    }
}

/// Partition an experiment's series by the role prefix of their keys.
pub fn group_by_role(content: &ExperimentContent) -> RoleGroups<'_> {
    let mut groups = RoleGroups::default();
    for (key, samples) in &content.metrics {
        match key.role() {
            Some(Role::Central) => groups.central.push((key, samples.as_slice())),
            Some(Role::Edge) => groups.edge.push((key, samples.as_slice())),
            Some(Role::Client) => groups.clients.push((key, samples.as_slice())),
            None => {}
        }
    }
    groups
}
