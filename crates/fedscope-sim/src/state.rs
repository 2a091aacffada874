//! Server-side experiment registry.

use std::collections::BTreeMap;

use thiserror::Error;

use fedscope_protocol::{
    DistributionsByRole, LogMetricRequest, Metadata, MetricSample, NodeMap, RawMetricsByRole,
    Role, UploadDistributionRequest,
};

/// Errors the ingest surface reports back to trainers.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("experiment {0} already exists")]
    AlreadyExists(String),

    #[error("experiment {0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(&'static str),
}

/// One experiment as the backend holds it.
#[derive(Debug, Clone, Default)]
pub struct SimExperiment {
    pub metadata: Metadata,
    pub metrics: RawMetricsByRole,
    pub distributions: DistributionsByRole,
    pub topology: NodeMap,
}

/// All experiment state behind the REST surface.
///
/// Metrics are append-only; metadata is fixed at creation; distributions
/// and topology are last-write-wins, as trainers may re-register them.
#[derive(Debug, Default)]
pub struct SimStore {
    experiments: BTreeMap<String, SimExperiment>,
}

impl SimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new experiment. Ids are unique for the server's lifetime.
    pub fn create_experiment(&mut self, exp_id: &str, metadata: Metadata) -> Result<(), SimError> {
        if self.experiments.contains_key(exp_id) {
            return Err(SimError::AlreadyExists(exp_id.to_string()));
        }
        self.experiments.insert(
            exp_id.to_string(),
            SimExperiment {
                metadata,
                ..SimExperiment::default()
            },
        );
        Ok(())
    }

    /// Replace the experiment's topology map.
    pub fn set_topology(&mut self, exp_id: &str, topology: NodeMap) -> Result<(), SimError> {
        self.experiment_mut(exp_id)?.topology = topology;
        Ok(())
    }

    /// Append one metric and return the completed sample.
    pub fn add_metric(
        &mut self,
        exp_id: &str,
        role: Role,
        request: LogMetricRequest,
    ) -> Result<MetricSample, SimError> {
        let experiment = self.experiment_mut(exp_id)?;
        let sample = request.into_sample(role, exp_id);
        experiment
            .metrics
            .entry(role)
            .or_default()
            .entry(sample.device.clone())
            .or_default()
            .push(sample.clone());
        Ok(sample)
    }

    /// Store a device's loader distributions under `role`.
    pub fn add_distribution(
        &mut self,
        exp_id: &str,
        role: Role,
        request: UploadDistributionRequest,
    ) -> Result<(), SimError> {
        self.experiment_mut(exp_id)?
            .distributions
            .entry(role)
            .or_default()
            .insert(request.device, request.distribution);
        Ok(())
    }

    /// Known experiment ids in map order.
    pub fn list_experiments(&self) -> Vec<String> {
        self.experiments.keys().cloned().collect()
    }

    pub fn metrics(&self, exp_id: &str) -> Result<RawMetricsByRole, SimError> {
        Ok(self.experiment(exp_id)?.metrics.clone())
    }

    pub fn metadata(&self, exp_id: &str) -> Result<Metadata, SimError> {
        Ok(self.experiment(exp_id)?.metadata.clone())
    }

    pub fn distributions(&self, exp_id: &str) -> Result<DistributionsByRole, SimError> {
        Ok(self.experiment(exp_id)?.distributions.clone())
    }

    pub fn topology(&self, exp_id: &str) -> Result<NodeMap, SimError> {
        Ok(self.experiment(exp_id)?.topology.clone())
    }

    fn experiment(&self, exp_id: &str) -> Result<&SimExperiment, SimError> {
        self.experiments
            .get(exp_id)
            .ok_or_else(|| SimError::NotFound(exp_id.to_string()))
    }

    fn experiment_mut(&mut self, exp_id: &str) -> Result<&mut SimExperiment, SimError> {
        self.experiments
            .get_mut(exp_id)
            .ok_or_else(|| SimError::NotFound(exp_id.to_string()))
    }
}
