//! Request bodies of the backend ingest surface.
//!
//! Trainers POST these while a run is in flight. The monitoring side never
//! sends them, but the bundled simulator serves the same surface and the
//! integration tests drive it through these types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{LoaderDistribution, MetricSample, Role};

/// Body of `POST /experiment/{id}/log/{role}`.
///
/// The reporting role and experiment id travel in the path, not the body;
/// the stored sample and the streamed feed message carry all six fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetricRequest {
    pub device: String,
    pub round: u64,
    pub accuracy: f64,
    pub loss: f64,
}

impl LogMetricRequest {
    /// Complete the sample with the path-derived role and experiment id.
    pub fn into_sample(self, role: Role, exp_id: impl Into<String>) -> MetricSample {
        MetricSample {
            round: self.round,
            accuracy: self.accuracy,
            loss: self.loss,
            device: self.device,
            role,
            exp_id: exp_id.into(),
        }
    }
}

/// Body of `POST /experiment/{id}/distribution/{role}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDistributionRequest {
    pub device: String,
    /// Loader id → label histogram for that loader.
    pub distribution: BTreeMap<String, LoaderDistribution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_metric_into_sample() {
        let body: LogMetricRequest = serde_json::from_str(
            r#"{"device": "Edge-0", "round": 5, "accuracy": 0.72, "loss": 0.31}"#,
        )
        .unwrap();
        let sample = body.into_sample(Role::Edge, "run-1");
        assert_eq!(sample.exp_id, "run-1");
        assert_eq!(sample.role, Role::Edge);
        assert_eq!(sample.series_key().as_str(), "edge-Edge-0");
    }

    #[test]
    fn test_upload_distribution_shape() {
        let body: UploadDistributionRequest = serde_json::from_str(
            r#"{
                "device": "Client-0",
                "distribution": {
                    "trainloader": {"label_distribution": {"0": 600}, "num_items": 600}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(body.distribution["trainloader"].num_items, 600);
    }
}
