//! Bulk snapshot loading.
//!
//! One load pass fetches the experiment list, pulls the four content
//! endpoints for every experiment concurrently, and commits each experiment
//! to the store as its fetches complete. Reload is the same pass again; a
//! backend that has not changed produces byte-identical content.

use futures_util::future::join_all;
use tracing::{debug, warn};

use fedscope_protocol::Role;
use fedscope_store::StoreHandle;

use crate::client::{BackendClient, BackendError};

/// Outcome of one full load pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Experiments committed to the store, in backend list order.
    pub loaded: Vec<String>,
    /// Experiments that failed to load, with the failure.
    pub failed: Vec<(String, BackendError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch and commit every experiment the backend lists.
///
/// Failing to list experiments fails the pass; a failure inside one
/// experiment only lands that experiment in [`LoadReport::failed`] and
/// leaves any previously stored content for it untouched.
pub async fn load_all_experiments(
    client: &BackendClient,
    store: &StoreHandle,
) -> Result<LoadReport, BackendError> {
    let experiments = client.list_experiments().await?;
    debug!(count = experiments.len(), "loading experiment snapshots");

    let outcomes = join_all(experiments.iter().map(|exp_id| async move {
        (exp_id.clone(), load_experiment(client, store, exp_id).await)
    }))
    .await;

    let mut report = LoadReport::default();
    for (exp_id, outcome) in outcomes {
        match outcome {
            Ok(()) => report.loaded.push(exp_id),
            Err(error) => {
                warn!(exp_id = %exp_id, error = %error, "experiment load failed");
                report.failed.push((exp_id, error));
            }
        }
    }
    Ok(report)
}

/// Fetch one experiment's four content endpoints and commit them as a unit.
pub async fn load_experiment(
    client: &BackendClient,
    store: &StoreHandle,
    exp_id: &str,
) -> Result<(), BackendError> {
    let (raw_metrics, metadata, mut distributions, topology) = tokio::try_join!(
        client.fetch_metrics(exp_id),
        client.fetch_metadata(exp_id),
        client.fetch_distributions(exp_id),
        client.fetch_topology(exp_id),
    )?;

    // Only client distributions feed the selection view.
    let client_distributions = distributions.remove(&Role::Client).unwrap_or_default();

    store
        .load_snapshot(exp_id, raw_metrics, metadata, client_distributions, topology)
        .await?;
    debug!(exp_id, "experiment snapshot committed");
    Ok(())
}
