//! Single-writer store service.
//!
//! `StoreService::run` is the only code that ever touches the
//! [`ExperimentStore`]: it drains one command queue and publishes a fresh
//! [`StoreSnapshot`] after each mutation. Everything else goes through a
//! cloneable [`StoreHandle`].

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use fedscope_protocol::{DistributionMap, Metadata, MetricSample, NodeMap, RawMetricsByRole};

use crate::store::{ExperimentStore, SampleDisposition, StoreSnapshot};

/// Queue depth for inbound commands; the feed is the only high-rate producer.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// Errors surfaced by [`StoreHandle`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store task has stopped.
    #[error("store task is gone")]
    Closed,
}

/// One unit of work for the store task.
#[derive(Debug)]
enum StoreCommand {
    LoadSnapshot {
        exp_id: String,
        raw_metrics: RawMetricsByRole,
        metadata: Metadata,
        distributions: DistributionMap,
        topology: NodeMap,
        ack: oneshot::Sender<()>,
    },
    Ingest(MetricSample),
}

/// Cloneable front door to the store task.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
    snapshots: watch::Receiver<StoreSnapshot>,
}

impl StoreHandle {
    /// Commit a bulk snapshot for one experiment and wait for it to land.
    pub async fn load_snapshot(
        &self,
        exp_id: impl Into<String>,
        raw_metrics: RawMetricsByRole,
        metadata: Metadata,
        distributions: DistributionMap,
        topology: NodeMap,
    ) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(StoreCommand::LoadSnapshot {
                exp_id: exp_id.into(),
                raw_metrics,
                metadata,
                distributions,
                topology,
                ack,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)
    }

    /// Enqueue one streamed sample. Fire-and-forget, like the feed itself.
    pub async fn ingest(&self, sample: MetricSample) -> Result<(), StoreError> {
        self.commands
            .send(StoreCommand::Ingest(sample))
            .await
            .map_err(|_| StoreError::Closed)
    }

    /// Watch receiver delivering every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.clone()
    }

    /// Current snapshot without subscribing.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }
}

/// Owns the store; to be spawned once per console session.
pub struct StoreService {
    commands: mpsc::Receiver<StoreCommand>,
    snapshots: watch::Sender<StoreSnapshot>,
}

impl StoreService {
    /// Create the service and its handle.
    pub fn new() -> (StoreService, StoreHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(StoreSnapshot::default());
        (
            StoreService {
                commands: command_rx,
                snapshots: snapshot_tx,
            },
            StoreHandle {
                commands: command_tx,
                snapshots: snapshot_rx,
            },
        )
    }

    /// Drain commands until every handle is dropped.
    pub async fn run(mut self) {
        let mut store = ExperimentStore::new();
        while let Some(command) = self.commands.recv().await {
            let (changed, ack) = match command {
                StoreCommand::LoadSnapshot {
                    exp_id,
                    raw_metrics,
                    metadata,
                    distributions,
                    topology,
                    ack,
                } => {
                    debug!(exp_id = %exp_id, "committing experiment snapshot");
                    store.load_snapshot(exp_id, raw_metrics, metadata, distributions, topology);
                    (true, Some(ack))
                }
                StoreCommand::Ingest(sample) => (
                    store.apply_streamed_sample(sample) == SampleDisposition::Applied,
                    None,
                ),
            };
            if changed {
                let _ = self.snapshots.send(store.snapshot());
            }
            // Publish before acking, so an acked commit is already visible.
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
        }
        debug!("store service stopped");
    }
}
