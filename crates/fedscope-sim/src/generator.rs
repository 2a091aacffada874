//! Scripted hierarchical training run.
//!
//! Reproduces the reference traffic shape: each round every client reports
//! a noisy accuracy step, every edge reports the mean of its clients, and
//! the central server reports the mean of the edges.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use fedscope_protocol::{
    Endpoint, LoaderDistribution, LogMetricRequest, Metadata, NodeDescription, NodeKind, NodeMap,
    Role, UploadDistributionRequest,
};

use crate::server::broadcast_sample;
use crate::state::{SimError, SimStore};

/// Shape of the generated run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub num_clients: usize,
    pub clients_per_edge: usize,
    pub rounds: u64,
    /// Pause between successive rounds.
    pub pace: Duration,
    /// Fixed RNG seed, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            num_clients: 8,
            clients_per_edge: 4,
            rounds: 10,
            pace: Duration::from_millis(500),
            seed: None,
        }
    }
}

/// Drives one experiment through the store and the live feed.
pub struct RoundGenerator {
    config: GeneratorConfig,
    exp_id: String,
    store: Arc<RwLock<SimStore>>,
    feed: broadcast::Sender<String>,
    rng: StdRng,
}

impl RoundGenerator {
    pub fn new(
        config: GeneratorConfig,
        store: Arc<RwLock<SimStore>>,
        feed: broadcast::Sender<String>,
    ) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let exp_id = format!("test-exp-{}", rng.gen_range(1000..10000));
        Self {
            config,
            exp_id,
            store,
            feed,
            rng,
        }
    }

    pub fn exp_id(&self) -> &str {
        &self.exp_id
    }

    /// Register the experiment: metadata, client distributions, topology.
    pub async fn setup(&mut self) -> Result<(), SimError> {
        let metadata = self.metadata();
        let topology = self.topology();
        let clients = self.client_names();

        let mut store = self.store.write().await;
        store.create_experiment(&self.exp_id, metadata)?;
        store.set_topology(&self.exp_id, topology)?;
        for client in &clients {
            store.add_distribution(
                &self.exp_id,
                Role::Client,
                UploadDistributionRequest {
                    device: client.clone(),
                    distribution: loader_fixture(),
                },
            )?;
        }
        drop(store);

        info!(exp_id = %self.exp_id, clients = self.config.num_clients, "experiment registered");
        Ok(())
    }

    /// Report one full round up the hierarchy.
    pub async fn run_round(&mut self, round: u64) -> Result<(), SimError> {
        let clients = self.client_names();
        let edges = self.edge_names();
        let mut edge_buckets: Vec<Vec<LogMetricRequest>> = vec![Vec::new(); edges.len()];

        for (i, client) in clients.iter().enumerate() {
            let update = self.client_update(round, client);
            edge_buckets[i / self.config.clients_per_edge].push(update.clone());
            self.log(Role::Client, update).await?;
        }

        let mut central_bucket = Vec::new();
        for (edge, bucket) in edges.iter().zip(&edge_buckets) {
            let update = average(edge, round, bucket);
            central_bucket.push(update.clone());
            self.log(Role::Edge, update).await?;
        }

        self.log(Role::Central, average("Central", round, &central_bucket))
            .await?;
        debug!(round, "round reported");
        Ok(())
    }

    /// Register the experiment and play every round at the configured pace.
    pub async fn run(mut self) -> Result<(), SimError> {
        self.setup().await?;
        for round in 1..=self.config.rounds {
            self.run_round(round).await?;
            tokio::time::sleep(self.config.pace).await;
        }
        info!(exp_id = %self.exp_id, rounds = self.config.rounds, "run complete");
        Ok(())
    }

    async fn log(&self, role: Role, request: LogMetricRequest) -> Result<(), SimError> {
        let sample = self
            .store
            .write()
            .await
            .add_metric(&self.exp_id, role, request)?;
        broadcast_sample(&self.feed, &sample);
        Ok(())
    }

    fn client_update(&mut self, round: u64, device: &str) -> LogMetricRequest {
        let base = 0.3 + 0.075 * round as f64;
        let accuracy = round4(self.rng.gen_range(base..base + 0.05).min(1.0));
        let loss = round4(1.0 - accuracy + self.rng.gen_range(0.01..0.02));
        LogMetricRequest {
            device: device.to_string(),
            round,
            accuracy,
            loss,
        }
    }

    fn metadata(&self) -> Metadata {
        [
            ("num_clients", serde_json::json!(self.config.num_clients)),
            ("rounds", serde_json::json!(self.config.rounds)),
            ("averaging algorithm", serde_json::json!("FedAvg")),
            ("model", serde_json::json!("lenet")),
            ("dataset", serde_json::json!("mnist")),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    /// Flat node map: one coordinator, edges listening for their clients.
    fn topology(&self) -> NodeMap {
        let host = "127.0.0.1".to_string();
        let mut nodes = NodeMap::new();

        nodes.insert(
            "Central".to_string(),
            NodeDescription {
                kind: NodeKind::Server,
                host: host.clone(),
                port: Some(COORDINATOR_PORT),
                partition_id: None,
                server: None,
                client: None,
            },
        );

        for (e, edge) in self.edge_names().iter().enumerate() {
            nodes.insert(
                edge.clone(),
                NodeDescription {
                    kind: NodeKind::Edge,
                    host: host.clone(),
                    port: None,
                    partition_id: None,
                    server: Some(Endpoint {
                        host: host.clone(),
                        port: COORDINATOR_PORT,
                    }),
                    client: Some(Endpoint {
                        host: host.clone(),
                        port: listen_port(e),
                    }),
                },
            );
        }

        for (i, client) in self.client_names().iter().enumerate() {
            nodes.insert(
                client.clone(),
                NodeDescription {
                    kind: NodeKind::Client,
                    host: host.clone(),
                    port: Some(listen_port(i / self.config.clients_per_edge)),
                    partition_id: Some(i as u32),
                    server: None,
                    client: None,
                },
            );
        }

        nodes
    }

    fn client_names(&self) -> Vec<String> {
        (0..self.config.num_clients)
            .map(|i| format!("Client-{i}"))
            .collect()
    }

    fn edge_names(&self) -> Vec<String> {
        (0..self.edge_count()).map(|i| format!("Edge-{i}")).collect()
    }

    fn edge_count(&self) -> usize {
        self.config.num_clients.div_ceil(self.config.clients_per_edge)
    }
}

const COORDINATOR_PORT: u16 = 7000;

fn listen_port(edge_index: usize) -> u16 {
    9000 + edge_index as u16
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn average(device: &str, round: u64, updates: &[LogMetricRequest]) -> LogMetricRequest {
    let count = updates.len().max(1) as f64;
    LogMetricRequest {
        device: device.to_string(),
        round,
        accuracy: round4(updates.iter().map(|u| u.accuracy).sum::<f64>() / count),
        loss: round4(updates.iter().map(|u| u.loss).sum::<f64>() / count),
    }
}

/// Label histograms every client reports, mirroring an MNIST split.
fn loader_fixture() -> BTreeMap<String, LoaderDistribution> {
    [
        (
            "trainloader",
            loader(
                [1201, 1349, 1197, 1296, 1143, 1086, 1171, 1232, 1161, 1164],
                12000,
            ),
        ),
        (
            "valloader",
            loader([303, 360, 293, 305, 304, 260, 305, 300, 275, 295], 3000),
        ),
        (
            "testloader",
            loader([980, 1135, 1032, 1010, 982, 892, 958, 1028, 974, 1009], 10000),
        ),
    ]
    .into_iter()
    .map(|(id, dist)| (id.to_string(), dist))
    .collect()
}

fn loader(counts: [u64; 10], num_items: u64) -> LoaderDistribution {
    LoaderDistribution {
        label_distribution: counts
            .iter()
            .enumerate()
            .map(|(label, count)| (label.to_string(), *count))
            .collect(),
        num_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(config: GeneratorConfig) -> (RoundGenerator, Arc<RwLock<SimStore>>) {
        let store = Arc::new(RwLock::new(SimStore::new()));
        let (feed, _) = broadcast::channel(64);
        let generator = RoundGenerator::new(config, store.clone(), feed);
        (generator, store)
    }

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            seed: Some(7),
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_exp_id_shape_and_seeded_determinism() {
        let (a, _) = seeded(config());
        let (b, _) = seeded(config());
        assert!(a.exp_id().starts_with("test-exp-"));
        assert_eq!(a.exp_id(), b.exp_id());
    }

    #[tokio::test]
    async fn test_setup_registers_everything() {
        let (mut generator, store) = seeded(config());
        generator.setup().await.unwrap();
        let exp_id = generator.exp_id().to_string();

        let store = store.read().await;
        assert_eq!(store.list_experiments(), vec![exp_id.clone()]);
        assert_eq!(store.metadata(&exp_id).unwrap()["dataset"], "mnist");
        assert_eq!(store.distributions(&exp_id).unwrap()[&Role::Client].len(), 8);

        let topology = store.topology(&exp_id).unwrap();
        assert_eq!(topology.len(), 1 + 2 + 8);
        assert_eq!(topology["Central"].kind, NodeKind::Server);
        // Client ports line up with their edge's listener.
        let listener = topology["Edge-1"].client.as_ref().unwrap().port;
        assert_eq!(topology["Client-4"].port, Some(listener));
    }

    #[tokio::test]
    async fn test_round_reports_every_tier() {
        let (mut generator, store) = seeded(config());
        generator.setup().await.unwrap();
        generator.run_round(1).await.unwrap();
        let exp_id = generator.exp_id().to_string();

        let metrics = store.read().await.metrics(&exp_id).unwrap();
        assert_eq!(metrics[&Role::Client].len(), 8);
        assert_eq!(metrics[&Role::Edge].len(), 2);
        assert_eq!(metrics[&Role::Central]["Central"].len(), 1);

        // Edge accuracy is the mean of its clients, up to 4dp rounding.
        let edge0 = metrics[&Role::Edge]["Edge-0"][0].accuracy;
        let client_mean: f64 = (0..4)
            .map(|i| metrics[&Role::Client][&format!("Client-{i}")][0].accuracy)
            .sum::<f64>()
            / 4.0;
        assert!((edge0 - client_mean).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_accuracy_stays_in_unit_range() {
        let mut cfg = config();
        cfg.rounds = 12;
        let (mut generator, store) = seeded(cfg);
        generator.setup().await.unwrap();
        for round in 1..=12 {
            generator.run_round(round).await.unwrap();
        }
        let exp_id = generator.exp_id().to_string();

        let metrics = store.read().await.metrics(&exp_id).unwrap();
        for devices in metrics.values() {
            for samples in devices.values() {
                for sample in samples {
                    assert!((0.0..=1.0).contains(&sample.accuracy));
                    assert!(sample.loss >= 0.0);
                }
            }
        }
    }
}
