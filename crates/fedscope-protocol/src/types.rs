//! Shared wire and domain types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header understood by the reverse tunnel fronting deployed backends;
/// suppresses its interstitial warning page on API responses. Operational
/// concern only, not part of the protocol proper.
pub const TUNNEL_WARNING_HEADER: &str = "ngrok-skip-browser-warning";

/// Default backend HTTP base URL for local development.
pub const DEFAULT_HTTP_BASE: &str = "http://127.0.0.1:8000";

/// Default backend WebSocket feed URL for local development.
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";

/// Errors produced when interpreting wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A role string was not one of `client`, `edge`, `central`.
    #[error("unknown role: {0}")]
    InvalidRole(String),
}

/// Tier of a participant in the HFL hierarchy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Leaf trainer.
    Client,
    /// Mid-tier aggregator.
    Edge,
    /// Coordinator at the root of the hierarchy.
    Central,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Edge => "edge",
            Role::Central => "central",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "edge" => Ok(Role::Edge),
            "central" => Ok(Role::Central),
            other => Err(ProtocolError::InvalidRole(other.to_string())),
        }
    }
}

/// One training measurement reported by a participant for one round.
///
/// Immutable once received; the backend serves these both in bulk snapshots
/// (nested role → device → samples) and one at a time on the streaming feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Training round counter; expected non-decreasing per series, not validated.
    pub round: u64,
    /// Model accuracy in [0, 1].
    pub accuracy: f64,
    /// Training loss, non-negative.
    pub loss: f64,
    /// Reporting device name, unique within its role.
    pub device: String,
    /// Reporting tier.
    pub role: Role,
    /// Experiment the sample belongs to.
    pub exp_id: String,
}

impl MetricSample {
    /// Series key the sample lands under: `role + "-" + device`.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(self.role, &self.device)
    }
}

/// Identifies one ordered metric sequence within an experiment.
///
/// Formatted as `role + "-" + device`. Device names may themselves contain
/// `-`, so the role part is everything up to the first separator.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeriesKey(String);

impl SeriesKey {
    pub fn new(role: Role, device: &str) -> Self {
        Self(format!("{}-{}", role.as_str(), device))
    }

    /// Wrap an already-formatted key without validating its prefix.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Role prefix of the key, if it names a known tier.
    pub fn role(&self) -> Option<Role> {
        let (prefix, _) = self.0.split_once('-')?;
        prefix.parse().ok()
    }

    /// Device part of the key (everything after the first separator).
    pub fn device(&self) -> Option<&str> {
        self.0.split_once('-').map(|(_, device)| device)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a topology node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The coordinator; exactly one expected per topology.
    Server,
    /// Mid-tier aggregator.
    Edge,
    /// Leaf trainer.
    Client,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Server => "server",
            NodeKind::Edge => "edge",
            NodeKind::Client => "client",
        }
    }
}

/// A host/port pair referenced by topology nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// One entry of the flat topology map published by the backend.
///
/// Edges carry a `client` endpoint naming the listener their clients dial;
/// a client node belongs to the edge whose `client.port` equals the client's
/// own `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub kind: NodeKind,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<u32>,
    /// Upstream listener this node reports to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Endpoint>,
    /// Downstream listener this node accepts connections on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Endpoint>,
}

/// Label histogram for one data loader.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoaderDistribution {
    /// Item count per label.
    pub label_distribution: BTreeMap<String, u64>,
    /// Total number of items in the loader.
    pub num_items: u64,
}

/// Metrics as served by the backend: role → device → samples in arrival order.
pub type RawMetricsByRole = BTreeMap<Role, BTreeMap<String, Vec<MetricSample>>>;

/// Arbitrary experiment metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Distribution entries for one role: device id → loader id → entry.
pub type DistributionMap = BTreeMap<String, BTreeMap<String, LoaderDistribution>>;

/// Distributions as served by the backend, keyed by role first.
pub type DistributionsByRole = BTreeMap<Role, DistributionMap>;

/// Flat topology map: node id → description.
pub type NodeMap = BTreeMap<String, NodeDescription>;
