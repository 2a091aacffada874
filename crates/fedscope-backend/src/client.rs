//! REST client for experiment snapshots.

use serde::de::DeserializeOwned;
use thiserror::Error;

use fedscope_protocol::{
    DistributionsByRole, Metadata, NodeMap, RawMetricsByRole, TUNNEL_WARNING_HEADER,
};
use fedscope_store::StoreError;

use crate::config::BackendConfig;

/// Errors surfaced by backend requests and the feed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("building HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("requesting {path}: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {path}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
    },

    #[error("decoding response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metric feed {url}: {source}")]
    Feed {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// HTTP client for the backend's GET surface.
///
/// Every request carries the tunnel warning header so deployments fronted by
/// an ngrok tunnel answer with JSON instead of an interstitial page.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: String,
    tunnel_header: bool,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(BackendError::Build)?;

        Ok(Self {
            http,
            base: config.http_base.trim_end_matches('/').to_string(),
            tunnel_header: config.tunnel_header,
        })
    }

    /// Perform a GET request and deserialize the JSON response.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base, path);

        let mut request = self.http.get(&url);
        if self.tunnel_header {
            request = request.header(TUNNEL_WARNING_HEADER, "true");
        }
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Request {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                path: path.to_string(),
                status,
            });
        }

        response.json().await.map_err(|source| BackendError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Ids of every experiment the backend knows about.
    pub async fn list_experiments(&self) -> Result<Vec<String>, BackendError> {
        self.get_json("/experiments").await
    }

    /// Full metric history of one experiment, nested role → device → samples.
    pub async fn fetch_metrics(&self, exp_id: &str) -> Result<RawMetricsByRole, BackendError> {
        self.get_json(&format!("/experiment/{exp_id}/metrics")).await
    }

    /// Static metadata of one experiment.
    pub async fn fetch_metadata(&self, exp_id: &str) -> Result<Metadata, BackendError> {
        self.get_json(&format!("/experiment/{exp_id}/meta")).await
    }

    /// Data distributions of one experiment, keyed by role.
    pub async fn fetch_distributions(
        &self,
        exp_id: &str,
    ) -> Result<DistributionsByRole, BackendError> {
        self.get_json(&format!("/experiment/{exp_id}/distributions"))
            .await
    }

    /// Flat topology map of one experiment.
    pub async fn fetch_topology(&self, exp_id: &str) -> Result<NodeMap, BackendError> {
        self.get_json(&format!("/experiment/{exp_id}/topology")).await
    }
}
