//! Core data model for fedscope.
//!
//! Everything the backend puts on the wire lives here: metric samples and
//! the series keys derived from them, topology node descriptions, data-loader
//! label distributions, and the request bodies of the ingest surface. The
//! other crates depend on this one and nothing else in the workspace.

pub mod messages;
pub mod types;

pub use messages::{LogMetricRequest, UploadDistributionRequest};
pub use types::{
    DistributionMap, DistributionsByRole, Endpoint, LoaderDistribution, Metadata, MetricSample,
    NodeDescription, NodeKind, NodeMap, ProtocolError, RawMetricsByRole, Role, SeriesKey,
    DEFAULT_HTTP_BASE, DEFAULT_WS_URL, TUNNEL_WARNING_HEADER,
};
