//! Live metric feed.
//!
//! The backend pushes one JSON-encoded sample per text frame. Frames that do
//! not parse as a sample are logged and skipped; whether a sample's
//! experiment exists is the store's call, not the feed's.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use fedscope_protocol::{MetricSample, TUNNEL_WARNING_HEADER};
use fedscope_store::StoreHandle;

use crate::client::BackendError;
use crate::config::BackendConfig;

/// An established feed connection that is not forwarding yet.
///
/// Splitting connect from run lets a supervisor report the connection as
/// live before the first sample arrives.
pub struct MetricFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

/// Open the WebSocket feed described by `config`.
pub async fn connect_metric_feed(config: &BackendConfig) -> Result<MetricFeed, BackendError> {
    let feed_error = |source| BackendError::Feed {
        url: config.ws_url.clone(),
        source,
    };

    let mut request = config
        .ws_url
        .as_str()
        .into_client_request()
        .map_err(feed_error)?;
    if config.tunnel_header {
        request
            .headers_mut()
            .insert(TUNNEL_WARNING_HEADER, HeaderValue::from_static("true"));
    }

    let (stream, _) = connect_async(request).await.map_err(feed_error)?;
    debug!(url = %config.ws_url, "metric feed connected");

    Ok(MetricFeed {
        stream,
        url: config.ws_url.clone(),
    })
}

impl MetricFeed {
    /// Forward samples into the store until the stream ends.
    ///
    /// Returns `Ok(())` when the server closes the stream; reconnecting is
    /// the caller's decision. Returns early if the store task is gone.
    pub async fn run(self, store: &StoreHandle) -> Result<(), BackendError> {
        let MetricFeed { stream, url } = self;
        let feed_error = |source| BackendError::Feed {
            url: url.clone(),
            source,
        };

        // The write half stays unused; the feed is push-only.
        let (_write, mut read) = stream.split();

        while let Some(frame) = read.next().await {
            match frame.map_err(feed_error)? {
                Message::Text(text) => match serde_json::from_str::<MetricSample>(&text) {
                    Ok(sample) => store.ingest(sample).await?,
                    Err(error) => warn!(error = %error, "skipping malformed feed frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        debug!("metric feed closed");
        Ok(())
    }
}

/// Connect and forward in one call.
pub async fn run_metric_feed(
    config: &BackendConfig,
    store: &StoreHandle,
) -> Result<(), BackendError> {
    connect_metric_feed(config).await?.run(store).await
}
