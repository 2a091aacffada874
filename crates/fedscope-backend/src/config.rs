//! Backend connection settings.

use std::time::Duration;

use serde::Deserialize;

use fedscope_protocol::{DEFAULT_HTTP_BASE, DEFAULT_WS_URL};

/// Where and how to reach the monitoring backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL for the REST endpoints.
    #[serde(default = "default_http_base")]
    pub http_base: String,

    /// WebSocket URL for the live metric feed.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Per-request timeout. Default: 10s.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Send the tunnel warning-suppression header with every request.
    /// Only relevant when the backend sits behind an ngrok-style tunnel.
    #[serde(default = "default_tunnel_header")]
    pub tunnel_header: bool,
}

fn default_http_base() -> String {
    DEFAULT_HTTP_BASE.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_tunnel_header() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            http_base: default_http_base(),
            ws_url: default_ws_url(),
            request_timeout: default_request_timeout(),
            tunnel_header: default_tunnel_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BackendConfig::default();
        assert_eq!(cfg.http_base, "http://127.0.0.1:8000");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert!(cfg.tunnel_header);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: BackendConfig =
            toml::from_str("http_base = \"https://demo.ngrok.app\"\nrequest_timeout = \"3s\"")
                .unwrap();
        assert_eq!(cfg.http_base, "https://demo.ngrok.app");
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
        assert!(cfg.tunnel_header);
    }

    #[test]
    fn test_tunnel_header_can_be_disabled() {
        let cfg: BackendConfig = toml::from_str("tunnel_header = false").unwrap();
        assert!(!cfg.tunnel_header);
    }
}
