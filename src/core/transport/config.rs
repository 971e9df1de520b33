//! Transport selection.
//!
//! `MCP_TRANSPORT=http` selects HTTP (when compiled in); anything else
//! falls back to STDIO.

use serde::{Deserialize, Serialize};

#[cfg(feature = "http")]
use crate::core::config::{env_flag, env_parse};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    #[cfg(feature = "stdio")]
    Stdio,

    /// JSON-RPC over POST, protocol listing and the submission webhook.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

#[cfg(feature = "http")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
    /// JSON-RPC route.
    pub rpc_path: String,
    /// Route receiving pull-request webhook deliveries.
    pub webhook_path: String,
    pub enable_cors: bool,
}

#[cfg(feature = "http")]
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            rpc_path: "/mcp".to_string(),
            webhook_path: "/webhooks/submissions".to_string(),
            enable_cors: true,
        }
    }
}

#[cfg(feature = "http")]
impl HttpConfig {
    /// Defaults overridden by `MCP_HTTP_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_parse("MCP_HTTP_PORT") {
            config.port = port;
        }
        if let Ok(host) = std::env::var("MCP_HTTP_HOST") {
            config.host = host;
        }
        if let Ok(path) = std::env::var("MCP_HTTP_PATH") {
            config.rpc_path = path;
        }
        if let Ok(path) = std::env::var("MCP_HTTP_WEBHOOK_PATH") {
            config.webhook_path = path;
        }
        if let Some(cors) = env_flag("MCP_HTTP_CORS") {
            config.enable_cors = cors;
        }
        config
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        #[cfg(feature = "stdio")]
        {
            Self::Stdio
        }

        #[cfg(all(not(feature = "stdio"), feature = "http"))]
        {
            Self::Http(HttpConfig::default())
        }

        #[cfg(not(any(feature = "stdio", feature = "http")))]
        {
            compile_error!("At least one transport feature must be enabled: stdio or http");
        }
    }
}

impl TransportConfig {
    #[cfg(feature = "http")]
    pub fn http(port: u16, host: impl Into<String>) -> Self {
        Self::Http(HttpConfig {
            port,
            host: host.into(),
            ..HttpConfig::default()
        })
    }

    pub fn from_env() -> Self {
        let selected = std::env::var("MCP_TRANSPORT").unwrap_or_default();
        #[cfg(feature = "http")]
        if selected.eq_ignore_ascii_case("http") {
            return Self::Http(HttpConfig::from_env());
        }
        #[cfg(not(feature = "http"))]
        let _ = selected;
        Self::default()
    }

    /// One-line summary for startup logs.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (standard MCP mode)".to_string(),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!(
                "HTTP on {}:{} (rpc {}, webhook {})",
                cfg.host, cfg.port, cfg.rpc_path, cfg.webhook_path
            ),
        }
    }

    pub fn is_stdio(&self) -> bool {
        #[cfg(feature = "stdio")]
        {
            matches!(self, Self::Stdio)
        }
        #[cfg(not(feature = "stdio"))]
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "stdio")]
    #[test]
    fn test_default_is_stdio() {
        let config = TransportConfig::default();
        assert!(config.is_stdio());
        assert_eq!(config.description(), "STDIO (standard MCP mode)");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_http_defaults_include_webhook_route() {
        let TransportConfig::Http(http) = TransportConfig::http(9000, "0.0.0.0") else {
            panic!("expected HTTP transport");
        };
        assert_eq!(http.port, 9000);
        assert_eq!(http.rpc_path, "/mcp");
        assert_eq!(http.webhook_path, "/webhooks/submissions");
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_partial_http_config_deserializes_with_defaults() {
        let config: TransportConfig =
            serde_json::from_value(serde_json::json!({ "type": "http", "port": 3000 })).unwrap();
        assert!(config.description().contains(":3000"));
        assert!(config.description().contains("/webhooks/submissions"));
    }
}
