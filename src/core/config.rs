//! Configuration management for the protocol server.
//!
//! Values come from defaults overridden by `MCP_`-prefixed environment
//! variables (a `.env` file is honoured through `dotenvy`).

use super::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::domains::protocols::DEFAULT_MAX_ENDPOINTS;

/// Main configuration structure for the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Protocol validation, loading and invocation settings.
    pub protocols: ProtocolsConfig,

    /// Where generated tools look up API credentials.
    pub credentials: CredentialsConfig,

    /// Pull-request submission intake.
    pub submissions: SubmissionConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

/// Protocol pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    /// Directory scanned for `*.json` protocol files at startup.
    pub directory: Option<PathBuf>,

    /// Enforce `allowed_domains` on every declared URL.
    pub strict_mode: bool,

    /// Maximum endpoints per protocol.
    pub max_endpoints: usize,

    /// Hosts (and their subdomains) endpoints may target in strict mode.
    pub allowed_domains: Vec<String>,

    /// Lifetime of a cached compiled artifact.
    pub cache_ttl_secs: u64,

    /// Upper bound on fetching and validating one source.
    pub validation_timeout_secs: u64,

    /// Upper bound on one outbound tool call.
    pub invocation_timeout_secs: u64,

    /// Largest protocol document accepted from any source.
    pub max_source_bytes: usize,

    /// Largest upstream response body a tool call will read.
    pub max_response_bytes: usize,
}

impl ProtocolsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            directory: Some(PathBuf::from("protocols")),
            strict_mode: false,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            allowed_domains: Vec::new(),
            cache_ttl_secs: 3_600,
            validation_timeout_secs: 30,
            invocation_timeout_secs: 30,
            max_source_bytes: 1024 * 1024,
            max_response_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Credential lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Prefix of the per-protocol variables, e.g. `PROTOCOL_WEATHER_API_API_KEY`.
    pub env_prefix: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_prefix: "PROTOCOL".to_string(),
        }
    }
}

/// Submission gateway configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// `owner/repo` receiving protocol pull requests.
    pub repository: Option<String>,

    /// Base URL of the GitHub REST API.
    pub api_url: String,

    /// Token used to read files, comment and merge.
    pub token: Option<String>,

    /// Shared secret for `X-Hub-Signature-256` verification.
    pub webhook_secret: Option<String>,

    /// Merge pull requests whose protocols validate cleanly.
    pub auto_merge: bool,

    /// Only changed files under this prefix are treated as protocols.
    pub protocols_path_prefix: String,
}

impl SubmissionConfig {
    /// Whether enough is configured to talk to the repository.
    pub fn is_enabled(&self) -> bool {
        self.repository.is_some() && self.token.is_some()
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            repository: None,
            api_url: "https://api.github.com".to_string(),
            token: None,
            webhook_secret: None,
            auto_merge: false,
            protocols_path_prefix: "protocols/".to_string(),
        }
    }
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for SubmissionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionConfig")
            .field("repository", &self.repository)
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auto_merge", &self.auto_merge)
            .field("protocols_path_prefix", &self.protocols_path_prefix)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "protocol-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_timestamps: true,
            },
            transport: TransportConfig::default(),
            protocols: ProtocolsConfig::default(),
            credentials: CredentialsConfig::default(),
            submissions: SubmissionConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`.
    /// For example: `MCP_SERVER_NAME`, `MCP_STRICT_MODE`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.transport = TransportConfig::from_env();

        let protocols = &mut config.protocols;
        if let Ok(dir) = std::env::var("MCP_PROTOCOLS_DIR") {
            protocols.directory = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(strict) = env_flag("MCP_STRICT_MODE") {
            protocols.strict_mode = strict;
        }
        if let Some(max) = env_parse("MCP_MAX_ENDPOINTS") {
            protocols.max_endpoints = max;
        }
        if let Ok(domains) = std::env::var("MCP_ALLOWED_DOMAINS") {
            protocols.allowed_domains = split_list(&domains);
        }
        if let Some(ttl) = env_parse("MCP_CACHE_TTL_SECS") {
            protocols.cache_ttl_secs = ttl;
        }
        if let Some(secs) = env_parse("MCP_VALIDATION_TIMEOUT_SECS") {
            protocols.validation_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("MCP_INVOCATION_TIMEOUT_SECS") {
            protocols.invocation_timeout_secs = secs;
        }
        if let Some(bytes) = env_parse("MCP_MAX_SOURCE_BYTES") {
            protocols.max_source_bytes = bytes;
        }
        if let Some(bytes) = env_parse("MCP_MAX_RESPONSE_BYTES") {
            protocols.max_response_bytes = bytes;
        }

        if protocols.strict_mode && protocols.allowed_domains.is_empty() {
            warn!("MCP_STRICT_MODE is on but MCP_ALLOWED_DOMAINS is empty - no host allow-list applies");
        }

        if let Ok(prefix) = std::env::var("MCP_CREDENTIALS_PREFIX") {
            config.credentials.env_prefix = prefix;
        }

        let submissions = &mut config.submissions;
        submissions.repository = std::env::var("MCP_SUBMISSIONS_REPOSITORY").ok();
        if let Ok(url) = std::env::var("MCP_GITHUB_API_URL") {
            submissions.api_url = url;
        }
        submissions.token = std::env::var("MCP_GITHUB_TOKEN").ok();
        submissions.webhook_secret = std::env::var("MCP_WEBHOOK_SECRET").ok();
        if let Some(auto_merge) = env_flag("MCP_AUTO_MERGE") {
            submissions.auto_merge = auto_merge;
        }
        if let Ok(prefix) = std::env::var("MCP_PROTOCOLS_PATH_PREFIX") {
            submissions.protocols_path_prefix = prefix;
        }

        if submissions.is_enabled() {
            info!(
                "Submission gateway enabled for {}",
                submissions.repository.as_deref().unwrap_or_default()
            );
            if submissions.webhook_secret.is_none() {
                warn!("MCP_WEBHOOK_SECRET not set - webhook deliveries will be rejected");
            }
        }

        config
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

pub(crate) fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests run serially
    static ENV_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_protocol_settings_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_STRICT_MODE", "true");
            std::env::set_var("MCP_MAX_ENDPOINTS", "12");
            std::env::set_var("MCP_ALLOWED_DOMAINS", "api.example.com, Other.example ,");
            std::env::set_var("MCP_CACHE_TTL_SECS", "not-a-number");
        }
        let config = Config::from_env();
        assert!(config.protocols.strict_mode);
        assert_eq!(config.protocols.max_endpoints, 12);
        assert_eq!(
            config.protocols.allowed_domains,
            vec!["api.example.com", "other.example"]
        );
        assert_eq!(config.protocols.cache_ttl_secs, 3_600);
        unsafe {
            std::env::remove_var("MCP_STRICT_MODE");
            std::env::remove_var("MCP_MAX_ENDPOINTS");
            std::env::remove_var("MCP_ALLOWED_DOMAINS");
            std::env::remove_var("MCP_CACHE_TTL_SECS");
        }
    }

    #[test]
    fn test_submission_settings_from_env() {
        let _lock = ENV_TEST_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("MCP_SUBMISSIONS_REPOSITORY", "acme/protocols");
            std::env::set_var("MCP_GITHUB_TOKEN", "ghp_test");
            std::env::set_var("MCP_AUTO_MERGE", "1");
        }
        let config = Config::from_env();
        assert!(config.submissions.is_enabled());
        assert!(config.submissions.auto_merge);
        unsafe {
            std::env::remove_var("MCP_SUBMISSIONS_REPOSITORY");
            std::env::remove_var("MCP_GITHUB_TOKEN");
            std::env::remove_var("MCP_AUTO_MERGE");
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.protocols.max_endpoints, 50);
        assert_eq!(config.protocols.cache_ttl(), Duration::from_secs(3_600));
        assert!(!config.protocols.strict_mode);
        assert!(!config.submissions.auto_merge);
        assert!(!config.submissions.is_enabled());
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let submissions = SubmissionConfig {
            token: Some("ghp_super_secret".to_string()),
            webhook_secret: Some("hook_secret".to_string()),
            ..Default::default()
        };
        let debug_str = format!("{:?}", submissions);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("ghp_super_secret"));
        assert!(!debug_str.contains("hook_secret"));
    }
}
