//! Dynamic Loader: sources to compiled, validated artifacts.
//!
//! A source is read (file, HTTPS URL or inline text), parsed, validated and
//! compiled into tools. Reading is bounded by the validation timeout.
//! Artifacts are cached by source for a TTL; the cache key of inline
//! content includes a digest of the content, so changed text never hits a
//! stale entry. Loading never touches the live registry.
//!
//! A load runs in two steps, [`DynamicLoader::prepare`] and
//! [`DynamicLoader::finish`], so callers can act on the declared protocol
//! name between reading and compiling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::LoadError;
use super::naming;
use super::validator::{ProtocolValidator, ValidatedProtocol, ValidationReport, ValidatorConfig};
use crate::core::config::ProtocolsConfig;
use crate::core::security::validate_url;
use crate::domains::tools::executor::read_limited;
use crate::domains::tools::{ExecutorError, GeneratedTool, ToolContext, generate_tools};

/// Where a protocol document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProtocolSource {
    File {
        path: PathBuf,
    },
    Url {
        url: String,
    },
    /// Content already in hand, e.g. a pull-request file.
    Inline {
        origin: String,
        #[serde(skip)]
        content: String,
    },
}

impl ProtocolSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn inline(origin: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            origin: origin.into(),
            content: content.into(),
        }
    }

    /// Human-readable origin used in logs and errors.
    pub fn origin(&self) -> String {
        match self {
            Self::File { path } => path.display().to_string(),
            Self::Url { url } => url.clone(),
            Self::Inline { origin, .. } => origin.clone(),
        }
    }

    fn cache_key(&self) -> String {
        match self {
            Self::File { path } => format!("file:{}", path.display()),
            Self::Url { url } => format!("url:{url}"),
            Self::Inline { origin, content } => {
                format!("inline:{origin}:{}", hex::encode(Sha256::digest(content.as_bytes())))
            }
        }
    }
}

impl fmt::Display for ProtocolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())
    }
}

/// Downloads the bytes of URL sources.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `url`, failing once the body grows past `limit` bytes.
    async fn fetch(&self, url: &Url, limit: usize) -> Result<Vec<u8>, LoadError>;
}

/// `reqwest`-backed fetcher. Redirects are refused.
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: Client,
}

impl HttpSourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LoadError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, url: &Url, limit: usize) -> Result<Vec<u8>, LoadError> {
        let fetch_error = |message: String| LoadError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }

        read_limited(response, limit).await.map_err(|e| match e {
            ExecutorError::TooLarge { .. } => LoadError::TooLarge {
                origin: url.to_string(),
                limit,
            },
            other => fetch_error(other.to_string()),
        })
    }
}

/// A source read far enough to know which protocol it declares.
///
/// Produced by [`DynamicLoader::prepare`]; [`DynamicLoader::finish`] turns
/// it into an artifact.
#[derive(Debug)]
pub struct PreparedSource {
    source: ProtocolSource,
    key: String,
    stage: Stage,
}

#[derive(Debug)]
enum Stage {
    Cached(Box<LoadedArtifact>),
    Parsed(Value),
}

impl PreparedSource {
    pub fn source(&self) -> &ProtocolSource {
        &self.source
    }

    /// The declared protocol name, only when it is well formed.
    pub fn declared_name(&self) -> Option<&str> {
        let name = match &self.stage {
            Stage::Cached(artifact) => artifact.name(),
            Stage::Parsed(raw) => raw.get("name")?.as_str()?,
        };
        naming::is_protocol_name(name).then_some(name)
    }
}

/// A validated protocol together with its compiled tools.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub protocol: ValidatedProtocol,
    pub tools: Vec<GeneratedTool>,
    pub report: ValidationReport,
    pub source: ProtocolSource,
    pub compiled_at: DateTime<Utc>,
}

impl LoadedArtifact {
    pub fn name(&self) -> &str {
        self.protocol.name()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }
}

/// Loader limits.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub cache_ttl: Duration,
    pub validation_timeout: Duration,
    pub max_source_bytes: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        (&ProtocolsConfig::default()).into()
    }
}

impl From<&ProtocolsConfig> for LoaderConfig {
    fn from(config: &ProtocolsConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl(),
            validation_timeout: config.validation_timeout(),
            max_source_bytes: config.max_source_bytes,
        }
    }
}

struct CacheEntry {
    artifact: LoadedArtifact,
    stored_at: Instant,
}

/// Loads protocol sources into compiled artifacts.
pub struct DynamicLoader {
    validator: ProtocolValidator,
    context: ToolContext,
    config: LoaderConfig,
    fetcher: Arc<dyn SourceFetcher>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl DynamicLoader {
    pub fn new(
        validator: ProtocolValidator,
        context: ToolContext,
        config: LoaderConfig,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            validator,
            context,
            config,
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a loader from the protocol settings, fetching URLs over HTTPS.
    pub fn from_config(config: &ProtocolsConfig, context: ToolContext) -> Result<Self, LoadError> {
        let fetcher = HttpSourceFetcher::new(config.validation_timeout())?;
        Ok(Self::new(
            ProtocolValidator::new(ValidatorConfig::from(config)),
            context,
            LoaderConfig::from(config),
            Arc::new(fetcher),
        ))
    }

    pub fn validator(&self) -> &ProtocolValidator {
        &self.validator
    }

    /// Collaborators handed to every compiled tool.
    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Load `source`, serving a fresh cached artifact when one exists.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn load(&self, source: &ProtocolSource) -> Result<LoadedArtifact, LoadError> {
        let prepared = self.prepare(source).await?;
        self.finish(prepared)
    }

    /// Load `source`, bypassing and refreshing the cache.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn reload(&self, source: &ProtocolSource) -> Result<LoadedArtifact, LoadError> {
        self.remove_cached(&source.cache_key());
        let prepared = self.read(source, source.cache_key()).await?;
        self.finish(prepared)
    }

    /// First half of a load: serve a fresh cached artifact, or read and
    /// parse the source. Reading is bounded by the validation timeout.
    pub async fn prepare(&self, source: &ProtocolSource) -> Result<PreparedSource, LoadError> {
        let key = source.cache_key();
        if let Some(artifact) = self.cached(&key) {
            debug!(source = %source, "Protocol cache hit");
            return Ok(PreparedSource {
                source: source.clone(),
                key,
                stage: Stage::Cached(Box::new(artifact)),
            });
        }
        self.read(source, key).await
    }

    /// Second half of a load: validate, compile and cache.
    pub fn finish(&self, prepared: PreparedSource) -> Result<LoadedArtifact, LoadError> {
        let PreparedSource { source, key, stage } = prepared;
        let raw = match stage {
            Stage::Cached(artifact) => return Ok(*artifact),
            Stage::Parsed(raw) => raw,
        };

        let artifact = self.compile(&source, &raw)?;
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).insert(
            key,
            CacheEntry {
                artifact: artifact.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(artifact)
    }

    /// Load many sources concurrently. One failure never affects the others.
    pub async fn load_batch(
        &self,
        sources: Vec<ProtocolSource>,
    ) -> Vec<(ProtocolSource, Result<LoadedArtifact, LoadError>)> {
        let results = join_all(sources.iter().map(|source| self.load(source))).await;
        sources.into_iter().zip(results).collect()
    }

    /// Protocol files (`*.json`) directly inside `dir`, sorted by path.
    pub async fn discover(&self, dir: &Path) -> Result<Vec<ProtocolSource>, LoadError> {
        let io_error = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            if is_json && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths.into_iter().map(ProtocolSource::file).collect())
    }

    /// Discover and load every protocol file in `dir`.
    pub async fn load_directory(
        &self,
        dir: &Path,
    ) -> Result<Vec<(ProtocolSource, Result<LoadedArtifact, LoadError>)>, LoadError> {
        let sources = self.discover(dir).await?;
        info!("Loading {} protocol file(s) from {}", sources.len(), dir.display());
        Ok(self.load_batch(sources).await)
    }

    /// Drop the cached artifact for `source`. Returns whether one existed.
    pub fn invalidate(&self, source: &ProtocolSource) -> bool {
        self.remove_cached(&source.cache_key())
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of cached artifacts, expired ones included.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn cached(&self, key: &str) -> Option<LoadedArtifact> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.config.cache_ttl => {
                Some(entry.artifact.clone())
            }
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn remove_cached(&self, key: &str) -> bool {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some()
    }

    async fn read(&self, source: &ProtocolSource, key: String) -> Result<PreparedSource, LoadError> {
        let after = self.config.validation_timeout;
        let bytes = tokio::time::timeout(after, self.fetch(source))
            .await
            .map_err(|_| LoadError::Timeout {
                origin: source.origin(),
                after,
            })??;

        let raw = serde_json::from_slice(&bytes).map_err(|e| LoadError::MalformedJson {
            origin: source.origin(),
            message: e.to_string(),
        })?;
        Ok(PreparedSource {
            source: source.clone(),
            key,
            stage: Stage::Parsed(raw),
        })
    }

    fn compile(&self, source: &ProtocolSource, raw: &Value) -> Result<LoadedArtifact, LoadError> {
        let origin = source.origin();
        let (protocol, report) =
            self.validator
                .validate_protocol(raw)
                .map_err(|report| LoadError::Validation {
                    origin: origin.clone(),
                    protocol_name: raw.get("name").and_then(Value::as_str).map(str::to_string),
                    report,
                })?;

        let tools = generate_tools(&protocol, &self.context).map_err(|e| LoadError::Compile {
            origin: origin.clone(),
            protocol: protocol.name().to_string(),
            message: e.to_string(),
        })?;

        for warning in &report.warnings {
            warn!(protocol = protocol.name(), "{}", warning);
        }
        info!(
            protocol = protocol.name(),
            version = %protocol.definition().version,
            tools = tools.len(),
            "Compiled protocol from {}",
            origin
        );

        Ok(LoadedArtifact {
            protocol,
            tools,
            report,
            source: source.clone(),
            compiled_at: Utc::now(),
        })
    }

    async fn fetch(&self, source: &ProtocolSource) -> Result<Vec<u8>, LoadError> {
        let limit = self.config.max_source_bytes;
        let too_large = || LoadError::TooLarge {
            origin: source.origin(),
            limit,
        };

        match source {
            ProtocolSource::File { path } => {
                let io_error = |source| LoadError::Io {
                    path: path.clone(),
                    source,
                };
                let metadata = tokio::fs::metadata(path).await.map_err(io_error)?;
                if metadata.len() > limit as u64 {
                    return Err(too_large());
                }
                tokio::fs::read(path).await.map_err(io_error)
            }
            ProtocolSource::Url { url } => {
                let parsed = validate_url(url, &[])?;
                self.fetcher.fetch(&parsed, limit).await
            }
            ProtocolSource::Inline { content, .. } => {
                if content.len() > limit {
                    return Err(too_large());
                }
                Ok(content.as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for DynamicLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLoader")
            .field("config", &self.config)
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domains::protocols::validator::fixtures::weather;
    use crate::domains::tools::StaticCredentialProvider;
    use crate::domains::tools::executor::mock::MockExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one document for every URL, optionally after a delay.
    pub struct StaticFetcher {
        body: Vec<u8>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        pub fn new(body: impl Into<Vec<u8>>) -> Self {
            Self {
                body: body.into(),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch(&self, _url: &Url, _limit: usize) -> Result<Vec<u8>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.body.clone())
        }
    }

    pub fn context() -> ToolContext {
        ToolContext::new(
            Arc::new(MockExecutor::ok(200, serde_json::json!({ "ok": true }))),
            Arc::new(StaticCredentialProvider::new()),
        )
    }

    pub fn loader_with(config: LoaderConfig, fetcher: Arc<dyn SourceFetcher>) -> DynamicLoader {
        DynamicLoader::new(ProtocolValidator::default(), context(), config, fetcher)
    }

    pub fn loader() -> DynamicLoader {
        loader_with(
            LoaderConfig::default(),
            Arc::new(StaticFetcher::new(weather().to_string())),
        )
    }
}
