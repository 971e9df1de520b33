//! Lifecycle Manager: the set of active protocols and their tools.
//!
//! Per protocol name: absent → loading → active → unloading → absent, with
//! loading → error → loading on failure. Operations on one name run one at a
//! time (a later request waits for the earlier one); different names proceed
//! in parallel.
//!
//! Every request takes a ticket when it is made. A load only learns its
//! protocol name once the source is read, so two loads of one name can
//! reach the name lock out of order; the ticket stored in the lock makes
//! the older one stand down with [`LifecycleError::Superseded`] instead of
//! overwriting the newer result.
//!
//! Installing a protocol is prepare-then-swap: the new tools are compiled
//! and collision-checked first, then a single registry swap replaces the old
//! tool set with the new one. A failed reload leaves the active version in
//! place.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rmcp::model::Tool;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tracing::{info, instrument, warn};

use super::error::LifecycleError;
use super::events::{EventBus, LifecycleEvent};
use super::loader::{DynamicLoader, LoadedArtifact, ProtocolSource};
use super::model::ProtocolDefinition;
use super::naming;
use crate::domains::tools::{GeneratedTool, NameCollision, RateLimiter, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolStatus {
    Loading,
    Active,
    Error,
    Unloading,
}

/// Registry record for one protocol name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedProtocol {
    pub name: String,
    pub version: Option<String>,
    #[serde(skip)]
    pub definition: Option<Arc<ProtocolDefinition>>,
    /// Exactly the tool names this protocol registered.
    pub tools: Vec<String>,
    pub status: ProtocolStatus,
    pub loaded_at: DateTime<Utc>,
    pub source: ProtocolSource,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl LoadedProtocol {
    fn active(artifact: &LoadedArtifact) -> Self {
        let definition = artifact.protocol.definition().clone();
        Self {
            name: definition.name.clone(),
            version: Some(definition.version.clone()),
            definition: Some(definition),
            tools: artifact.tool_names(),
            status: ProtocolStatus::Active,
            loaded_at: Utc::now(),
            source: artifact.source.clone(),
            warnings: artifact.report.warning_messages(),
            errors: Vec::new(),
        }
    }

    fn failed(name: String, source: ProtocolSource, errors: Vec<String>) -> Self {
        Self {
            name,
            version: None,
            definition: None,
            tools: Vec::new(),
            status: ProtocolStatus::Error,
            loaded_at: Utc::now(),
            source,
            warnings: Vec::new(),
            errors,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProtocolStatus::Active
    }
}

/// Outcome of loading one source in a batch.
pub type BatchResult = Vec<(ProtocolSource, Result<LoadedProtocol, LifecycleError>)>;

/// Per-name lock. Holds the ticket of the last operation applied to the name.
type NameSlot = Arc<AsyncMutex<u64>>;

pub struct LifecycleManager {
    loader: Arc<DynamicLoader>,
    registry: Arc<ToolRegistry>,
    rate_limiter: Arc<RateLimiter>,
    protocols: RwLock<BTreeMap<String, LoadedProtocol>>,
    slots: Mutex<HashMap<String, NameSlot>>,
    next_ticket: AtomicU64,
    /// Tickets whose request does not hold its name slot yet.
    unsettled: Mutex<BTreeSet<u64>>,
    events: EventBus,
}

impl LifecycleManager {
    pub fn new(loader: DynamicLoader) -> Self {
        let rate_limiter = loader.context().rate_limiter.clone();
        Self {
            loader: Arc::new(loader),
            registry: Arc::new(ToolRegistry::new()),
            rate_limiter,
            protocols: RwLock::new(BTreeMap::new()),
            slots: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            unsettled: Mutex::new(BTreeSet::new()),
            events: EventBus::default(),
        }
    }

    /// Publish on an existing bus instead of a private one.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Load `source` and make its tools live.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn load(&self, source: ProtocolSource) -> Result<LoadedProtocol, LifecycleError> {
        let ticket = self.issue_ticket();
        let prepared = match self.loader.prepare(&source).await {
            Ok(prepared) => prepared,
            Err(error) => {
                self.settle(ticket);
                return Err(self.record_failure(None, &source, error.into()));
            }
        };

        // Without a well-formed name there is nothing to lock or record;
        // validation rejects the document.
        let Some(name) = prepared.declared_name().map(str::to_string) else {
            self.settle(ticket);
            return match self.loader.finish(prepared) {
                Ok(artifact) => self.install(artifact).await,
                Err(error) => Err(self.record_failure(None, &source, error.into())),
            };
        };

        self.sequenced(&name, ticket, || {
            let previous_active = self.get(&name).is_some_and(|p| p.is_active());
            if !previous_active {
                self.set_or_insert_loading(&name, &source);
            }
            match self.loader.finish(prepared) {
                Ok(artifact) => self.install_locked(artifact),
                Err(error) => Err(self.record_failure(Some(name.clone()), &source, error.into())),
            }
        })
        .await
    }

    /// Make an already compiled artifact live.
    pub async fn install(&self, artifact: LoadedArtifact) -> Result<LoadedProtocol, LifecycleError> {
        let ticket = self.issue_ticket();
        let name = artifact.name().to_string();
        self.sequenced(&name, ticket, || self.install_locked(artifact)).await
    }

    /// Recompile `name` from the source it was loaded from.
    #[instrument(skip(self))]
    pub async fn reload(&self, name: &str) -> Result<LoadedProtocol, LifecycleError> {
        let ticket = self.issue_ticket();
        let slot = self.slot(name);
        self.settle(ticket);
        let mut last = slot.lock().await;

        let outcome = if *last > ticket {
            Err(LifecycleError::Superseded(name.to_string()))
        } else {
            self.reload_locked(name).await
        };
        if outcome.is_ok() {
            *last = ticket;
        }
        drop(last);
        self.release(name, slot);
        outcome
    }

    /// Remove `name` and exactly the tools it registered.
    #[instrument(skip(self))]
    pub async fn unload(&self, name: &str) -> Result<LoadedProtocol, LifecycleError> {
        let ticket = self.issue_ticket();
        self.sequenced(name, ticket, || self.unload_locked(name)).await
    }

    /// Load every protocol file in `dir`. One bad file never blocks the rest.
    pub async fn load_directory(&self, dir: &Path) -> Result<BatchResult, LifecycleError> {
        let sources = self.loader.discover(dir).await?;
        let results = self.load_batch(sources).await;
        let loaded = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            "Loaded {}/{} protocol(s) from {}",
            loaded,
            results.len(),
            dir.display()
        );
        Ok(results)
    }

    pub async fn load_batch(&self, sources: Vec<ProtocolSource>) -> BatchResult {
        let results = join_all(sources.iter().cloned().map(|source| self.load(source))).await;
        sources.into_iter().zip(results).collect()
    }

    pub fn list(&self) -> Vec<LoadedProtocol> {
        self.read_protocols().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<LoadedProtocol> {
        self.read_protocols().get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Option<ProtocolStatus> {
        self.read_protocols().get(name).map(|p| p.status)
    }

    /// A live tool by name.
    pub fn tool(&self, name: &str) -> Option<GeneratedTool> {
        self.registry.get(name)
    }

    /// MCP descriptors of every live tool.
    pub fn tools(&self) -> Vec<Tool> {
        self.registry.list()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<DynamicLoader> {
        &self.loader
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn install_locked(&self, artifact: LoadedArtifact) -> Result<LoadedProtocol, LifecycleError> {
        let name = artifact.name().to_string();
        let previous = self.get(&name).filter(LoadedProtocol::is_active);
        if previous.is_none() {
            self.set_or_insert_loading(&name, &artifact.source);
        }

        let old_tools = previous.as_ref().map(|p| p.tools.clone()).unwrap_or_default();
        if let Err(NameCollision(tools)) =
            self.registry.replace(&old_tools, &name, artifact.tools.clone())
        {
            let error = LifecycleError::ToolNameCollision {
                protocol: name.clone(),
                tools,
            };
            return Err(self.record_failure(Some(name), &artifact.source, error));
        }

        let entry = LoadedProtocol::active(&artifact);
        self.write_protocols().insert(name.clone(), entry.clone());

        let previous_version = previous.and_then(|p| p.version);
        info!(
            protocol = %name,
            version = entry.version.as_deref().unwrap_or_default(),
            previous = previous_version.as_deref().unwrap_or("none"),
            tools = entry.tools.len(),
            "Protocol active"
        );
        self.events.publish(LifecycleEvent::ProtocolLoaded {
            name,
            version: artifact.protocol.definition().version.clone(),
            tools: entry.tools.clone(),
            previous_version,
        });
        Ok(entry)
    }

    /// Log, record and publish a failure. An active protocol stays active.
    fn record_failure(
        &self,
        name: Option<String>,
        source: &ProtocolSource,
        error: LifecycleError,
    ) -> LifecycleError {
        let name = name.filter(|n| naming::is_protocol_name(n));
        let errors = error.messages();
        warn!(
            protocol = name.as_deref().unwrap_or("<unknown>"),
            source = %source,
            "Protocol load failed: {}",
            error
        );

        if let Some(name) = &name {
            let mut protocols = self.write_protocols();
            match protocols.get_mut(name) {
                Some(entry) if entry.is_active() => {}
                _ => {
                    protocols.insert(
                        name.clone(),
                        LoadedProtocol::failed(name.clone(), source.clone(), errors.clone()),
                    );
                }
            }
        }

        self.events.publish(LifecycleEvent::ProtocolError {
            name,
            origin: source.origin(),
            errors,
        });
        error
    }

    fn set_status(&self, name: &str, status: ProtocolStatus) {
        if let Some(entry) = self.write_protocols().get_mut(name) {
            entry.status = status;
        }
    }

    fn set_or_insert_loading(&self, name: &str, source: &ProtocolSource) {
        let mut protocols = self.write_protocols();
        let entry = protocols
            .entry(name.to_string())
            .or_insert_with(|| LoadedProtocol::failed(name.to_string(), source.clone(), Vec::new()));
        entry.status = ProtocolStatus::Loading;
    }

    async fn reload_locked(&self, name: &str) -> Result<LoadedProtocol, LifecycleError> {
        let current = self
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        if !current.is_active() {
            self.set_status(name, ProtocolStatus::Loading);
        }

        let artifact = match self.loader.reload(&current.source).await {
            Ok(artifact) => artifact,
            Err(error) => {
                return Err(self.record_failure(Some(name.to_string()), &current.source, error.into()));
            }
        };

        if artifact.name() != name {
            let error = LifecycleError::NameMismatch {
                expected: name.to_string(),
                found: artifact.name().to_string(),
            };
            return Err(self.record_failure(Some(name.to_string()), &current.source, error));
        }

        self.install_locked(artifact)
    }

    fn unload_locked(&self, name: &str) -> Result<LoadedProtocol, LifecycleError> {
        let entry = self
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        self.set_status(name, ProtocolStatus::Unloading);

        if let Err(error) = self.registry.replace(&entry.tools, name, Vec::new()) {
            // Nothing is added, so this cannot collide.
            warn!(protocol = name, "Unexpected registry error on unload: {}", error);
        }
        self.write_protocols().remove(name);
        self.rate_limiter.clear_protocol(name);
        self.loader.invalidate(&entry.source);

        info!(protocol = name, tools = entry.tools.len(), "Unloaded protocol");
        self.events.publish(LifecycleEvent::ProtocolUnloaded {
            name: name.to_string(),
            tools: entry.tools.clone(),
        });
        Ok(entry)
    }

    /// Run `operation` under the lock of `name`, unless a request issued
    /// after `ticket` has already been applied to that name.
    async fn sequenced<F>(
        &self,
        name: &str,
        ticket: u64,
        operation: F,
    ) -> Result<LoadedProtocol, LifecycleError>
    where
        F: FnOnce() -> Result<LoadedProtocol, LifecycleError>,
    {
        let slot = self.slot(name);
        self.settle(ticket);
        let mut last = slot.lock().await;

        let outcome = if *last > ticket {
            info!(protocol = name, ticket, applied = *last, "Dropping superseded request");
            Err(LifecycleError::Superseded(name.to_string()))
        } else {
            operation()
        };
        if outcome.is_ok() {
            *last = ticket;
        }
        drop(last);
        self.release(name, slot);
        outcome
    }

    fn issue_ticket(&self) -> u64 {
        let mut unsettled = self.unsettled.lock().unwrap_or_else(|e| e.into_inner());
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        unsettled.insert(ticket);
        ticket
    }

    fn settle(&self, ticket: u64) {
        self.unsettled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ticket);
    }

    fn slot(&self, name: &str) -> NameSlot {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the slot of `name` once nobody else uses it and no older
    /// request could still need its ticket.
    fn release(&self, name: &str, slot: NameSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&slot) > 2 {
            return;
        }
        let Ok(last) = slot.try_lock() else {
            return;
        };
        let oldest = self
            .unsettled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .first()
            .copied();
        if oldest.is_none_or(|ticket| ticket > *last) {
            slots.remove(name);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or_default()
    }

    fn read_protocols(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, LoadedProtocol>> {
        self.protocols.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_protocols(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, LoadedProtocol>> {
        self.protocols.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("protocols", &self.read_protocols().len())
            .field("tools", &self.registry.snapshot().len())
            .finish_non_exhaustive()
    }
}
