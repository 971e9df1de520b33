//! Protocols domain module.
//!
//! A protocol is a JSON document declaring an HTTP API: endpoints, their
//! parameters, authentication and rate limits. This module validates
//! protocol documents, loads them from files, URLs or inline text, and
//! manages the set of active protocols whose endpoints are exposed as tools.
//!
//! ## Architecture
//!
//! - `model.rs` - typed protocol documents
//! - `naming.rs` - identifier rules and tool naming
//! - `validator/` - layered validation (schema, business, security, performance)
//! - `schema.rs` - JSON Schema generation for tool inputs
//! - `loader.rs` - sources to compiled artifacts, with a TTL cache
//! - `lifecycle.rs` - active protocols, atomic tool swaps, events
//! - `events.rs` - lifecycle event bus
//! - `error.rs` - load and lifecycle errors

mod error;
pub mod events;
pub mod lifecycle;
pub mod loader;
pub mod model;
pub mod naming;
mod schema;
pub mod validator;

pub use error::{LifecycleError, LoadError};
pub use events::{EventBus, LifecycleEvent};
pub use lifecycle::{BatchResult, LifecycleManager, LoadedProtocol, ProtocolStatus};
pub use loader::{
    DynamicLoader, HttpSourceFetcher, LoadedArtifact, LoaderConfig, PreparedSource, ProtocolSource,
    SourceFetcher,
};
pub use model::{
    ApiKeyLocation, Authentication, EndpointDefinition, HttpMethod, ParameterDefinition,
    ParameterKind, ProtocolDefinition, RateLimit, RateWindow,
};
pub use schema::{generate_input_schema, generate_parameter_schema};
pub use validator::{
    DEFAULT_MAX_ENDPOINTS, ProtocolValidator, ValidatedProtocol, ValidationCategory,
    ValidationIssue, ValidationReport, ValidatorConfig,
};
