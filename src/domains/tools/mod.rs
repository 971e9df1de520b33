//! Tools domain module.
//!
//! Turns validated protocol definitions into executable tools and keeps the
//! live set that MCP clients see.
//!
//! ## Architecture
//!
//! - `generator.rs` - compiles endpoints into [`GeneratedTool`]s
//! - `registry.rs` - snapshot-swapped registry of live tools
//! - `rate_limiter.rs` - fixed-window limits per endpoint
//! - `credentials.rs` - credential lookup for authenticated endpoints
//! - `executor.rs` - outbound HTTP collaborator
//! - `outcome.rs` - invocation results and their MCP rendering
//! - `error.rs` - tool invocation errors

pub mod credentials;
mod error;
pub mod executor;
mod generator;
mod outcome;
mod rate_limiter;
mod registry;

pub use credentials::{Credential, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use error::{ParameterViolation, ToolError};
pub use executor::{ExecutorError, HttpExecutor, HttpRequest, HttpResponse, ReqwestExecutor};
pub use generator::{DEFAULT_INVOCATION_TIMEOUT, GeneratedTool, ToolContext, generate_tools};
pub use outcome::{InvocationResponse, ToolOutcome, to_call_result};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use registry::{NameCollision, RegisteredTool, RegistrySnapshot, ToolRegistry};
