//! Core module containing shared infrastructure components.
//!
//! Configuration, the unified error type, outbound URL policy, the MCP
//! server handler and the transports it runs on.

pub mod config;
pub mod error;
pub mod security;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use security::{UrlSecurityError, validate_url};
pub use server::McpServer;
pub use transport::{TransportConfig, TransportService};
