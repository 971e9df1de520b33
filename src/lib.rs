//! Protocol MCP Server Library
//!
//! Compiles declarative API protocol documents into MCP tools that can be
//! loaded, swapped and removed while the server runs.
//!
//! # Architecture
//!
//! - **core**: configuration, error handling, URL policy, the MCP server and transports
//! - **domains**: business logic organized by bounded contexts
//!   - **protocols**: protocol model, validation, loading and lifecycle
//!   - **tools**: tool generation, invocation and the live registry
//!   - **submissions**: pull-request intake of new protocols
//! - **cli**: command-line entry points
//!
//! # Example
//!
//! ```rust,no_run
//! use protocol_mcp_server::{core::Config, core::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let server = McpServer::new(config)?;
//!     server.bootstrap().await?;
//!     // Start a transport...
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
