//! Domains module containing business logic organized by bounded contexts.
//!
//! - `protocols` - protocol documents, validation, loading and lifecycle
//! - `tools` - tools compiled from protocol endpoints and their registry
//! - `submissions` - pull-request intake of new protocols

pub mod protocols;
pub mod submissions;
pub mod tools;
