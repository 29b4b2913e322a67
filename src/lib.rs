//! # Stanford MCP
//!
//! A Model Context Protocol (MCP) server exposing Stanford's ExploreCourses
//! course catalog as tools.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Query, CourseRecord, Term, etc.)
//! - [`sources`]: Upstream catalog sources behind the [`CatalogSource`] trait
//! - [`catalog`]: Rate-limited, retrying catalog adapter and the cached catalog service
//! - [`mcp`]: MCP server on the `rmcp` SDK: tool registry, sessions and transports
//! - [`utils`]: Response cache, retry policy, HTTP client and text formatting
//! - [`config`]: Configuration management

pub mod catalog;
pub mod config;
pub mod mcp;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use catalog::{CatalogClient, CatalogService, FetchError};
pub use models::{CourseRecord, Query, Term};
pub use sources::{CatalogSource, SourceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
