//! GAR address-graph builder.
//!
//! This library provides shared types and modules for the ingest and updater
//! binaries: it streams FIAS/GAR XML for one region, rebuilds the
//! municipal/administrative hierarchy, and persists a normalized address
//! graph into PostgreSQL.

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod pipeline;
pub mod postgres;
pub mod stats;
pub mod xml;

pub use config::Config;
pub use error::IngestError;
pub use stats::RunStats;
