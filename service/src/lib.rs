//! # Config Store Service
//!
//! The resolution-and-caching engine of the config store.
//!
//! This crate provides:
//! - `ConfigService`: set and item lifecycle, recursive flattening of nested
//!   sets and secrets, cache-aside reads of the flattened JSON
//! - A write-behind cache writer so cache maintenance never blocks callers
//! - `RequestCollapser`: one execution shared by concurrent identical reads,
//!   with a bounded wait per caller
//! - `ConfigReader`: per-request choice between direct and collapsed reads,
//!   driven by a feature flag
//! - `ServiceTelemetry`: `metrics` counters for cache and collapse behaviour

pub mod cache_writer;
pub mod collapse;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod reader;
pub mod telemetry;

pub use cache_writer::CacheWriter;
pub use collapse::RequestCollapser;
pub use engine::{ConfigService, ConfigServiceBuilder};
pub use error::ItemMutationError;
pub use flatten::Flattener;
pub use reader::{ConfigReader, ReadKey, ReadStrategy};
pub use telemetry::{CacheLookup, CollapseRole, ServiceTelemetry};
