//! Spec layer: input JSON schemas and the static registries.
//!
//! This module is intentionally separate from log parsing and aggregation.
//! It owns:
//! - metric registry (aggregation kind, units, entity folding rules)
//! - marker scopes and qualifier-aware event families
//! - phase-data document shape and run metadata

pub mod metrics;
pub mod phase;
pub mod scopes;

pub use metrics::{AggKind, MetricRegistry};
pub use phase::RunMeta;
