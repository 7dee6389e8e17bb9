//! Time-slot aggregation and the cached query facade.
//!
//! This module groups a measurement point's monthly readings by time of
//! day, computes order statistics for each slot, and wraps the query engine
//! with caches for repeated UI-driven requests.

pub mod aggregate;
pub mod analyzer;
pub mod types;
pub mod utility;
