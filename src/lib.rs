pub mod analyzers;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod query;
pub mod stats;
