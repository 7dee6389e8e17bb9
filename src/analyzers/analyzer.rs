use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::analyzers::aggregate::aggregate_point_month;
use crate::analyzers::types::{Envelope, PointMonth};
use crate::cache::{CacheStats, LookupCache};
use crate::error::QueryResult;
use crate::index::Level;
use crate::query::{OptionsKey, QueryEngine, SeriesRow, Selection};
use crate::stats::LoadReport;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnalyzerCacheStats {
    pub options: CacheStats,
    pub envelopes: CacheStats,
}

/// Entry point for presentation code: the query engine plus caches for
/// option lists and envelopes, which UI selections ask for repeatedly.
///
/// Series are not cached; they are a single prefix lookup per point.
pub struct Analyzer {
    engine: QueryEngine,
    options: LookupCache<OptionsKey, Vec<String>>,
    envelopes: LookupCache<PointMonth, Envelope>,
}

impl Analyzer {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine,
            options: LookupCache::new("options"),
            envelopes: LookupCache::new("envelopes"),
        }
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn report(&self) -> &LoadReport {
        self.engine.report()
    }

    pub fn series(&self, selection: &Selection) -> QueryResult<Vec<SeriesRow<'_>>> {
        self.engine.query_series(selection)
    }

    pub fn dependent_options(
        &self,
        level: Level,
        selection: &Selection,
    ) -> QueryResult<Arc<Vec<String>>> {
        let Some(key) = self.engine.options_key(level, selection)? else {
            debug!(level = level.name(), "Unknown parent selection");
            return Ok(Arc::default());
        };
        Ok(self
            .options
            .get_or_compute(key, || self.engine.options_for(&key)))
    }

    /// Time-slot envelope for one measurement point's month.
    pub fn timeslot_envelope(&self, selection: &Selection) -> QueryResult<Arc<Envelope>> {
        let Some(key) = self.engine.resolve_point_month(selection)? else {
            debug!("Unknown label in envelope selection");
            return Ok(Arc::default());
        };
        Ok(self.envelopes.get_or_compute(key, || {
            aggregate_point_month(self.engine.index(), &self.engine.vocab().slots, &key)
        }))
    }

    pub fn day_options(&self, year: u16, month: u8) -> Vec<u8> {
        QueryEngine::day_options(year, month)
    }

    pub fn cache_stats(&self) -> AnalyzerCacheStats {
        AnalyzerCacheStats {
            options: self.options.stats(),
            envelopes: self.envelopes.stats(),
        }
    }
}
