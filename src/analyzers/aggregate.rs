use std::collections::BTreeMap;
use tracing::debug;

use crate::analyzers::types::{Envelope, PointMonth, SlotSummary};
use crate::analyzers::utility::summarize;
use crate::error::QueryResult;
use crate::index::CompositeIndex;
use crate::normalize::{Code, Dictionary};
use crate::query::{QueryEngine, Selection};

/// Computes the time-of-day envelope for one measurement point's month.
///
/// All days of the month are pooled; readings are grouped by time slot and
/// each group is summarized with [`summarize`]. Slot codes are ordered like
/// their labels, so the envelope comes out in chronological order.
#[tracing::instrument(skip(index, slots))]
pub fn aggregate_point_month(
    index: &CompositeIndex,
    slots: &Dictionary,
    key: &PointMonth,
) -> Envelope {
    let rows = index.lookup_prefix(&key.prefix());

    let mut groups: BTreeMap<Code, Vec<f64>> = BTreeMap::new();
    for r in rows {
        groups.entry(r.slot).or_default().push(r.power);
    }

    let summaries = groups
        .into_iter()
        .filter_map(|(slot, mut values)| {
            let summary = summarize(&mut values)?;
            Some(SlotSummary::new(slots.label(slot)?, summary))
        })
        .collect::<Vec<_>>();

    debug!(rows = rows.len(), slots = summaries.len(), "Envelope computed");
    Envelope { slots: summaries }
}

/// Validates `selection` and computes its envelope without caching.
///
/// Entity, facility, measurement point, year and month are required.
/// Unknown labels give an empty envelope.
pub fn aggregate_by_timeslot(engine: &QueryEngine, selection: &Selection) -> QueryResult<Envelope> {
    Ok(engine
        .resolve_point_month(selection)?
        .map(|key| aggregate_point_month(engine.index(), &engine.vocab().slots, &key))
        .unwrap_or_default())
}
