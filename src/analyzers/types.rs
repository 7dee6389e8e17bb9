//! Data types used by the aggregation pipeline.

use serde::Serialize;

use crate::index::KeyPrefix;
use crate::normalize::Code;

/// One measurement point's month of readings: the key of a time-slot
/// envelope and of its cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointMonth {
    pub entity: Code,
    pub facility: Code,
    pub point: Code,
    pub year: u16,
    pub month: u8,
}

impl PointMonth {
    pub fn prefix(&self) -> KeyPrefix {
        KeyPrefix::root()
            .entity(self.entity)
            .facility(self.facility)
            .point(self.point)
            .year(self.year)
            .month(self.month)
    }
}

/// Order statistics of one sample.
///
/// `mean` is the arithmetic mean. Dashboards built on this data have
/// labelled it "p50"; it is not the median.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub p25: f64,
    pub mean: f64,
    pub p75: f64,
    pub max: f64,
}

/// Statistics of every reading that fell in one time slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    pub time_slot: String,
    pub count: usize,
    pub min: f64,
    pub p25: f64,
    pub mean: f64,
    pub p75: f64,
    pub max: f64,
}

impl SlotSummary {
    pub fn new(time_slot: &str, s: Summary) -> Self {
        Self {
            time_slot: time_slot.to_string(),
            count: s.count,
            min: s.min,
            p25: s.p25,
            mean: s.mean,
            p75: s.p75,
            max: s.max,
        }
    }
}

/// Per-slot statistics for a month, ordered from the first slot of the day
/// to the last. Slots without readings are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Envelope {
    pub slots: Vec<SlotSummary>,
}

impl Envelope {
    pub fn get(&self, time_slot: &str) -> Option<&SlotSummary> {
        self.slots.iter().find(|s| s.time_slot == time_slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
