use serde::Serialize;
use std::time::Duration;

/// An input file left out of the load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Load diagnostics: how many rows came in, how many survived
/// normalization, and why the rest were dropped.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    pub files_read: usize,
    pub files_skipped: Vec<SkippedFile>,
    pub rows_read: usize,
    pub rows_kept: usize,

    // drop reasons
    pub bad_timestamp: usize,
    pub bad_power: usize,
    pub missing_field: usize,
    pub malformed: usize,

    // vocabulary sizes
    pub entities: usize,
    pub facilities: usize,
    pub measurement_points: usize,
    pub time_slots: usize,

    #[serde(with = "duration_ms")]
    pub read_time: Duration,
    #[serde(with = "duration_ms")]
    pub normalize_time: Duration,
}

impl LoadReport {
    pub fn dropped(&self) -> usize {
        self.bad_timestamp + self.bad_power + self.missing_field + self.malformed
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn dropped_pct(&self) -> f64 {
        Self::pct(self.dropped(), self.rows_read)
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
