//! Record normalization: raw rows become typed [`Reading`]s.
//!
//! Repeated strings (entity, facility, measurement point, time slot) are
//! interned into [`Dictionary`]s. Once every row has been seen the
//! dictionaries are frozen so that code order equals label order, which lets
//! the index hand out sorted option lists straight from its key order.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::NormalizeConfig;
use crate::error::{LoadError, LoadResult};
use crate::parser::{calendar_fields, parse_power, parse_timestamp, time_slot_label};
use crate::stats::LoadReport;

/// Compact reference to an interned label.
pub type Code = u32;

/// Drop ratio above which a load is logged as a warning.
const HIGH_DROP_PCT: f64 = 5.0;

/// Required fields and the column names accepted for each, in priority
/// order. When a file has several of a field's columns the first one wins.
pub static REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("entity", &["entity", "CTDL"]),
    ("facility", &["facility", "NMTD"]),
    ("measurement_point", &["measurement_point", "MADIEMDO"]),
    ("end_timestamp", &["end_timestamp", "ENDTIME", "TIME"]),
    ("power_value", &["power_value", "CS"]),
];

/// A row as it arrives from the source, before any validation.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub entity: Option<String>,
    pub facility: Option<String>,
    pub measurement_point: Option<String>,
    pub end_timestamp: Option<String>,
    pub power_value: Option<String>,
}

impl RawRow {
    pub fn new(entity: &str, facility: &str, point: &str, timestamp: &str, power: &str) -> Self {
        Self {
            entity: Some(entity.to_string()),
            facility: Some(facility.to_string()),
            measurement_point: Some(point.to_string()),
            end_timestamp: Some(timestamp.to_string()),
            power_value: Some(power.to_string()),
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "entity" => &self.entity,
            "facility" => &self.facility,
            "measurement_point" => &self.measurement_point,
            "end_timestamp" => &self.end_timestamp,
            "power_value" => &self.power_value,
            _ => return None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Two-way map between labels and codes for one categorical field.
#[derive(Debug, Default, Clone)]
pub struct Dictionary {
    labels: Vec<String>,
    codes: HashMap<String, Code>,
}

impl Dictionary {
    pub fn intern(&mut self, label: &str) -> Code {
        if let Some(&code) = self.codes.get(label) {
            return code;
        }
        let code = self.labels.len() as Code;
        self.labels.push(label.to_string());
        self.codes.insert(label.to_string(), code);
        code
    }

    pub fn code(&self, label: &str) -> Option<Code> {
        self.codes.get(label).copied()
    }

    pub fn label(&self, code: Code) -> Option<&str> {
        self.labels.get(code as usize).map(String::as_str)
    }

    /// Labels in code order, which after freezing is ascending order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Renumbers codes in ascending label order. Returns `remap[old] = new`.
    fn freeze(&mut self) -> Vec<Code> {
        let mut order: Vec<Code> = (0..self.labels.len() as Code).collect();
        order.sort_by(|&a, &b| self.labels[a as usize].cmp(&self.labels[b as usize]));

        let mut remap = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old as usize] = new as Code;
        }

        let mut labels = std::mem::take(&mut self.labels);
        let mut sorted = Vec::with_capacity(labels.len());
        for &old in &order {
            sorted.push(std::mem::take(&mut labels[old as usize]));
        }
        self.codes = sorted
            .iter()
            .enumerate()
            .map(|(code, label)| (label.clone(), code as Code))
            .collect();
        self.labels = sorted;

        remap
    }
}

/// One normalized measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub power: f64,
    pub entity: Code,
    pub facility: Code,
    pub point: Code,
    pub slot: Code,
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// The dictionaries of every categorical field.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    pub entities: Dictionary,
    pub facilities: Dictionary,
    pub points: Dictionary,
    pub slots: Dictionary,
}

/// Normalized readings plus everything needed to interpret their codes.
#[derive(Debug, Default)]
pub struct Dataset {
    pub readings: Vec<Reading>,
    pub vocab: Vocabulary,
    pub report: LoadReport,
}

impl Dataset {
    pub fn dropped(&self) -> usize {
        self.report.dropped()
    }
}

pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Validates and converts raw rows.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Config`] if the settings are invalid and
    /// [`LoadError::SchemaViolation`] if a required field is blank in every
    /// row. Per-row defects are counted in the report instead.
    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn normalize(&self, rows: &[RawRow]) -> LoadResult<Dataset> {
        let start = Instant::now();
        let config = self.config.clone().validate()?;
        check_schema(rows)?;

        let mut vocab = Vocabulary::default();
        let mut report = LoadReport {
            rows_read: rows.len(),
            ..Default::default()
        };
        let mut readings = Vec::with_capacity(rows.len());

        for row in rows {
            let (Some(entity), Some(facility), Some(point)) = (
                row.field("entity"),
                row.field("facility"),
                row.field("measurement_point"),
            ) else {
                report.missing_field += 1;
                continue;
            };

            let Some((timestamp, (year, month, day))) = row
                .field("end_timestamp")
                .and_then(|raw| parse_timestamp(raw, config.timestamp_formats.as_slice()))
                .and_then(|ts| calendar_fields(&ts).map(|cal| (ts, cal)))
            else {
                report.bad_timestamp += 1;
                continue;
            };

            let Some(power) = row.field("power_value").and_then(parse_power) else {
                report.bad_power += 1;
                continue;
            };

            let slot = time_slot_label(&timestamp, config.slot_minutes);
            readings.push(Reading {
                timestamp,
                power,
                entity: vocab.entities.intern(entity),
                facility: vocab.facilities.intern(facility),
                point: vocab.points.intern(point),
                slot: vocab.slots.intern(&slot),
                year,
                month,
                day,
            });
        }

        let entities = vocab.entities.freeze();
        let facilities = vocab.facilities.freeze();
        let points = vocab.points.freeze();
        let slots = vocab.slots.freeze();
        for r in &mut readings {
            r.entity = entities[r.entity as usize];
            r.facility = facilities[r.facility as usize];
            r.point = points[r.point as usize];
            r.slot = slots[r.slot as usize];
        }

        report.rows_kept = readings.len();
        report.entities = vocab.entities.len();
        report.facilities = vocab.facilities.len();
        report.measurement_points = vocab.points.len();
        report.time_slots = vocab.slots.len();
        report.normalize_time = start.elapsed();

        info!(
            kept = report.rows_kept,
            dropped = report.dropped(),
            bad_timestamp = report.bad_timestamp,
            bad_power = report.bad_power,
            missing_field = report.missing_field,
            "Rows normalized"
        );
        debug!(
            entities = report.entities,
            facilities = report.facilities,
            points = report.measurement_points,
            slots = report.time_slots,
            "Dictionaries frozen"
        );
        if report.dropped_pct() > HIGH_DROP_PCT {
            warn!(dropped_pct = report.dropped_pct(), "High share of rows dropped");
        }

        Ok(Dataset {
            readings,
            vocab,
            report,
        })
    }
}

fn check_schema(rows: &[RawRow]) -> LoadResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    for &(field, _) in REQUIRED_COLUMNS {
        if rows.iter().all(|row| row.field(field).is_none()) {
            return Err(LoadError::SchemaViolation { field });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn normalize(rows: &[RawRow]) -> Dataset {
        Normalizer::new(NormalizeConfig::default())
            .normalize(rows)
            .unwrap()
    }

    #[test]
    fn test_derives_calendar_fields_and_slot() {
        let ds = normalize(&[RawRow::new("A", "F1", "P1", "2024-01-05 08:10:00", "100")]);

        assert_eq!(ds.readings.len(), 1);
        let r = ds.readings[0];
        assert_eq!((r.year, r.month, r.day), (2024, 1, 5));
        assert_eq!(ds.vocab.slots.label(r.slot), Some("08:00"));
        assert_eq!(r.power, 100.0);
    }

    #[test]
    fn test_drops_are_counted_by_reason() {
        let rows = vec![
            RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "100"),
            RawRow::new("A", "F1", "P1", "garbage", "100"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:30:00", "n/a"),
            RawRow::new("A", "F1", "P1", "2024-01-05 09:00:00", "NaN"),
            RawRow::new("A", "", "P1", "2024-01-05 09:30:00", "1"),
        ];
        let ds = normalize(&rows);

        assert_eq!(ds.readings.len(), 1);
        assert_eq!(ds.report.rows_read, 5);
        assert_eq!(ds.report.bad_timestamp, 1);
        assert_eq!(ds.report.bad_power, 2);
        assert_eq!(ds.report.missing_field, 1);
        assert_eq!(ds.dropped(), 4);
    }

    #[test]
    fn test_schema_violation_when_field_absent_everywhere() {
        let mut rows = vec![
            RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "1"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:30:00", "2"),
        ];
        for row in &mut rows {
            row.power_value = None;
        }

        let err = Normalizer::new(NormalizeConfig::default())
            .normalize(&rows)
            .unwrap_err();
        assert!(matches!(err, LoadError::SchemaViolation { field: "power_value" }));
    }

    #[test]
    fn test_invalid_slot_width_is_an_error() {
        let config = NormalizeConfig {
            slot_minutes: 0,
            ..Default::default()
        };
        let rows = [RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "1")];

        let err = Normalizer::new(config).normalize(&rows).unwrap_err();
        assert!(matches!(err, LoadError::Config(ConfigError::SlotWidth(0))));
    }

    #[test]
    fn test_empty_input_is_valid() {
        let ds = normalize(&[]);
        assert!(ds.readings.is_empty());
        assert_eq!(ds.dropped(), 0);
    }

    #[test]
    fn test_all_rows_dropped_is_valid() {
        let ds = normalize(&[
            RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "x"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:30:00", "y"),
        ]);
        assert!(ds.readings.is_empty());
        assert_eq!(ds.report.bad_power, 2);
    }

    #[test]
    fn test_dictionary_codes_follow_label_order() {
        let rows = vec![
            RawRow::new("C", "F2", "P9", "2024-01-05 23:30:00", "1"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "1"),
            RawRow::new("B", "F3", "P5", "2024-01-05 00:00:00", "1"),
            RawRow::new("A", "F2", "P1", "2024-01-05 12:00:00", "1"),
        ];
        let ds = normalize(&rows);

        let entities: Vec<_> = ds.vocab.entities.labels().collect();
        assert_eq!(entities, vec!["A", "B", "C"]);
        let slots: Vec<_> = ds.vocab.slots.labels().collect();
        assert_eq!(slots, vec!["00:00", "08:00", "12:00", "23:30"]);

        for (row, reading) in rows.iter().zip(&ds.readings) {
            assert_eq!(ds.vocab.entities.label(reading.entity), row.entity.as_deref());
            assert_eq!(ds.vocab.facilities.label(reading.facility), row.facility.as_deref());
            assert_eq!(ds.vocab.points.label(reading.point), row.measurement_point.as_deref());
        }
    }

    #[test]
    fn test_intern_reuses_codes() {
        let mut dict = Dictionary::default();
        let a = dict.intern("P1");
        let b = dict.intern("P2");
        assert_eq!(dict.intern("P1"), a);
        assert_ne!(a, b);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.code("P2"), Some(b));
        assert_eq!(dict.code("P3"), None);
    }
}
