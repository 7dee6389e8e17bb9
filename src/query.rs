//! Query engine: filter validation, series lookups and option lists.
//!
//! Every query takes a [`Selection`], the set of choices a caller has made
//! so far. Missing required choices are reported as
//! [`QueryError::IncompleteFilter`]; choices that match nothing (unknown
//! labels, a 31st of April) simply give empty results.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::analyzers::types::PointMonth;
use crate::error::{QueryError, QueryResult};
use crate::index::{CompositeIndex, KeyPrefix, Level};
use crate::normalize::{Code, Dataset, Dictionary, Reading, Vocabulary};
use crate::parser::days_in_month;
use crate::stats::LoadReport;

/// Caller choices; any subset may be filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub entity: Option<String>,
    pub facility: Option<String>,
    #[serde(alias = "point")]
    pub measurement_point: Option<String>,
    pub year: Option<u16>,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl Selection {
    pub fn month(entity: &str, facility: &str, year: u16, month: u8) -> Self {
        Self {
            entity: Some(entity.to_string()),
            facility: Some(facility.to_string()),
            year: Some(year),
            month: Some(month),
            ..Default::default()
        }
    }

    pub fn with_point(mut self, point: &str) -> Self {
        self.measurement_point = Some(point.to_string());
        self
    }

    pub fn with_day(mut self, day: u8) -> Self {
        self.day = Some(day);
        self
    }

    fn is_set(&self, level: Level) -> bool {
        match level {
            Level::Entity => self.entity.is_some(),
            Level::Facility => self.facility.is_some(),
            Level::MeasurementPoint => self.measurement_point.is_some(),
            Level::Year => self.year.is_some(),
            Level::Month => self.month.is_some(),
            Level::Day => self.day.is_some(),
        }
    }

    /// Fails with the names of every level in `required` that is unset.
    pub(crate) fn require(&self, required: &[Level]) -> QueryResult<()> {
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|level| !self.is_set(**level))
            .map(|level| level.name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(QueryError::IncompleteFilter { missing })
        }
    }
}

/// One point of a raw time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow<'a> {
    pub timestamp: NaiveDateTime,
    pub power_value: f64,
    pub measurement_point: &'a str,
}

/// Resolved option-list request, used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionsKey {
    pub level: Level,
    pub prefix: KeyPrefix,
}

const SERIES_REQUIRED: &[Level] = &[Level::Entity, Level::Facility, Level::Year, Level::Month];
const POINT_MONTH_REQUIRED: &[Level] = &[
    Level::Entity,
    Level::Facility,
    Level::MeasurementPoint,
    Level::Year,
    Level::Month,
];

/// Read-only query surface over a built index.
#[derive(Debug)]
pub struct QueryEngine {
    index: CompositeIndex,
    vocab: Vocabulary,
    report: LoadReport,
}

impl QueryEngine {
    /// Builds the index from `dataset`. The engine is immutable afterwards.
    pub fn new(dataset: Dataset) -> Self {
        let Dataset {
            readings,
            vocab,
            report,
        } = dataset;
        Self {
            index: CompositeIndex::build(readings),
            vocab,
            report,
        }
    }

    pub fn index(&self) -> &CompositeIndex {
        &self.index
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Raw readings of a facility for a month, or one day of it, sorted by
    /// timestamp (ties by measurement point).
    ///
    /// Entity, facility, year and month are required; day and measurement
    /// point narrow the result when given.
    pub fn query_series(&self, selection: &Selection) -> QueryResult<Vec<SeriesRow<'_>>> {
        selection.require(SERIES_REQUIRED)?;
        let (Some(year), Some(month)) = (selection.year, selection.month) else {
            return Ok(Vec::new());
        };
        let Some(facility) = self.facility_prefix(selection) else {
            return Ok(Vec::new());
        };

        let points = match &selection.measurement_point {
            Some(label) => match self.vocab.points.code(label) {
                Some(code) => vec![code],
                None => return Ok(Vec::new()),
            },
            None => self
                .index
                .distinct_values(Level::MeasurementPoint, &facility),
        };

        let runs: Vec<(&str, &[Reading])> = points
            .into_iter()
            .map(|point| {
                let mut prefix = facility.point(point).year(year).month(month);
                if let Some(day) = selection.day {
                    prefix = prefix.day(day);
                }
                let label = self.vocab.points.label(point).unwrap_or_default();
                (label, self.index.lookup_prefix(&prefix))
            })
            .filter(|(_, rows)| !rows.is_empty())
            .collect();

        Ok(merge_runs(&runs))
    }

    /// Sorted distinct values for `level` given the parent choices.
    ///
    /// Entity needs no parent, facility needs the entity and measurement
    /// point needs entity and facility. Calendar levels use whatever leading
    /// choices are present, so years with an empty selection lists every
    /// year in the data.
    pub fn dependent_options(&self, level: Level, selection: &Selection) -> QueryResult<Vec<String>> {
        Ok(self
            .options_key(level, selection)?
            .map(|key| self.options_for(&key))
            .unwrap_or_default())
    }

    /// Resolves an options request to index terms. `Ok(None)` means a parent
    /// label is unknown and the answer is empty.
    pub fn options_key(&self, level: Level, selection: &Selection) -> QueryResult<Option<OptionsKey>> {
        let parents = &Level::ALL[..level.depth()];
        let parents = match level {
            Level::Entity | Level::Facility | Level::MeasurementPoint => {
                selection.require(parents)?;
                parents
            }
            Level::Year | Level::Month | Level::Day => {
                let set = parents.iter().take_while(|l| selection.is_set(**l)).count();
                &parents[..set]
            }
        };

        let mut prefix = KeyPrefix::root();
        for parent in parents {
            prefix = match parent {
                Level::Entity => match self.code(&self.vocab.entities, &selection.entity) {
                    Some(code) => prefix.entity(code),
                    None => return Ok(None),
                },
                Level::Facility => match self.code(&self.vocab.facilities, &selection.facility) {
                    Some(code) => prefix.facility(code),
                    None => return Ok(None),
                },
                Level::MeasurementPoint => {
                    match self.code(&self.vocab.points, &selection.measurement_point) {
                        Some(code) => prefix.point(code),
                        None => return Ok(None),
                    }
                }
                Level::Year => match selection.year {
                    Some(year) => prefix.year(year),
                    None => return Ok(None),
                },
                Level::Month => match selection.month {
                    Some(month) => prefix.month(month),
                    None => return Ok(None),
                },
                Level::Day => match selection.day {
                    Some(day) => prefix.day(day),
                    None => return Ok(None),
                },
            };
        }

        Ok(Some(OptionsKey { level, prefix }))
    }

    /// Labels of the distinct values for a resolved options request.
    pub fn options_for(&self, key: &OptionsKey) -> Vec<String> {
        let values = self.index.distinct_values(key.level, &key.prefix);
        let dict = match key.level {
            Level::Entity => &self.vocab.entities,
            Level::Facility => &self.vocab.facilities,
            Level::MeasurementPoint => &self.vocab.points,
            Level::Year | Level::Month | Level::Day => {
                return values.iter().map(u32::to_string).collect();
            }
        };
        values
            .into_iter()
            .filter_map(|code| dict.label(code).map(str::to_string))
            .collect()
    }

    /// Valid days for a calendar month; empty for an invalid month.
    pub fn day_options(year: u16, month: u8) -> Vec<u8> {
        days_in_month(year as i32, month as u32)
            .map(|n| (1..=n as u8).collect())
            .unwrap_or_default()
    }

    /// Resolves a selection to the key of one point's month of readings.
    ///
    /// Entity, facility, measurement point, year and month are required.
    /// `Ok(None)` means one of the labels is unknown.
    pub fn resolve_point_month(&self, selection: &Selection) -> QueryResult<Option<PointMonth>> {
        selection.require(POINT_MONTH_REQUIRED)?;
        let (Some(year), Some(month)) = (selection.year, selection.month) else {
            return Ok(None);
        };
        let key = (|| {
            Some(PointMonth {
                entity: self.code(&self.vocab.entities, &selection.entity)?,
                facility: self.code(&self.vocab.facilities, &selection.facility)?,
                point: self.code(&self.vocab.points, &selection.measurement_point)?,
                year,
                month,
            })
        })();
        Ok(key)
    }

    fn facility_prefix(&self, selection: &Selection) -> Option<KeyPrefix> {
        let entity = self.code(&self.vocab.entities, &selection.entity)?;
        let facility = self.code(&self.vocab.facilities, &selection.facility)?;
        Some(KeyPrefix::root().entity(entity).facility(facility))
    }

    fn code(&self, dict: &Dictionary, label: &Option<String>) -> Option<Code> {
        label.as_deref().and_then(|l| dict.code(l))
    }
}

/// Merges per-point runs, each already in timestamp order, into one series
/// ordered by timestamp then point label.
fn merge_runs<'a>(runs: &[(&'a str, &'a [Reading])]) -> Vec<SeriesRow<'a>> {
    let mut heads: BinaryHeap<_> = runs
        .iter()
        .enumerate()
        .filter_map(|(run, (label, rows))| {
            rows.first().map(|r| Reverse((r.timestamp, *label, run, 0)))
        })
        .collect();
    let mut merged = Vec::with_capacity(runs.iter().map(|(_, rows)| rows.len()).sum());

    while let Some(Reverse((_, label, run, pos))) = heads.pop() {
        let rows = runs[run].1;
        let r = &rows[pos];
        merged.push(SeriesRow {
            timestamp: r.timestamp,
            power_value: r.power,
            measurement_point: label,
        });
        if let Some(next) = rows.get(pos + 1) {
            heads.push(Reverse((next.timestamp, label, run, pos + 1)));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeConfig;
    use crate::normalize::{Normalizer, RawRow};

    #[test]
    fn test_series_month_sorted_by_time() {
        let engine = engine();
        let rows = engine
            .query_series(&Selection::month("A", "F1", 2024, 1))
            .unwrap();

        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(rows[0].measurement_point, "P1");
        assert_eq!(rows[1].measurement_point, "P2");
        assert_eq!(rows[0].timestamp, rows[1].timestamp);
    }

    #[test]
    fn test_merge_runs_interleaves_points() {
        let at = |h: u32, m: u32| {
            chrono::NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        let reading = |ts: NaiveDateTime, power: f64| Reading {
            timestamp: ts,
            power,
            entity: 0,
            facility: 0,
            point: 0,
            slot: 0,
            year: 2024,
            month: 1,
            day: 5,
        };
        let p1 = [reading(at(8, 0), 1.0), reading(at(9, 0), 2.0), reading(at(9, 0), 3.0)];
        let p2 = [reading(at(7, 0), 4.0), reading(at(9, 0), 5.0)];

        let merged = merge_runs(&[("P2", &p2[..]), ("P1", &p1[..])]);

        let order: Vec<_> = merged
            .iter()
            .map(|r| (r.measurement_point, r.power_value))
            .collect();
        assert_eq!(
            order,
            vec![("P2", 4.0), ("P1", 1.0), ("P1", 2.0), ("P1", 3.0), ("P2", 5.0)]
        );
        assert!(merge_runs(&[]).is_empty());
    }

    #[test]
    fn test_series_single_day() {
        let engine = engine();
        let rows = engine
            .query_series(&Selection::month("A", "F1", 2024, 1).with_day(6))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].power_value, 200.0);
    }

    #[test]
    fn test_series_single_point() {
        let engine = engine();
        let rows = engine
            .query_series(&Selection::month("A", "F1", 2024, 1).with_point("P2"))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].measurement_point, "P2");
    }

    #[test]
    fn test_series_day_past_month_end_is_empty() {
        let engine = engine();
        let rows = engine
            .query_series(&Selection::month("A", "F1", 2024, 4).with_day(31))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_series_unknown_labels_are_empty() {
        let engine = engine();
        assert!(engine
            .query_series(&Selection::month("Z", "F1", 2024, 1))
            .unwrap()
            .is_empty());
        assert!(engine
            .query_series(&Selection::month("A", "F1", 2024, 1).with_point("P9"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_series_incomplete_filter() {
        let engine = engine();
        let selection = Selection {
            entity: Some("A".to_string()),
            year: Some(2024),
            ..Default::default()
        };

        let err = engine.query_series(&selection).unwrap_err();
        assert_eq!(
            err,
            QueryError::IncompleteFilter {
                missing: vec!["facility", "month"]
            }
        );
    }

    #[test]
    fn test_cascading_options() {
        let engine = engine();
        let entity_a = Selection {
            entity: Some("A".to_string()),
            ..Default::default()
        };

        assert_eq!(
            engine.dependent_options(Level::Entity, &Selection::default()).unwrap(),
            vec!["A", "B"]
        );
        assert_eq!(
            engine.dependent_options(Level::Facility, &entity_a).unwrap(),
            vec!["F1", "F3"]
        );

        let unknown = Selection {
            entity: Some("Q".to_string()),
            ..Default::default()
        };
        assert!(engine.dependent_options(Level::Facility, &unknown).unwrap().is_empty());

        let points = Selection {
            facility: Some("F1".to_string()),
            ..entity_a
        };
        assert_eq!(
            engine.dependent_options(Level::MeasurementPoint, &points).unwrap(),
            vec!["P1", "P2"]
        );
    }

    #[test]
    fn test_options_need_parents() {
        let engine = engine();
        let err = engine
            .dependent_options(Level::MeasurementPoint, &Selection::default())
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::IncompleteFilter {
                missing: vec!["entity", "facility"]
            }
        );
    }

    #[test]
    fn test_calendar_options() {
        let engine = engine();

        assert_eq!(
            engine.dependent_options(Level::Year, &Selection::default()).unwrap(),
            vec!["2023", "2024"]
        );

        let selection = Selection {
            entity: Some("A".to_string()),
            facility: Some("F1".to_string()),
            measurement_point: Some("P1".to_string()),
            year: Some(2024),
            ..Default::default()
        };
        assert_eq!(
            engine.dependent_options(Level::Month, &selection).unwrap(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_day_options() {
        assert_eq!(QueryEngine::day_options(2024, 2).len(), 29);
        assert_eq!(QueryEngine::day_options(2024, 4).last(), Some(&30));
        assert!(QueryEngine::day_options(2024, 13).is_empty());
    }

    #[test]
    fn test_resolve_point_month() {
        let engine = engine();
        let selection = Selection::month("A", "F1", 2024, 1).with_point("P1");

        let key = engine.resolve_point_month(&selection).unwrap().unwrap();
        assert_eq!((key.year, key.month), (2024, 1));

        let unknown = Selection::month("A", "F1", 2024, 1).with_point("nope");
        assert_eq!(engine.resolve_point_month(&unknown).unwrap(), None);

        let incomplete = Selection::month("A", "F1", 2024, 1);
        assert!(engine.resolve_point_month(&incomplete).is_err());
    }

    // Helper functions for tests
    fn engine() -> QueryEngine {
        let rows = vec![
            RawRow::new("A", "F1", "P1", "2024-01-07 08:00:00", "300"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:00:00", "100"),
            RawRow::new("A", "F1", "P2", "2024-01-05 08:00:00", "40"),
            RawRow::new("A", "F1", "P1", "2024-01-06 08:00:00", "200"),
            RawRow::new("A", "F1", "P1", "2024-01-05 08:30:00", "120"),
            RawRow::new("A", "F1", "P1", "2024-02-01 08:00:00", "5"),
            RawRow::new("A", "F3", "P7", "2023-12-31 23:30:00", "1"),
            RawRow::new("B", "F2", "P1", "2024-01-05 08:00:00", "9"),
        ];
        let dataset = Normalizer::new(NormalizeConfig::default())
            .normalize(&rows)
            .unwrap();
        QueryEngine::new(dataset)
    }
}
