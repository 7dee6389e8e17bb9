//! Composite index over normalized readings.
//!
//! Readings are sorted once by `(entity, facility, point, year, month, day)`
//! and then by timestamp, so every key owns a contiguous slice of rows and
//! every key prefix owns a contiguous run of keys. The key map records the
//! slice bounds of each key; prefix lookups are two `BTreeMap` seeks.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::normalize::{Code, Reading};

pub const KEY_DEPTH: usize = 6;

/// A component of the composite key, in key order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Entity,
    Facility,
    #[serde(alias = "point")]
    #[value(alias = "point")]
    MeasurementPoint,
    Year,
    Month,
    Day,
}

impl Level {
    pub const ALL: [Level; KEY_DEPTH] = [
        Level::Entity,
        Level::Facility,
        Level::MeasurementPoint,
        Level::Year,
        Level::Month,
        Level::Day,
    ];

    /// Position of this level in the key; also the prefix length whose
    /// children live at this level.
    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Entity => "entity",
            Level::Facility => "facility",
            Level::MeasurementPoint => "measurement_point",
            Level::Year => "year",
            Level::Month => "month",
            Level::Day => "day",
        }
    }

    fn max_value(self) -> u32 {
        match self {
            Level::Entity | Level::Facility | Level::MeasurementPoint => Code::MAX,
            Level::Year => u16::MAX as u32,
            Level::Month | Level::Day => u8::MAX as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    pub entity: Code,
    pub facility: Code,
    pub point: Code,
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl IndexKey {
    pub fn of(r: &Reading) -> Self {
        Self {
            entity: r.entity,
            facility: r.facility,
            point: r.point,
            year: r.year,
            month: r.month,
            day: r.day,
        }
    }

    pub fn component(&self, level: Level) -> u32 {
        match level {
            Level::Entity => self.entity,
            Level::Facility => self.facility,
            Level::MeasurementPoint => self.point,
            Level::Year => self.year as u32,
            Level::Month => self.month as u32,
            Level::Day => self.day as u32,
        }
    }

    // Components come from typed constructors, so the narrowing casts are lossless.
    fn from_components(c: [u32; KEY_DEPTH]) -> Self {
        Self {
            entity: c[0],
            facility: c[1],
            point: c[2],
            year: c[3] as u16,
            month: c[4] as u8,
            day: c[5] as u8,
        }
    }
}

/// A leading run of key components.
///
/// Built level by level from [`KeyPrefix::root`]; each setter must be
/// called in key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPrefix {
    parts: [u32; KEY_DEPTH],
    len: usize,
}

impl KeyPrefix {
    pub fn root() -> Self {
        Self {
            parts: [0; KEY_DEPTH],
            len: 0,
        }
    }

    pub fn entity(self, entity: Code) -> Self {
        self.push(Level::Entity, entity)
    }

    pub fn facility(self, facility: Code) -> Self {
        self.push(Level::Facility, facility)
    }

    pub fn point(self, point: Code) -> Self {
        self.push(Level::MeasurementPoint, point)
    }

    pub fn year(self, year: u16) -> Self {
        self.push(Level::Year, year as u32)
    }

    pub fn month(self, month: u8) -> Self {
        self.push(Level::Month, month as u32)
    }

    pub fn day(self, day: u8) -> Self {
        self.push(Level::Day, day as u32)
    }

    pub fn depth(&self) -> usize {
        self.len
    }

    pub fn get(&self, level: Level) -> Option<u32> {
        (level.depth() < self.len).then(|| self.parts[level.depth()])
    }

    fn push(mut self, level: Level, value: u32) -> Self {
        debug_assert_eq!(self.len, level.depth(), "key prefix built out of order");
        self.parts[level.depth()] = value;
        self.len = level.depth() + 1;
        self
    }

    fn lower(&self) -> IndexKey {
        let mut c = [0; KEY_DEPTH];
        c[..self.len].copy_from_slice(&self.parts[..self.len]);
        IndexKey::from_components(c)
    }

    fn upper(&self) -> IndexKey {
        let mut c = Level::ALL.map(Level::max_value);
        c[..self.len].copy_from_slice(&self.parts[..self.len]);
        IndexKey::from_components(c)
    }
}

impl From<IndexKey> for KeyPrefix {
    fn from(key: IndexKey) -> Self {
        Self {
            parts: Level::ALL.map(|level| key.component(level)),
            len: KEY_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Immutable multi-key index. Owns the readings.
#[derive(Debug, Default)]
pub struct CompositeIndex {
    rows: Vec<Reading>,
    keys: BTreeMap<IndexKey, Span>,
}

impl CompositeIndex {
    #[tracing::instrument(skip_all, fields(rows = readings.len()))]
    pub fn build(mut readings: Vec<Reading>) -> Self {
        let start = Instant::now();

        readings.sort_by(|a, b| {
            IndexKey::of(a)
                .cmp(&IndexKey::of(b))
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        let mut keys = BTreeMap::new();
        let mut group_start = 0;
        for i in 1..=readings.len() {
            let boundary = i == readings.len()
                || IndexKey::of(&readings[i]) != IndexKey::of(&readings[group_start]);
            if boundary {
                keys.insert(
                    IndexKey::of(&readings[group_start]),
                    Span {
                        start: group_start,
                        end: i,
                    },
                );
                group_start = i;
            }
        }

        info!(
            rows = readings.len(),
            keys = keys.len(),
            elapsed = ?start.elapsed(),
            "Composite index built"
        );

        Self {
            rows: readings,
            keys,
        }
    }

    /// Rows stored under exactly `key`, in timestamp order.
    pub fn lookup_exact(&self, key: &IndexKey) -> &[Reading] {
        self.keys
            .get(key)
            .map(|span| &self.rows[span.start..span.end])
            .unwrap_or(&[])
    }

    /// Rows of every key starting with `prefix`, as one contiguous slice in
    /// key order. Within a key rows are in timestamp order.
    pub fn lookup_prefix(&self, prefix: &KeyPrefix) -> &[Reading] {
        let mut range = self.keys.range(prefix.lower()..=prefix.upper());
        let Some((_, first)) = range.next() else {
            return &[];
        };
        let end = range.next_back().map_or(first.end, |(_, last)| last.end);
        &self.rows[first.start..end]
    }

    /// Sorted, duplicate-free values of `level` among keys under `prefix`.
    ///
    /// Children of the prefix (the level right below it) are found by
    /// skipping from one child to the next, so the cost depends on the number
    /// of children rather than the number of keys beneath them.
    pub fn distinct_values(&self, level: Level, prefix: &KeyPrefix) -> Vec<u32> {
        let depth = prefix.depth();
        let fixed = level.depth() < depth;

        if fixed {
            return match prefix.get(level) {
                Some(value) if !self.lookup_prefix(prefix).is_empty() => vec![value],
                _ => Vec::new(),
            };
        }

        let upper = prefix.upper();
        if level.depth() > depth {
            return self
                .keys
                .range(prefix.lower()..=upper)
                .map(|(key, _)| key.component(level))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
        }

        let mut values = Vec::new();
        let mut lower = prefix.lower();
        while let Some((key, _)) = self.keys.range(lower..=upper).next() {
            let value = key.component(level);
            values.push(value);
            if value == level.max_value() {
                break;
            }
            lower = prefix.push(level, value + 1).lower();
        }
        values
    }

    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.keys.keys()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
