//! Time-series assembly
//!
//! This module aligns raw diary records into paired observation series:
//! - Mood records validated into a date-indexed [`MoodSeries`]
//! - Habit progress resolved from binary/graded values to plain numbers
//! - Date intersection of mood and progress, absent values excluded

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::error::CorrelationError;
use crate::store::DiaryStore;
use crate::types::{
    DateWindow, HabitDefinition, MoodLevel, MoodRecord, Observation, PairedSeries, ProgressRecord,
};

/// Validated mood values for a window, indexed by date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoodSeries {
    values: BTreeMap<NaiveDate, f64>,
}

impl MoodSeries {
    /// Validate raw mood records. Records outside `window` are ignored;
    /// out-of-scale values or two records on one day are malformed.
    pub fn from_records(records: &[MoodRecord], window: &DateWindow) -> Result<Self, CorrelationError> {
        let mut values = BTreeMap::new();
        for record in records.iter().filter(|r| window.contains(r.date)) {
            let mood = MoodLevel::from_value(record.value).ok_or_else(|| {
                CorrelationError::MalformedRecord(format!(
                    "mood value {} on {} is outside 0..=4",
                    record.value, record.date
                ))
            })?;
            if values.insert(record.date, mood.value() as f64).is_some() {
                return Err(CorrelationError::MalformedRecord(format!(
                    "duplicate mood record on {}",
                    record.date
                )));
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Assembler for building paired series from diary records
pub struct SeriesAssembler;

impl SeriesAssembler {
    /// Read one habit's records and the mood records for `window` from the store
    /// and align them.
    pub fn assemble<S: DiaryStore + ?Sized>(
        store: &S,
        habit: &HabitDefinition,
        window: &DateWindow,
    ) -> Result<PairedSeries, CorrelationError> {
        let moods = MoodSeries::from_records(&store.mood_records_in_range(window)?, window)?;
        let progress = store.progress_records_in_range(&habit.id, window)?;
        Self::pair(habit, &moods, &progress, window)
    }

    /// Align progress records with an already validated mood series.
    ///
    /// Only dates carrying both a mood value and a non-absent progress value
    /// are kept. No qualifying dates yields an empty series.
    pub fn pair(
        habit: &HabitDefinition,
        moods: &MoodSeries,
        progress: &[ProgressRecord],
        window: &DateWindow,
    ) -> Result<PairedSeries, CorrelationError> {
        let mut habit_values: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
        for record in progress.iter().filter(|r| window.contains(r.date)) {
            let value = match record.value {
                Some(raw) => Some(habit.kind.resolve(raw).ok_or_else(|| {
                    CorrelationError::MalformedRecord(format!(
                        "habit {}: {} value {} on {}",
                        habit.id,
                        habit.kind.as_str(),
                        raw,
                        record.date
                    ))
                })?),
                None => None,
            };
            if habit_values.insert(record.date, value).is_some() {
                return Err(CorrelationError::MalformedRecord(format!(
                    "habit {}: duplicate progress record on {}",
                    habit.id, record.date
                )));
            }
        }

        let observations = habit_values.into_iter().filter_map(|(date, habit)| {
            moods.get(date).map(|mood| Observation { date, mood, habit })
        });
        PairedSeries::from_observations(habit.id.clone(), observations)
    }
}
