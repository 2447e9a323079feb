//! In-memory diary store
//!
//! Reference [`DiaryStore`] implementation used by hosts that keep their diary
//! in memory (or load it from a [`DiaryExport`]) and by the engine's tests.
//! Every mutation is announced on a broadcast channel so a
//! [`crate::service::CorrelationService`] can recompute.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use super::DiaryStore;
use crate::error::CorrelationError;
use crate::schema::DiaryExport;
use crate::types::{
    ChangeAction, DateWindow, HabitDefinition, MoodLevel, MoodRecord, ProgressRecord, StoreChange,
};

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct DiaryData {
    habits: Vec<HabitDefinition>,
    moods: BTreeMap<NaiveDate, u8>,
    progress: HashMap<String, BTreeMap<NaiveDate, Option<u8>>>,
}

/// Thread-safe in-memory diary
#[derive(Debug)]
pub struct InMemoryStore {
    data: RwLock<DiaryData>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: RwLock::new(DiaryData::default()),
            changes,
        }
    }

    /// Build a store from a validated diary export
    pub fn from_export(export: DiaryExport) -> Result<Self, CorrelationError> {
        export.validate()?;

        let store = Self::new();
        {
            let mut data = store.write();
            data.habits = export.habits;
            data.moods = export.moods.into_iter().map(|m| (m.date, m.value)).collect();
            data.progress = export
                .progress
                .into_iter()
                .map(|(habit_id, records)| {
                    let series = records.into_iter().map(|r| (r.date, r.value)).collect();
                    (habit_id, series)
                })
                .collect();
        }
        Ok(store)
    }

    /// Parse and load a `diary.export.v1` JSON document
    pub fn from_json(json: &str) -> Result<Self, CorrelationError> {
        Self::from_export(DiaryExport::from_json(json)?)
    }

    /// Snapshot the store contents as a diary export
    pub fn export(&self) -> DiaryExport {
        let data = self.read();
        let mut progress = BTreeMap::new();
        for (habit_id, series) in &data.progress {
            let records = series
                .iter()
                .map(|(&date, &value)| ProgressRecord::new(date, value))
                .collect();
            progress.insert(habit_id.clone(), records);
        }
        DiaryExport {
            habits: data.habits.clone(),
            moods: data
                .moods
                .iter()
                .map(|(&date, &value)| MoodRecord { date, value })
                .collect(),
            progress,
            ..Default::default()
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Add a habit to the catalog, replacing any habit with the same id
    pub fn add_habit(&self, habit: HabitDefinition) {
        {
            let mut data = self.write();
            match data.habits.iter().position(|h| h.id == habit.id) {
                Some(index) => data.habits[index] = habit,
                None => data.habits.push(habit),
            }
        }
        self.notify(StoreChange::Catalog);
    }

    /// Remove a habit and its progress records
    pub fn remove_habit(&self, habit_id: &str) -> bool {
        let removed = {
            let mut data = self.write();
            let before = data.habits.len();
            data.habits.retain(|h| h.id != habit_id);
            data.progress.remove(habit_id);
            data.habits.len() != before
        };
        if removed {
            self.notify(StoreChange::Catalog);
        }
        removed
    }

    /// Record the mood for a day
    pub fn set_mood(&self, date: NaiveDate, mood: MoodLevel) {
        self.set_mood_value(date, mood.value());
    }

    /// Record a raw mood value for a day (no range check, mirrors raw storage)
    pub fn set_mood_value(&self, date: NaiveDate, value: u8) {
        let previous = self.write().moods.insert(date, value);
        self.notify(StoreChange::Mood {
            date,
            action: insert_action(previous.is_some()),
        });
    }

    pub fn remove_mood(&self, date: NaiveDate) -> bool {
        let removed = self.write().moods.remove(&date).is_some();
        if removed {
            self.notify(StoreChange::Mood {
                date,
                action: ChangeAction::Removed,
            });
        }
        removed
    }

    /// Record a habit's raw progress value for a day; `None` marks the day
    /// as not applicable
    pub fn set_progress(&self, habit_id: &str, date: NaiveDate, value: Option<u8>) {
        let previous = self
            .write()
            .progress
            .entry(habit_id.to_string())
            .or_default()
            .insert(date, value);
        self.notify(StoreChange::Progress {
            habit_id: habit_id.to_string(),
            date,
            action: insert_action(previous.is_some()),
        });
    }

    pub fn remove_progress(&self, habit_id: &str, date: NaiveDate) -> bool {
        let removed = self
            .write()
            .progress
            .get_mut(habit_id)
            .and_then(|series| series.remove(&date))
            .is_some();
        if removed {
            self.notify(StoreChange::Progress {
                habit_id: habit_id.to_string(),
                date,
                action: ChangeAction::Removed,
            });
        }
        removed
    }

    fn notify(&self, change: StoreChange) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    fn read(&self) -> RwLockReadGuard<'_, DiaryData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DiaryData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn insert_action(existed: bool) -> ChangeAction {
    if existed {
        ChangeAction::Edited
    } else {
        ChangeAction::Added
    }
}

impl DiaryStore for InMemoryStore {
    fn mood_records_in_range(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<MoodRecord>, CorrelationError> {
        Ok(self
            .read()
            .moods
            .range(window.start..=window.end)
            .map(|(&date, &value)| MoodRecord { date, value })
            .collect())
    }

    fn progress_records_in_range(
        &self,
        habit_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<ProgressRecord>, CorrelationError> {
        Ok(self
            .read()
            .progress
            .get(habit_id)
            .map(|series| {
                series
                    .range(window.start..=window.end)
                    .map(|(&date, &value)| ProgressRecord::new(date, value))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn habit_catalog(&self) -> Result<Vec<HabitDefinition>, CorrelationError> {
        Ok(self.read().habits.clone())
    }
}
