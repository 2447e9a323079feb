//! Diary storage collaborator
//!
//! The engine never owns diary storage. It reads mood records, progress records
//! and the habit catalog through [`DiaryStore`], which the host application
//! implements over its own database.

mod memory;

pub use memory::InMemoryStore;

use crate::error::CorrelationError;
use crate::types::{DateWindow, HabitDefinition, MoodRecord, ProgressRecord};

/// Read-only access to the diary records the engine correlates
pub trait DiaryStore: Send + Sync {
    /// Mood records dated inside `window`
    fn mood_records_in_range(&self, window: &DateWindow)
        -> Result<Vec<MoodRecord>, CorrelationError>;

    /// Progress records for one habit dated inside `window`
    fn progress_records_in_range(
        &self,
        habit_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<ProgressRecord>, CorrelationError>;

    /// All tracked habits
    fn habit_catalog(&self) -> Result<Vec<HabitDefinition>, CorrelationError>;
}

impl<S: DiaryStore + ?Sized> DiaryStore for std::sync::Arc<S> {
    fn mood_records_in_range(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<MoodRecord>, CorrelationError> {
        (**self).mood_records_in_range(window)
    }

    fn progress_records_in_range(
        &self,
        habit_id: &str,
        window: &DateWindow,
    ) -> Result<Vec<ProgressRecord>, CorrelationError> {
        (**self).progress_records_in_range(habit_id, window)
    }

    fn habit_catalog(&self) -> Result<Vec<HabitDefinition>, CorrelationError> {
        (**self).habit_catalog()
    }
}
