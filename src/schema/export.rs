//! diary.export.v1 schema definition
//!
//! A self-contained snapshot of the diary data the engine reads: the habit
//! catalog, daily mood records and per-habit progress records. Hosts that do
//! not implement [`crate::store::DiaryStore`] natively hand this document to the
//! engine (directly or through the FFI layer).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::types::{HabitDefinition, MoodRecord, ProgressRecord};

/// Current schema version
pub const SCHEMA_VERSION: &str = "diary.export.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Diary snapshot document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiaryExport {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Habit catalog
    #[serde(default)]
    pub habits: Vec<HabitDefinition>,
    /// Daily mood records
    #[serde(default)]
    pub moods: Vec<MoodRecord>,
    /// Progress records keyed by habit id
    #[serde(default)]
    pub progress: BTreeMap<String, Vec<ProgressRecord>>,
}

impl DiaryExport {
    /// Parse a document from JSON without validating it
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Structural checks: schema version, unique habit ids, one record per day.
    ///
    /// Value ranges are not checked here; the assembler rejects out-of-scale
    /// values per habit so one bad record cannot hide the rest of the diary.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        let mut ids = HashSet::new();
        for habit in &self.habits {
            if !ids.insert(habit.id.as_str()) {
                return Err(ValidationError::DuplicateHabit(habit.id.clone()));
            }
        }

        let mut dates = HashSet::new();
        for mood in &self.moods {
            if !dates.insert(mood.date) {
                return Err(ValidationError::DuplicateDate {
                    series: "mood".to_string(),
                    date: mood.date.to_string(),
                });
            }
        }

        for (habit_id, records) in &self.progress {
            let mut dates = HashSet::new();
            for record in records {
                if !dates.insert(record.date) {
                    return Err(ValidationError::DuplicateDate {
                        series: habit_id.clone(),
                        date: record.date.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Validation errors for diary exports
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Duplicate habit id: {0}")]
    DuplicateHabit(String),

    #[error("Duplicate record for {series} on {date}")]
    DuplicateDate { series: String, date: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "schema_version": "diary.export.v1",
            "habits": [
                { "id": "run", "name": "Running", "icon_key": "figure.run", "kind": "binary" },
                { "id": "stress", "name": "Stress", "icon_key": "brain", "kind": "graded" }
            ],
            "moods": [
                { "date": "2024-01-01", "value": 3 },
                { "date": "2024-01-02", "value": 1 }
            ],
            "progress": {
                "run": [
                    { "date": "2024-01-01", "value": 1 },
                    { "date": "2024-01-02", "value": null }
                ]
            }
        }"#
    }

    #[test]
    fn test_parse_export() {
        let export = DiaryExport::from_json(sample_json()).unwrap();
        assert_eq!(export.habits.len(), 2);
        assert_eq!(export.moods[0].value, 3);
        assert_eq!(export.progress["run"][1].value, None);
        assert!(export.validate().is_ok());
    }

    #[test]
    fn test_schema_version_defaults() {
        let export = DiaryExport::from_json(r#"{ "habits": [] }"#).unwrap();
        assert_eq!(export.schema_version, SCHEMA_VERSION);
        assert!(export.validate().is_ok());
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut export = DiaryExport::from_json(sample_json()).unwrap();
        export.schema_version = "diary.export.v0".to_string();
        assert!(matches!(
            export.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_mood_date() {
        let mut export = DiaryExport::from_json(sample_json()).unwrap();
        let first = export.moods[0];
        export.moods.push(first);
        assert!(matches!(
            export.validate(),
            Err(ValidationError::DuplicateDate { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_habit() {
        let mut export = DiaryExport::from_json(sample_json()).unwrap();
        let first = export.habits[0].clone();
        export.habits.push(first);
        assert!(matches!(
            export.validate(),
            Err(ValidationError::DuplicateHabit(_))
        ));
    }
}
