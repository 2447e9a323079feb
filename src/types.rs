//! Core types for the Mood Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw diary records, paired observation series, and correlation
//! results published to the presentation layer.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CorrelationError;

/// Ordinal mood scale recorded once per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodLevel {
    VeryBad,
    Bad,
    Neutral,
    Good,
    VeryGood,
}

impl MoodLevel {
    /// Map a stored integer (0..=4) to a mood level
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(MoodLevel::VeryBad),
            1 => Some(MoodLevel::Bad),
            2 => Some(MoodLevel::Neutral),
            3 => Some(MoodLevel::Good),
            4 => Some(MoodLevel::VeryGood),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Intensity scale for graded habits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradedLevel {
    None,
    Low,
    Medium,
    High,
    Extreme,
}

impl GradedLevel {
    /// Map a stored integer (0..=4) to a graded level
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(GradedLevel::None),
            1 => Some(GradedLevel::Low),
            2 => Some(GradedLevel::Medium),
            3 => Some(GradedLevel::High),
            4 => Some(GradedLevel::Extreme),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// How a habit's completion is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    /// Done (1) or not done (0)
    Binary,
    /// Ordinal level, see [`GradedLevel`]
    Graded,
}

impl HabitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitKind::Binary => "binary",
            HabitKind::Graded => "graded",
        }
    }

    /// Resolve a stored value into the numeric value used by the statistics
    /// stages. Returns `None` when the value is outside the kind's scale.
    pub fn resolve(&self, value: u8) -> Option<f64> {
        match self {
            HabitKind::Binary => match value {
                0 | 1 => Some(value as f64),
                _ => None,
            },
            HabitKind::Graded => GradedLevel::from_value(value).map(|l| l.value() as f64),
        }
    }
}

/// A habit from the host application's catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDefinition {
    /// Stable habit identifier
    pub id: String,
    /// Display name shown to the user
    pub name: String,
    /// Icon key resolved by the presentation layer
    pub icon_key: String,
    /// Binary or graded completion
    pub kind: HabitKind,
}

impl HabitDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        icon_key: impl Into<String>,
        kind: HabitKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon_key: icon_key.into(),
            kind,
        }
    }
}

/// Stored daily mood record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodRecord {
    pub date: NaiveDate,
    /// Raw mood value, expected 0..=4
    pub value: u8,
}

impl MoodRecord {
    pub fn new(date: NaiveDate, mood: MoodLevel) -> Self {
        Self {
            date,
            value: mood.value(),
        }
    }
}

/// Stored daily progress record for one habit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub date: NaiveDate,
    /// Raw completion value; `None` means "not applicable" for that day
    pub value: Option<u8>,
}

impl ProgressRecord {
    pub fn new(date: NaiveDate, value: Option<u8>) -> Self {
        Self { date, value }
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateWindow")]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Unvalidated wire form of [`DateWindow`]
#[derive(Deserialize)]
struct RawDateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateWindow> for DateWindow {
    type Error = CorrelationError;

    fn try_from(raw: RawDateWindow) -> Result<Self, Self::Error> {
        DateWindow::new(raw.start, raw.end)
    }
}

impl DateWindow {
    /// Create a window, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CorrelationError> {
        if start > end {
            return Err(CorrelationError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` calendar days ending on (and including) `end`
    pub fn last_days(end: NaiveDate, days: u32) -> Result<Self, CorrelationError> {
        if days == 0 {
            return Err(CorrelationError::InvalidWindow(
                "window must span at least one day".to_string(),
            ));
        }
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days) - 1))
            .ok_or_else(|| CorrelationError::InvalidWindow(format!("{days} days before {end}")))?;
        Ok(Self { start, end })
    }

    /// A full calendar month
    pub fn month(year: i32, month: u32) -> Result<Self, CorrelationError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CorrelationError::InvalidWindow(format!("{year}-{month:02}")))?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let end = next_month
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| CorrelationError::InvalidWindow(format!("{year}-{month:02}")))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Label used in log lines, e.g. `2024-01-01..2024-01-31`
    pub fn label(&self) -> String {
        if self.start.day() == 1 && self.end.succ_opt().map(|d| d.day()) == Some(1) {
            format!("{}-{:02}", self.start.year(), self.start.month())
        } else {
            format!("{}..{}", self.start, self.end)
        }
    }
}

/// One calendar date for one habit: the mood value and, when a progress
/// record exists, the habit's resolved value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub mood: f64,
    pub habit: Option<f64>,
}

/// Aligned habit and mood values for one habit over a window.
///
/// Only dates with both a mood record and a habit value are present. Dates are
/// strictly increasing and the three vectors always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairedSeries {
    pub habit_id: String,
    dates: Vec<NaiveDate>,
    habit_values: Vec<f64>,
    mood_values: Vec<f64>,
}

impl PairedSeries {
    pub fn empty(habit_id: impl Into<String>) -> Self {
        Self {
            habit_id: habit_id.into(),
            ..Default::default()
        }
    }

    /// Build from date-ordered observations, keeping only those with a habit value.
    ///
    /// Fails if dates are not strictly increasing.
    pub fn from_observations(
        habit_id: impl Into<String>,
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<Self, CorrelationError> {
        let mut series = Self::empty(habit_id);
        for obs in observations {
            let Some(habit) = obs.habit else {
                continue;
            };
            if let Some(last) = series.dates.last() {
                if obs.date <= *last {
                    return Err(CorrelationError::MalformedRecord(format!(
                        "habit {}: observation dates out of order at {}",
                        series.habit_id, obs.date
                    )));
                }
            }
            series.dates.push(obs.date);
            series.habit_values.push(habit);
            series.mood_values.push(obs.mood);
        }
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn habit_values(&self) -> &[f64] {
        &self.habit_values
    }

    pub fn mood_values(&self) -> &[f64] {
        &self.mood_values
    }
}

/// Correlation between one habit and mood over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub habit_id: String,
    pub habit_name: String,
    pub habit_icon_key: String,
    /// Number of paired observations
    pub n: usize,
    /// Spearman's rho in [-1, 1], `None` when undefined
    pub coefficient: Option<f64>,
    /// Two-sided p-value in [0, 1], `None` when undefined
    pub p_value: Option<f64>,
    /// `p_value < significance_level`; false when the p-value is undefined
    pub is_significant: bool,
}

impl CorrelationResult {
    pub fn new(
        habit: &HabitDefinition,
        n: usize,
        coefficient: Option<f64>,
        p_value: Option<f64>,
        significance_level: f64,
    ) -> Self {
        Self {
            habit_id: habit.id.clone(),
            habit_name: habit.name.clone(),
            habit_icon_key: habit.icon_key.clone(),
            n,
            coefficient,
            p_value,
            is_significant: p_value.is_some_and(|p| p < significance_level),
        }
    }
}

/// Ordered correlation results for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    window: Option<DateWindow>,
    results: Vec<CorrelationResult>,
}

impl ResultSet {
    pub(crate) fn new(window: DateWindow, results: Vec<CorrelationResult>) -> Self {
        Self {
            window: Some(window),
            results,
        }
    }

    /// Result set with no entries, optionally tied to a window
    pub fn empty(window: Option<DateWindow>) -> Self {
        Self {
            window,
            results: Vec::new(),
        }
    }

    pub fn window(&self) -> Option<DateWindow> {
        self.window
    }

    pub fn results(&self) -> &[CorrelationResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, habit_id: &str) -> Option<&CorrelationResult> {
        self.results.iter().find(|r| r.habit_id == habit_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CorrelationResult> {
        self.results.iter()
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a CorrelationResult;
    type IntoIter = std::slice::Iter<'a, CorrelationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// What happened to a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Added,
    Edited,
    Removed,
}

/// Change notification emitted by the diary store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreChange {
    Mood {
        date: NaiveDate,
        action: ChangeAction,
    },
    Progress {
        habit_id: String,
        date: NaiveDate,
        action: ChangeAction,
    },
    /// A habit was added to or removed from the catalog
    Catalog,
}

impl StoreChange {
    /// Date of the affected record, if the change concerns a single day
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            StoreChange::Mood { date, .. } | StoreChange::Progress { date, .. } => Some(*date),
            StoreChange::Catalog => None,
        }
    }

    /// Whether this change can affect results computed for `window`
    pub fn affects(&self, window: &DateWindow) -> bool {
        match self.date() {
            Some(date) => window.contains(date),
            None => true,
        }
    }
}
