//! Correlation orchestration
//!
//! Runs every habit in the catalog through the pipeline for one window:
//! 1. SeriesAssembler - Align habit progress with mood
//! 2. rank / correlate - Spearman's rho
//! 3. significance - Two-sided p-value
//! 4. Sort and publish as a [`ResultSet`]
//!
//! Failures are contained per habit. Only a failure to read the catalog or the
//! mood series (which every habit needs) aborts the pass.

use log::{debug, error, info, warn};
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use crate::assembler::{MoodSeries, SeriesAssembler};
use crate::config::EngineConfig;
use crate::error::CorrelationError;
use crate::estimator::correlate;
use crate::significance::significance;
use crate::store::DiaryStore;
use crate::types::{CorrelationResult, DateWindow, HabitDefinition, ResultSet};

/// Batch correlation engine.
///
/// Stateless apart from its configuration; the same inputs always produce the
/// same [`ResultSet`].
#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    config: EngineConfig,
}

impl CorrelationEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a validated configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, CorrelationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute correlations for every habit over `window`.
    ///
    /// A total read failure is logged and yields an empty result set.
    pub fn compute_all<S: DiaryStore + ?Sized>(&self, store: &S, window: &DateWindow) -> ResultSet {
        match self.run(store, window, None) {
            Ok(results) => results,
            Err(e) => self.abort(window, e),
        }
    }

    /// Like [`compute_all`](Self::compute_all), but checks `cancel` between
    /// habits. Returns `Err(CorrelationError::Cancelled)` when cancelled; no
    /// partial result set is ever returned.
    pub fn compute_all_cancellable<S: DiaryStore + ?Sized>(
        &self,
        store: &S,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<ResultSet, CorrelationError> {
        match self.run(store, window, Some(cancel)) {
            Ok(results) => Ok(results),
            Err(CorrelationError::Cancelled) => Err(CorrelationError::Cancelled),
            Err(e) => Ok(self.abort(window, e)),
        }
    }

    /// Correlation for a single habit against an already validated mood series.
    ///
    /// Returns `Err(InsufficientData)` when the habit has fewer paired
    /// observations than `min_samples`.
    pub fn compute_habit<S: DiaryStore + ?Sized>(
        &self,
        store: &S,
        habit: &HabitDefinition,
        moods: &MoodSeries,
        window: &DateWindow,
    ) -> Result<CorrelationResult, CorrelationError> {
        let progress = store.progress_records_in_range(&habit.id, window)?;
        let series = SeriesAssembler::pair(habit, moods, &progress, window)?;

        let n = series.len();
        if n < self.config.min_samples {
            return Err(CorrelationError::InsufficientData {
                habit_id: habit.id.clone(),
                n,
            });
        }

        let coefficient = correlate(series.habit_values(), series.mood_values())?;
        let p_value = coefficient.and_then(|rho| significance(rho, n));

        Ok(CorrelationResult::new(
            habit,
            n,
            coefficient,
            p_value,
            self.config.significance_level,
        ))
    }

    fn run<S: DiaryStore + ?Sized>(
        &self,
        store: &S,
        window: &DateWindow,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResultSet, CorrelationError> {
        let catalog = store.habit_catalog()?;
        let moods = MoodSeries::from_records(&store.mood_records_in_range(window)?, window)?;
        debug!(
            "computing correlations for {} habits over {} ({} mood days)",
            catalog.len(),
            window.label(),
            moods.len()
        );

        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(catalog.len());
        for habit in &catalog {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                debug!("correlation pass for {} cancelled", window.label());
                return Err(CorrelationError::Cancelled);
            }
            if !seen.insert(habit.id.as_str()) {
                warn!("habit {} appears twice in the catalog; skipping duplicate", habit.id);
                continue;
            }

            match self.compute_habit(store, habit, &moods, window) {
                Ok(result) => results.push(result),
                Err(CorrelationError::InsufficientData { habit_id, n }) => {
                    debug!("habit {habit_id} skipped: {n} paired observations");
                }
                Err(e) => warn!("habit {} dropped from correlation results: {e}", habit.id),
            }
        }

        sort_results(&mut results);
        info!(
            "computed {} habit correlations over {}",
            results.len(),
            window.label()
        );
        Ok(ResultSet::new(*window, results))
    }

    fn abort(&self, window: &DateWindow, e: CorrelationError) -> ResultSet {
        error!("correlation pass over {} aborted: {e}", window.label());
        ResultSet::empty(Some(*window))
    }
}

/// Strongest associations first regardless of sign; undefined coefficients
/// last; then by display name and habit id.
pub fn sort_results(results: &mut [CorrelationResult]) {
    results.sort_by(compare_results);
}

fn compare_results(a: &CorrelationResult, b: &CorrelationResult) -> Ordering {
    let by_strength = match (a.coefficient, b.coefficient) {
        (Some(x), Some(y)) => y.abs().total_cmp(&x.abs()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_strength
        .then_with(|| a.habit_name.cmp(&b.habit_name))
        .then_with(|| a.habit_id.cmp(&b.habit_id))
}
