//! Correlation estimation
//!
//! Spearman's rank correlation between a habit series and the mood series,
//! computed as the Pearson correlation of the midranks.

use crate::error::CorrelationError;
use crate::rank::rank;

/// Smallest sample for which a coefficient is reported
pub const MIN_SAMPLES: usize = 4;

/// Compute Spearman's rho for two equal-length series.
///
/// Returns `Ok(None)` when the coefficient is undefined: fewer than
/// [`MIN_SAMPLES`] observations, or either series has no variance.
pub fn correlate(habit_values: &[f64], mood_values: &[f64]) -> Result<Option<f64>, CorrelationError> {
    if habit_values.len() != mood_values.len() {
        return Err(CorrelationError::LengthMismatch {
            habit: habit_values.len(),
            mood: mood_values.len(),
        });
    }
    if habit_values.len() < MIN_SAMPLES {
        return Ok(None);
    }

    let habit_ranks = rank(habit_values);
    let mood_ranks = rank(mood_values);
    Ok(pearson(&habit_ranks, &mood_ranks))
}

/// Pearson correlation of two equal-length series, `None` on zero variance.
///
/// The population (1/n) factors of covariance and variances cancel, so the raw
/// sums of deviation products are used.
fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }

    let rho = sxy / (sxx * syy).sqrt();
    if rho.is_nan() {
        return None;
    }
    Some(rho.clamp(-1.0, 1.0))
}
