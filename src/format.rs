//! Presentation formatting
//!
//! Text forms of correlation results as shown on the insight cards. The exact
//! strings are part of the host contract.

use serde::{Deserialize, Serialize};

use crate::types::{CorrelationResult, ResultSet};

/// Shown instead of the list when a window has no results
pub const NOT_ENOUGH_DATA: &str = "Not enough data";

/// Shown for an undefined coefficient
pub const COEFFICIENT_NA: &str = "N/A";

/// Shown for an undefined p-value
pub const P_VALUE_NA: &str = "(p N/A)";

/// p-values below this are shown as `p < 0.001`
const P_VALUE_FLOOR: f64 = 0.001;

/// `+0.87`, `-0.50`, `N/A`
pub fn format_coefficient(coefficient: Option<f64>) -> String {
    match coefficient {
        Some(rho) if rho >= 0.0 => format!("+{:.2}", rho.abs()),
        Some(rho) => format!("{rho:.2}"),
        None => COEFFICIENT_NA.to_string(),
    }
}

/// `p < 0.001`, `p = 0.058`, `(p N/A)`
pub fn format_p_value(p_value: Option<f64>) -> String {
    match p_value {
        Some(p) if p < P_VALUE_FLOOR => format!("p < {P_VALUE_FLOOR:.3}"),
        Some(p) => format!("p = {p:.3}"),
        None => P_VALUE_NA.to_string(),
    }
}

/// Display-ready row for one habit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDisplay {
    pub habit_id: String,
    pub habit_name: String,
    pub habit_icon_key: String,
    pub n: usize,
    pub coefficient: String,
    pub p_value: String,
    pub is_significant: bool,
}

impl From<&CorrelationResult> for ResultDisplay {
    fn from(result: &CorrelationResult) -> Self {
        Self {
            habit_id: result.habit_id.clone(),
            habit_name: result.habit_name.clone(),
            habit_icon_key: result.habit_icon_key.clone(),
            n: result.n,
            coefficient: format_coefficient(result.coefficient),
            p_value: format_p_value(result.p_value),
            is_significant: result.is_significant,
        }
    }
}

/// Rows for every result, in result-set order
pub fn display_rows(results: &ResultSet) -> Vec<ResultDisplay> {
    results.iter().map(ResultDisplay::from).collect()
}
