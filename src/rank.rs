//! Rank transform
//!
//! Converts observations into ranks with the midrank rule: every member of a run
//! of tied values receives the mean of the ranks the run occupies. Habit and mood
//! values live on coarse ordinal scales where ties are the normal case.

/// Rank `values` (1-based), resolving ties by midrank.
///
/// Output has the same length and order as the input.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j hold ranks i+1..=j
        let midrank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = midrank;
        }
        i = j;
    }

    ranks
}
