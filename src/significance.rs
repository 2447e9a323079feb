//! Significance testing
//!
//! Two-sided p-value for a Spearman coefficient under the null hypothesis of no
//! monotonic association, using the Student-t approximation
//! `t = rho * sqrt((n - 2) / (1 - rho^2))` with `n - 2` degrees of freedom.
//!
//! The t survival function is evaluated through the regularized incomplete beta
//! function, which stays accurate for the small integer degrees of freedom seen
//! in daily diary windows (2 to a few hundred).

use crate::estimator::MIN_SAMPLES;

/// Lanczos approximation parameters (g = 7, n = 9)
const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Continued fraction limits
const MAX_ITERATIONS: usize = 300;
const EPSILON: f64 = 1e-15;
const FLOAT_MIN: f64 = 1e-300;

/// Two-sided p-value for `rho` estimated from `n` paired observations.
///
/// Returns `None` when `n` is below the minimum sample or `rho` is not finite.
/// A perfect association (`|rho| == 1`) has an infinite t statistic and is
/// reported as `Some(0.0)`.
pub fn significance(rho: f64, n: usize) -> Option<f64> {
    if n < MIN_SAMPLES || !rho.is_finite() {
        return None;
    }
    if rho.abs() >= 1.0 {
        return Some(0.0);
    }

    let df = (n - 2) as f64;
    let t = rho * (df / (1.0 - rho * rho)).sqrt();
    Some(student_t_two_sided(t, df))
}

/// Two-sided tail probability `P(|T| >= |t|)` for Student's t with `df` degrees
/// of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(x, df / 2.0, 0.5).clamp(0.0, 1.0)
}

/// Regularized incomplete beta function `I_x(a, b)` for `a, b > 0`.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (-x).ln_1p();
    let front = ln_front.exp();

    // The continued fraction converges fastest below the mean; use the
    // symmetry I_x(a, b) = 1 - I_{1-x}(b, a) above it.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = non_zero(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        // even step
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = non_zero(1.0 + aa * d).recip();
        c = non_zero(1.0 + aa / c);
        h *= d * c;

        // odd step
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = non_zero(1.0 + aa * d).recip();
        c = non_zero(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    h
}

fn non_zero(value: f64) -> f64 {
    if value.abs() < FLOAT_MIN {
        FLOAT_MIN
    } else {
        value
    }
}

/// Natural log of the gamma function for `x > 0` (Lanczos).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_ln_gamma() {
        assert_close(ln_gamma(1.0), 0.0, 1e-12);
        assert_close(ln_gamma(2.0), 0.0, 1e-12);
        assert_close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-12);
        // ln(9!) = ln(362880)
        assert_close(ln_gamma(10.0), 362_880f64.ln(), 1e-10);
    }

    #[test]
    fn test_incomplete_beta_reference_values() {
        assert_close(regularized_incomplete_beta(0.3, 2.0, 3.0), 0.3483, 1e-12);
        assert_close(regularized_incomplete_beta(0.5, 0.5, 0.5), 0.5, 1e-12);
        assert_eq!(regularized_incomplete_beta(0.0, 2.0, 3.0), 0.0);
        assert_eq!(regularized_incomplete_beta(1.0, 2.0, 3.0), 1.0);
    }

    #[test]
    fn test_student_t_reference_values() {
        assert_close(student_t_two_sided(3.0, 3.0), 0.057_668_885_622_437_3, 1e-10);
        assert_close(student_t_two_sided(2.0, 10.0), 0.073_388_034_770_740_4, 1e-10);
        assert_close(student_t_two_sided(1.0, 2.0), 0.422_649_730_810_374, 1e-10);
        assert_close(student_t_two_sided(0.5, 30.0), 0.620_723_004_885_128, 1e-10);
        assert_close(student_t_two_sided(2.5, 8.0), 0.036_942_037_713_624_1, 1e-10);
        assert_close(student_t_two_sided(5.0, 363.0), 8.941_207_932_327_21e-7, 1e-12);
    }

    #[test]
    fn test_student_t_is_symmetric() {
        assert_eq!(student_t_two_sided(-2.0, 10.0), student_t_two_sided(2.0, 10.0));
        assert_eq!(student_t_two_sided(0.0, 10.0), 1.0);
        assert_eq!(student_t_two_sided(f64::INFINITY, 10.0), 0.0);
    }

    #[test]
    fn test_significance_of_strong_binary_association() {
        // rho = sqrt(3)/2 over 5 days gives t = 3 with 3 degrees of freedom
        let rho = 7.5 / 75f64.sqrt();
        let p = significance(rho, 5).unwrap();
        assert_close(p, 0.057_668_885_622_437_3, 1e-9);
        assert!(p > 0.05);
    }

    #[test]
    fn test_perfect_association_has_zero_p() {
        assert_eq!(significance(1.0, 4), Some(0.0));
        assert_eq!(significance(-1.0, 30), Some(0.0));
    }

    #[test]
    fn test_undefined_inputs() {
        assert_eq!(significance(0.5, 3), None);
        assert_eq!(significance(f64::NAN, 10), None);
    }

    #[test]
    fn test_p_value_in_unit_interval() {
        for n in MIN_SAMPLES..=365 {
            for rho in [-0.99, -0.5, -0.01, 0.0, 0.3, 0.75, 0.999] {
                let p = significance(rho, n).unwrap();
                assert!((0.0..=1.0).contains(&p), "p {p} for rho {rho}, n {n}");
            }
        }
        assert_eq!(significance(0.0, 20), Some(1.0));
    }
}
