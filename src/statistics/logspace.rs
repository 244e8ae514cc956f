//! Log-space reductions.
//!
//! Per-source likelihoods are averages of densities that can span hundreds of
//! orders of magnitude; every sum here is carried out with the maximum
//! factored out.

/// ln(e^a + e^b).
#[inline]
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// ln Σ e^{x_i}. Returns `-inf` for an empty slice or all `-inf` input.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Single-pass ln Σ e^{x_i} over an iterator, rescaling the running sum
/// whenever a new maximum appears.
pub fn log_sum_exp_iter<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for v in values {
        if v == f64::NEG_INFINITY || v.is_nan() {
            continue;
        }
        if v > max {
            sum = sum * (max - v).exp() + 1.0;
            max = v;
        } else {
            sum += (v - max).exp();
        }
    }
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + sum.ln()
    }
}

/// ln((1/n) Σ e^{x_i}).
pub fn log_mean_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(values) - (values.len() as f64).ln()
}

/// Log trapezoid-rule weights for abscissae `x`.
///
/// `ln Σ_j w_j y_j` with these weights equals the trapezoid integral of `y`.
/// A single abscissa gets weight 1 (ln 1 = 0).
pub fn trapezoid_log_weights(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|j| {
                let left = if j > 0 { x[j] - x[j - 1] } else { 0.0 };
                let right = if j + 1 < n { x[j + 1] - x[j] } else { 0.0 };
                (0.5 * (left + right)).ln()
            })
            .collect(),
    }
}

/// ln ∫ e^{ln_y} dx by the trapezoid rule.
pub fn log_trapezoid(x: &[f64], ln_y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), ln_y.len());
    let terms: Vec<f64> = trapezoid_log_weights(x)
        .iter()
        .zip(ln_y)
        .map(|(w, y)| w + y)
        .collect();
    log_sum_exp(&terms)
}

/// Linear interpolation of log values `ln_y` tabulated on increasing `x`.
///
/// Returns `-inf` outside `[x[0], x[n-1]]`.
pub fn interp_ln(x: &[f64], ln_y: &[f64], at: f64) -> f64 {
    debug_assert_eq!(x.len(), ln_y.len());
    let n = x.len();
    if n == 0 || !(x[0]..=x[n - 1]).contains(&at) {
        return f64::NEG_INFINITY;
    }
    let hi = x.partition_point(|&v| v < at);
    if hi == 0 {
        return ln_y[0];
    }
    let lo = hi - 1;
    let (y0, y1) = (ln_y[lo], ln_y[hi]);
    if y0 == f64::NEG_INFINITY || y1 == f64::NEG_INFINITY {
        // Interpolating towards -inf; fall back to the nearer node.
        return if at - x[lo] < x[hi] - at { y0 } else { y1 };
    }
    let t = (at - x[lo]) / (x[hi] - x[lo]);
    y0 + t * (y1 - y0)
}

/// `n` evenly spaced points on `[start, stop]`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_add_exp_matches_direct() {
        let (a, b) = (1.5_f64, -0.3_f64);
        let direct = (a.exp() + b.exp()).ln();
        assert!((log_add_exp(a, b) - direct).abs() < 1e-12);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, 2.0), 2.0);
    }

    #[test]
    fn test_log_sum_exp_stable_for_large_magnitudes() {
        let values = [-1000.0, -1000.0];
        let result = log_sum_exp(&values);
        assert!((result - (-1000.0 + 2.0_f64.ln())).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_sum_exp_iter_matches_slice_version() {
        let values = [-3.0, 10.0, 2.5, f64::NEG_INFINITY, -700.0];
        let a = log_sum_exp(&values);
        let b = log_sum_exp_iter(values.iter().copied());
        assert!((a - b).abs() < 1e-12);
        assert_eq!(log_sum_exp_iter(std::iter::empty()), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_mean_exp() {
        let values = [0.0_f64.ln(), 2.0_f64.ln(), 4.0_f64.ln()];
        assert!((log_mean_exp(&values) - 2.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_trapezoid_integrates_line() {
        // ∫_0^2 x dx = 2
        let x = linspace(0.0, 2.0, 21);
        let ln_y: Vec<f64> = x.iter().map(|v| v.ln()).collect();
        assert!((log_trapezoid(&x, &ln_y) - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_interp_ln_inside_and_outside() {
        let x = [0.0, 1.0, 2.0];
        let ln_y = [0.0, 2.0, f64::NEG_INFINITY];
        assert!((interp_ln(&x, &ln_y, 0.25) - 0.5).abs() < 1e-12);
        assert_eq!(interp_ln(&x, &ln_y, 1.0), 2.0);
        assert_eq!(interp_ln(&x, &ln_y, 1.2), 2.0);
        assert_eq!(interp_ln(&x, &ln_y, 1.8), f64::NEG_INFINITY);
        assert_eq!(interp_ln(&x, &ln_y, -0.1), f64::NEG_INFINITY);
        assert_eq!(interp_ln(&x, &ln_y, 2.1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_linspace_endpoints() {
        let x = linspace(1.0, 3.0, 5);
        assert_eq!(x, vec![1.0, 1.5, 2.0, 2.5, 3.0]);
        assert_eq!(linspace(4.0, 5.0, 1), vec![4.0]);
    }
}
