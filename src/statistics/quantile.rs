//! Quantiles of posterior samples and of tabulated distributions.
//!
//! Sample quantiles use the "R-7" definition (linear interpolation between
//! order statistics), matching the usual dataframe quantile.

/// Compute a single quantile from a mutable slice.
///
/// Uses `select_nth_unstable()` for O(n) expected time complexity.
/// The slice is partially reordered as a side effect.
///
/// # Panics
///
/// Panics if `data` is empty or if `p` is outside [0, 1].
pub fn compute_quantile(data: &mut [f64], p: f64) -> f64 {
    assert!(!data.is_empty(), "Cannot compute quantile of empty slice");
    assert!(
        (0.0..=1.0).contains(&p),
        "Quantile probability must be in [0, 1]"
    );

    let n = data.len();
    if n == 1 {
        return data[0];
    }

    let h = (n - 1) as f64 * p;
    let h_floor = h.floor() as usize;
    let h_frac = h - h.floor();

    if h_floor >= n - 1 {
        let (_, &mut max, _) = data.select_nth_unstable_by(n - 1, |a, b| a.total_cmp(b));
        return max;
    }

    let (_, &mut lower, upper) = data.select_nth_unstable_by(h_floor, |a, b| a.total_cmp(b));

    if h_frac == 0.0 {
        return lower;
    }

    // Smallest element of the upper partition is the next order statistic
    let upper_min = upper
        .iter()
        .copied()
        .min_by(|a, b| a.total_cmp(b))
        .unwrap_or(lower);

    lower + h_frac * (upper_min - lower)
}

/// Compute several quantiles at once, sorting a copy of `data` once.
///
/// # Panics
///
/// Panics if `data` is empty or any probability is outside [0, 1].
pub fn compute_quantiles(data: &[f64], probabilities: &[f64]) -> Vec<f64> {
    assert!(!data.is_empty(), "Cannot compute quantiles of empty slice");

    let mut sorted = data.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    compute_quantiles_sorted(&sorted, probabilities)
}

/// Compute quantiles from data already sorted in ascending order.
///
/// # Panics
///
/// Panics if `sorted` is empty or any probability is outside [0, 1].
pub fn compute_quantiles_sorted(sorted: &[f64], probabilities: &[f64]) -> Vec<f64> {
    assert!(!sorted.is_empty(), "Cannot compute quantiles of empty slice");

    let n = sorted.len();
    probabilities
        .iter()
        .map(|&p| {
            assert!(
                (0.0..=1.0).contains(&p),
                "Quantile probability must be in [0, 1]"
            );
            let h = (n - 1) as f64 * p;
            let h_floor = h.floor() as usize;
            let h_frac = h - h.floor();

            if h_floor >= n - 1 {
                sorted[n - 1]
            } else if h_frac == 0.0 {
                sorted[h_floor]
            } else {
                sorted[h_floor] + h_frac * (sorted[h_floor + 1] - sorted[h_floor])
            }
        })
        .collect()
}

/// Invert a tabulated, non-decreasing CDF by linear interpolation.
///
/// `x` and `cdf` must have equal length. The CDF need not end exactly at 1;
/// `p` is interpreted relative to its final value.
pub fn quantile_from_cdf(x: &[f64], cdf: &[f64], p: f64) -> f64 {
    debug_assert_eq!(x.len(), cdf.len());
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    let total = cdf[n - 1];
    if n == 1 || total <= 0.0 {
        return x[0];
    }

    let target = p.clamp(0.0, 1.0) * total;
    let idx = cdf.partition_point(|&c| c < target);
    if idx == 0 {
        return x[0];
    }
    if idx >= n {
        return x[n - 1];
    }

    let (c0, c1) = (cdf[idx - 1], cdf[idx]);
    if c1 <= c0 {
        return x[idx];
    }
    x[idx - 1] + (target - c0) / (c1 - c0) * (x[idx] - x[idx - 1])
}
