//! Resampling of weighted and tabulated draws.
//!
//! Nested-sampling dead points carry importance weights and must be turned
//! into equally weighted posterior draws; evidence grids are tabulated
//! densities that must be turned into samples when a source is consumed by
//! Monte-Carlo integration.

use rand::Rng;

/// Counter-based RNG seed generation using SplitMix64.
///
/// Derives a well-mixed, deterministic seed from a base seed and a counter
/// so that per-source streams are independent yet reproducible.
#[inline]
pub fn counter_rng_seed(base_seed: u64, counter: u64) -> u64 {
    // SplitMix64, see https://xoshiro.di.unimi.it/splitmix64.c
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Choose `n` distinct indices out of `len` without replacement.
///
/// Returns every index in order when `n >= len`.
pub fn subsample_indices<R: Rng + ?Sized>(len: usize, n: usize, rng: &mut R) -> Vec<usize> {
    if n >= len {
        return (0..len).collect();
    }
    let mut indices = rand::seq::index::sample(rng, len, n).into_vec();
    indices.sort_unstable();
    indices
}

/// Rejection resampling of importance-weighted points.
///
/// Point `i` is kept with probability `w_i / max(w)`, which yields equally
/// weighted draws without duplicates. The highest-weight point is always
/// kept, so the output is non-empty whenever any weight is finite.
pub fn rejection_resample<R: Rng + ?Sized>(log_weights: &[f64], rng: &mut R) -> Vec<usize> {
    let max = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Vec::new();
    }

    let mut kept = Vec::new();
    for (i, &lw) in log_weights.iter().enumerate() {
        let keep = (lw - max).exp();
        if keep >= 1.0 || rng.random::<f64>() < keep {
            kept.push(i);
        }
    }
    kept
}

/// Draw `n` values from a density tabulated in log space on abscissae `x`.
///
/// The density is treated as piecewise linear between abscissae and sampled
/// by inverting its cumulative integral.
pub fn sample_tabulated<R: Rng + ?Sized>(x: &[f64], ln_density: &[f64], n: usize, rng: &mut R) -> Vec<f64> {
    debug_assert_eq!(x.len(), ln_density.len());
    if x.is_empty() {
        return Vec::new();
    }
    if x.len() == 1 {
        return vec![x[0]; n];
    }

    let max = ln_density.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Vec::new();
    }
    let density: Vec<f64> = ln_density.iter().map(|&l| (l - max).exp()).collect();

    let mut cdf = Vec::with_capacity(x.len());
    cdf.push(0.0);
    for j in 1..x.len() {
        let area = 0.5 * (density[j] + density[j - 1]) * (x[j] - x[j - 1]);
        cdf.push(cdf[j - 1] + area);
    }

    (0..n)
        .map(|_| super::quantile::quantile_from_cdf(x, &cdf, rng.random::<f64>()))
        .collect()
}
