//! Static nested sampling in the unit hypercube.
//!
//! Each iteration removes the lowest-likelihood live point, credits it with
//! the prior volume shed since the previous iteration, and replaces it with
//! a new point of at least that likelihood. Replacement is either by
//! rejection from the prior (`nestle`) or by a short constrained random walk
//! started from a surviving live point (`dynesty`).

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, info, warn};

use crate::config::{SampleOptions, SamplerKind};
use crate::error::SamplerError;
use crate::prior::Prior;
use crate::results::{PosteriorResult, SampleTable};
use crate::statistics::{log_add_exp, rejection_resample};
use crate::thread_pool;
use crate::types::HyperPoint;

use super::{LogLikelihood, Sampler};

/// Give up on a rejection replacement after this many prior draws.
const MAX_PRIOR_DRAWS: usize = 100_000;

/// Random walks tried from different starts before falling back to the prior.
const WALK_ATTEMPTS: usize = 3;

/// Iterations between progress messages.
const PROGRESS_INTERVAL: usize = 1_000;

/// Built-in nested sampler.
#[derive(Debug, Clone, Copy)]
pub struct NestedSampler {
    kind: SamplerKind,
}

#[derive(Debug, Clone)]
struct Point {
    unit: Vec<f64>,
    theta: Vec<f64>,
    logl: f64,
}

struct Dead {
    theta: Vec<f64>,
    logl: f64,
    logwt: f64,
}

/// Running evidence and information estimates.
struct Integrator {
    logz: f64,
    h: f64,
}

impl Integrator {
    fn add(&mut self, logl: f64, logwt: f64) {
        if logwt == f64::NEG_INFINITY {
            return;
        }
        let logz_new = log_add_exp(self.logz, logwt);
        let previous = if self.logz.is_finite() {
            (self.logz - logz_new).exp() * (self.h + self.logz)
        } else {
            0.0
        };
        self.h = (logwt - logz_new).exp() * logl + previous - logz_new;
        self.logz = logz_new;
    }
}

impl NestedSampler {
    /// Sampler using the given replacement strategy.
    pub fn new(kind: SamplerKind) -> Self {
        Self { kind }
    }

    /// Replacement strategy.
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    fn check_options(options: &SampleOptions) -> Result<(), SamplerError> {
        if options.nlive < 2 {
            return Err(SamplerError::InvalidOptions(format!(
                "nlive must be at least 2, got {}",
                options.nlive
            )));
        }
        if !(options.dlogz.is_finite() && options.dlogz > 0.0) {
            return Err(SamplerError::InvalidOptions(format!(
                "dlogz must be positive, got {}",
                options.dlogz
            )));
        }
        if options.max_iterations == 0 {
            return Err(SamplerError::InvalidOptions("max_iterations must be positive".to_string()));
        }
        Ok(())
    }
}

struct Problem<'a, 'b> {
    ln_likelihood: &'a LogLikelihood<'b>,
    priors: &'a [Prior],
}

impl Problem<'_, '_> {
    fn point(&self, unit: Vec<f64>) -> Point {
        let theta: Vec<f64> = self.priors.iter().zip(&unit).map(|(p, &u)| p.rescale(u)).collect();
        let logl = self.evaluate(&theta);
        Point { unit, theta, logl }
    }

    fn evaluate(&self, theta: &[f64]) -> f64 {
        let values: HyperPoint = self
            .priors
            .iter()
            .zip(theta)
            .map(|(p, &v)| (p.name().to_string(), v))
            .collect();
        let logl = (self.ln_likelihood)(&values);
        if logl.is_nan() {
            f64::NEG_INFINITY
        } else {
            logl
        }
    }

    fn initial_points(&self, units: Vec<Vec<f64>>) -> Vec<Point> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            thread_pool::install(|| units.into_par_iter().map(|u| self.point(u)).collect())
        }
        #[cfg(not(feature = "parallel"))]
        {
            thread_pool::install(|| units.into_iter().map(|u| self.point(u)).collect())
        }
    }
}

impl Sampler for NestedSampler {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn run(
        &self,
        ln_likelihood: &LogLikelihood<'_>,
        priors: &[Prior],
        options: &SampleOptions,
    ) -> Result<PosteriorResult, SamplerError> {
        if priors.is_empty() {
            return Err(SamplerError::NoPriors);
        }
        Self::check_options(options)?;

        let ndim = priors.len();
        let nlive = options.nlive;
        let seed = options.seed.unwrap_or_else(rand::random);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let problem = Problem { ln_likelihood, priors };

        info!(
            sampler = self.name(),
            nlive,
            ndim,
            dlogz = options.dlogz,
            "starting nested sampling"
        );

        let units: Vec<Vec<f64>> = (0..nlive)
            .map(|_| (0..ndim).map(|_| rng.random::<f64>()).collect())
            .collect();
        let mut live = problem.initial_points(units);
        let mut ncall = nlive;

        if live.iter().all(|p| p.logl == f64::NEG_INFINITY) {
            return Err(SamplerError::ZeroLikelihood);
        }

        let shrink = 1.0 / nlive as f64;
        // ln(1 - e^{-1/n}), the fraction of volume shed per iteration.
        let ln_shell = (-(-shrink).exp_m1()).ln();
        let mut logvol = 0.0;
        let mut integrator = Integrator {
            logz: f64::NEG_INFINITY,
            h: 0.0,
        };
        let mut dead: Vec<Dead> = Vec::new();
        let mut scale = 0.1_f64;
        let mut converged = false;

        for iteration in 0..options.max_iterations {
            let worst = argmin_logl(&live);
            let logl_star = live[worst].logl;
            let logwt = logl_star + logvol + ln_shell;
            integrator.add(logl_star, logwt);
            dead.push(Dead {
                theta: live[worst].theta.clone(),
                logl: logl_star,
                logwt,
            });
            logvol -= shrink;

            let replacement = match self.kind {
                SamplerKind::Nestle => {
                    let found = replace_from_prior(&problem, logl_star, ndim, &mut rng);
                    ncall += found.1;
                    found.0
                }
                SamplerKind::Dynesty => {
                    let (point, calls) = walk_replacement(
                        &problem,
                        &live,
                        worst,
                        logl_star,
                        options.walks.max(1),
                        &mut scale,
                        &mut rng,
                    );
                    ncall += calls;
                    point
                }
            };
            let Some(replacement) = replacement else {
                warn!(iteration, logl_star, "could not find a replacement live point; stopping early");
                break;
            };
            live[worst] = replacement;

            let max_logl = live.iter().map(|p| p.logl).fold(f64::NEG_INFINITY, f64::max);
            let remaining = max_logl + logvol;
            let delta = if integrator.logz.is_finite() {
                log_add_exp(integrator.logz, remaining) - integrator.logz
            } else {
                f64::INFINITY
            };

            if iteration % PROGRESS_INTERVAL == 0 {
                debug!(iteration, ncall, logz = integrator.logz, delta, "nested sampling progress");
            }
            if delta < options.dlogz {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(max_iterations = options.max_iterations, "nested sampling stopped before reaching dlogz");
        }

        // Remaining live points share the final volume equally.
        let ln_share = logvol - (nlive as f64).ln();
        for point in live {
            let logwt = point.logl + ln_share;
            integrator.add(point.logl, logwt);
            dead.push(Dead {
                theta: point.theta,
                logl: point.logl,
                logwt,
            });
        }

        let logz = integrator.logz;
        if logz == f64::NEG_INFINITY {
            return Err(SamplerError::ZeroLikelihood);
        }
        let information = integrator.h.max(0.0);
        let logz_err = (information / nlive as f64).sqrt();

        let log_weights: Vec<f64> = dead.iter().map(|d| d.logwt - logz).collect();
        let kept = rejection_resample(&log_weights, &mut rng);

        let mut columns: Vec<(String, Vec<f64>)> = priors
            .iter()
            .enumerate()
            .map(|(k, p)| (p.name().to_string(), kept.iter().map(|&i| dead[i].theta[k]).collect()))
            .collect();
        columns.push((
            "log_likelihood".to_string(),
            kept.iter().map(|&i| dead[i].logl).collect(),
        ));
        let posterior = SampleTable::from_columns(columns)
            .map_err(|e| SamplerError::InvalidOptions(e.to_string()))?;

        info!(
            logz,
            logz_err,
            ncall,
            nsamples = posterior.len(),
            "nested sampling finished"
        );

        Ok(PosteriorResult {
            label: options.label.clone(),
            sampler: self.name().to_string(),
            search_parameter_keys: priors.iter().map(|p| p.name().to_string()).collect(),
            log_evidence: logz,
            log_evidence_err: logz_err,
            information_gain: information,
            num_likelihood_evaluations: ncall,
            posterior,
        })
    }
}

fn argmin_logl(live: &[Point]) -> usize {
    let mut worst = 0;
    for (i, p) in live.iter().enumerate().skip(1) {
        if p.logl < live[worst].logl {
            worst = i;
        }
    }
    worst
}

fn random_other<R: Rng + ?Sized>(exclude: usize, n: usize, rng: &mut R) -> usize {
    let k = rng.random_range(0..n - 1);
    if k >= exclude {
        k + 1
    } else {
        k
    }
}

/// Draw from the prior until the likelihood reaches `logl_star`.
/// Returns the point (if found) and the number of likelihood calls.
fn replace_from_prior<R: Rng + ?Sized>(
    problem: &Problem<'_, '_>,
    logl_star: f64,
    ndim: usize,
    rng: &mut R,
) -> (Option<Point>, usize) {
    for calls in 1..=MAX_PRIOR_DRAWS {
        let unit: Vec<f64> = (0..ndim).map(|_| rng.random::<f64>()).collect();
        let point = problem.point(unit);
        if point.logl >= logl_star {
            return (Some(point), calls);
        }
    }
    (None, MAX_PRIOR_DRAWS)
}

/// Constrained random walk from `start`. Proposals outside the unit cube or
/// below `logl_star` are rejected. Returns the final point, the number of
/// likelihood calls and the number of accepted steps.
fn random_walk<R: Rng + ?Sized>(
    problem: &Problem<'_, '_>,
    start: &Point,
    logl_star: f64,
    walks: usize,
    scale: f64,
    rng: &mut R,
) -> (Point, usize, usize) {
    let mut current = start.clone();
    let mut calls = 0;
    let mut accepted = 0;
    for _ in 0..walks {
        let unit: Vec<f64> = current
            .unit
            .iter()
            .map(|&u| u + scale * (2.0 * rng.random::<f64>() - 1.0))
            .collect();
        if unit.iter().any(|u| !(0.0..=1.0).contains(u)) {
            continue;
        }
        let proposal = problem.point(unit);
        calls += 1;
        if proposal.logl >= logl_star {
            current = proposal;
            accepted += 1;
        }
    }
    (current, calls, accepted)
}

/// Random-walk replacement for the point at `worst`. A walk with no accepted
/// step ends on its start, which would duplicate a live point, so it is
/// retried from other starts and finally replaced by rejection from the
/// prior. Returns the point (if found) and the number of likelihood calls.
fn walk_replacement<R: Rng + ?Sized>(
    problem: &Problem<'_, '_>,
    live: &[Point],
    worst: usize,
    logl_star: f64,
    walks: usize,
    scale: &mut f64,
    rng: &mut R,
) -> (Option<Point>, usize) {
    let mut ncall = 0;
    for _ in 0..WALK_ATTEMPTS {
        let start = random_other(worst, live.len(), rng);
        let (point, calls, accepted) = random_walk(problem, &live[start], logl_star, walks, *scale, rng);
        ncall += calls;
        *scale = adapt_scale(*scale, accepted, calls);
        if accepted > 0 {
            return (Some(point), ncall);
        }
    }
    debug!(logl_star, "random walks stalled; drawing from the prior");
    let (point, calls) = replace_from_prior(problem, logl_star, live[0].unit.len(), rng);
    (point, ncall + calls)
}

/// Aim for roughly half of the evaluated proposals being accepted.
fn adapt_scale(scale: f64, accepted: usize, calls: usize) -> f64 {
    let rejected = calls.saturating_sub(accepted);
    let scale = if accepted > rejected {
        scale * (1.0 / accepted as f64).exp()
    } else if rejected > 0 {
        scale * (-1.0 / rejected as f64).exp()
    } else {
        // Every proposal left the cube.
        scale * 0.5
    };
    scale.clamp(1e-6, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn options() -> SampleOptions {
        SampleOptions::quick().nlive(200).dlogz(0.05).seed(1234)
    }

    #[test]
    fn test_flat_likelihood_has_zero_log_evidence() {
        let priors = [Prior::uniform(0.0, 1.0, "a"), Prior::uniform(-2.0, 2.0, "b")];
        let lnl = |_: &HyperPoint| 0.0;
        for kind in [SamplerKind::Nestle, SamplerKind::Dynesty] {
            let result = NestedSampler::new(kind).run(&lnl, &priors, &options()).unwrap();
            assert!(result.log_evidence.abs() < 0.1, "{kind}: ln Z = {}", result.log_evidence);
            assert_eq!(result.sampler, kind.as_str());
        }
    }

    #[test]
    fn test_gaussian_likelihood_evidence_and_posterior() {
        // Narrow Gaussian inside a U(-5, 5) prior: Z = √(2π)·σ / 10.
        let sigma = 0.3;
        let priors = [Prior::uniform(-5.0, 5.0, "x")];
        let lnl = move |p: &HyperPoint| {
            let x = p["x"] - 1.0;
            -0.5 * x * x / (sigma * sigma) - sigma.ln() - 0.5 * (2.0 * PI).ln()
        };
        let expected = -(10.0_f64).ln();
        for kind in [SamplerKind::Nestle, SamplerKind::Dynesty] {
            let result = NestedSampler::new(kind).run(&lnl, &priors, &options()).unwrap();
            let tolerance = 4.0 * result.log_evidence_err + 0.1;
            assert!(
                (result.log_evidence - expected).abs() < tolerance,
                "{kind}: ln Z = {} ± {}",
                result.log_evidence,
                result.log_evidence_err
            );
            let samples = result.samples("x").unwrap();
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            assert!((mean - 1.0).abs() < 0.1, "{kind}: mean = {mean}");
            assert!(samples.iter().all(|x| (-5.0..=5.0).contains(x)));
            assert!(result.information_gain > 0.0);
        }
    }

    #[test]
    fn test_zero_likelihood_everywhere_is_an_error() {
        let priors = [Prior::uniform(0.0, 1.0, "a")];
        let lnl = |_: &HyperPoint| f64::NEG_INFINITY;
        let err = NestedSampler::new(SamplerKind::Nestle).run(&lnl, &priors, &options());
        assert!(matches!(err, Err(SamplerError::ZeroLikelihood)));
    }

    #[test]
    fn test_rejects_bad_options() {
        let priors = [Prior::uniform(0.0, 1.0, "a")];
        let lnl = |_: &HyperPoint| 0.0;
        let sampler = NestedSampler::new(SamplerKind::Dynesty);
        assert!(matches!(
            sampler.run(&lnl, &[], &options()),
            Err(SamplerError::NoPriors)
        ));
        assert!(matches!(
            sampler.run(&lnl, &priors, &options().nlive(1)),
            Err(SamplerError::InvalidOptions(_))
        ));
        assert!(matches!(
            sampler.run(&lnl, &priors, &options().dlogz(0.0)),
            Err(SamplerError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let priors = [Prior::uniform(0.0, 1.0, "a")];
        let lnl = |p: &HyperPoint| -10.0 * (p["a"] - 0.5).powi(2);
        let sampler = NestedSampler::new(SamplerKind::Dynesty);
        let first = sampler.run(&lnl, &priors, &options()).unwrap();
        let second = sampler.run(&lnl, &priors, &options()).unwrap();
        assert_eq!(first.log_evidence, second.log_evidence);
        assert_eq!(first.posterior, second.posterior);
    }

    #[test]
    fn test_stalled_walk_does_not_duplicate_live_point() {
        // The allowed region is the far corner a = 1 plus a sliver near 0.
        // Walks from the corner almost never land in the sliver, and a walk
        // without an accepted step would hand back the corner itself.
        let priors = [Prior::uniform(0.0, 1.0, "a")];
        let lnl = |p: &HyperPoint| {
            if p["a"] <= 0.01 || p["a"] >= 1.0 {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        };
        let problem = Problem {
            ln_likelihood: &lnl,
            priors: &priors,
        };
        let corner = problem.point(vec![1.0]);
        let live = vec![problem.point(vec![0.0]), corner.clone(), corner.clone(), corner];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut scale = 1.0;
        for _ in 0..50 {
            let (point, calls) = walk_replacement(&problem, &live, 0, 0.0, 5, &mut scale, &mut rng);
            let point = point.unwrap();
            assert!(calls > 0);
            assert!(point.unit[0] <= 0.01, "duplicated live point at {:?}", point.unit);
        }
    }

    #[test]
    fn test_random_other_never_returns_excluded() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        for _ in 0..1000 {
            let k = random_other(3, 5, &mut rng);
            assert!(k < 5 && k != 3);
        }
    }
}
