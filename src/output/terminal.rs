//! Terminal output formatting with colors and box drawing.

use colored::Colorize;

use crate::hierarchical::HierarchicalOutcome;
use crate::results::{EvidenceGrid, PosteriorResult};

const INTERVAL: [f64; 3] = [0.05, 0.5, 0.95];

/// Format either kind of hierarchical outcome.
pub fn format_outcome(outcome: &HierarchicalOutcome) -> String {
    match outcome {
        HierarchicalOutcome::Posterior(result) => format_posterior(result),
        HierarchicalOutcome::Grid(grid) => format_grid(grid),
    }
}

/// Format a nested-sampling result for human-readable terminal output.
///
/// Shows the evidence and the median with a 90% credible interval for each
/// sampled hyperparameter.
pub fn format_posterior(result: &PosteriorResult) -> String {
    let mut output = header(&result.label);

    if !result.sampler.is_empty() {
        output.push_str(&format!("  Sampler: {}\n", result.sampler));
    }
    output.push_str(&format!("  Posterior samples: {}\n", result.posterior.len()));
    if result.num_likelihood_evaluations > 0 {
        output.push_str(&format!(
            "  Likelihood evaluations: {}\n",
            result.num_likelihood_evaluations
        ));
    }
    output.push('\n');

    if result.log_evidence.is_finite() {
        output.push_str(&format!(
            "    ln Z = {:.3} \u{00B1} {:.3}\n",
            result.log_evidence, result.log_evidence_err
        ));
        if result.information_gain.is_finite() {
            output.push_str(&format!("    Information: {:.2} nats\n", result.information_gain));
        }
    } else {
        output.push_str(&format!("    {}\n", "Evidence unavailable".yellow()));
    }
    output.push('\n');

    output.push_str("    Hyperparameters (median, 90% CI):\n");
    for key in &result.search_parameter_keys {
        match result.credible_interval(key, &INTERVAL) {
            Ok(ci) => output.push_str(&interval_line(key, &ci)),
            Err(_) => output.push_str(&format!("      {:<10} {}\n", key, "no samples".red())),
        }
    }

    output.push('\n');
    output.push_str(&separator());
    output.push('\n');
    output
}

/// Format a grid evaluation for human-readable terminal output.
pub fn format_grid(grid: &EvidenceGrid) -> String {
    let mut output = header(grid.label());

    let shape = grid.shape();
    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
    output.push_str(&format!("  Grid: {} points ({})\n", shape.iter().product::<usize>(), dims.join(" x ")));
    output.push('\n');

    let ln_z = grid.ln_evidence();
    if ln_z.is_finite() {
        output.push_str(&format!("    ln Z = {ln_z:.3}\n"));
    } else {
        output.push_str(&format!("    {}\n", "Likelihood is zero on the whole grid".red().bold()));
    }

    let best: Vec<String> = grid
        .max_posterior_point()
        .into_iter()
        .map(|(name, value)| format!("{name}={value:.4e}"))
        .collect();
    output.push_str(&format!("    Maximum posterior: {}\n", best.join(", ")));
    output.push('\n');

    output.push_str("    Hyperparameters (median, 90% CI):\n");
    for name in grid.parameter_names() {
        if let Ok(ci) = grid.credible_interval(name, &INTERVAL) {
            output.push_str(&interval_line(name, &ci));
        }
    }

    output.push('\n');
    output.push_str(&separator());
    output.push('\n');
    output
}

fn header(label: &str) -> String {
    let mut output = format!("pulsar-population: {}\n", label.bold());
    output.push_str(&separator());
    output.push_str("\n\n");
    output
}

fn separator() -> String {
    "\u{2500}".repeat(62)
}

fn interval_line(name: &str, ci: &[f64]) -> String {
    format!(
        "      {:<10} {} [{:.4e}, {:.4e}]\n",
        name,
        format!("{:.4e}", ci[1]).green(),
        ci[0],
        ci[2]
    )
}
