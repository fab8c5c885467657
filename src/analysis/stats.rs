//! Per-plot summary statistics.

use crate::config::{AnalysisConfig, EntropyBinning};
use crate::models::{Diagnostic, DiagnosticKind, PlotStatistics};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateParams {
    pub binning: EntropyBinning,
    pub bins: usize,
    /// Report cv multiplied by 100
    pub cv_percent: bool,
}

impl Default for AggregateParams {
    fn default() -> Self {
        Self {
            binning: EntropyBinning::Binned,
            bins: 10,
            cv_percent: false,
        }
    }
}

impl From<&AnalysisConfig> for AggregateParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            binning: config.entropy,
            bins: config.entropy_bins,
            cv_percent: config.cv_percent,
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// `std_dev / mean`, or `None` when the mean is zero
pub fn coefficient_of_variation(mean: f64, std_dev: f64) -> Option<f64> {
    if mean == 0.0 {
        None
    } else {
        Some(std_dev / mean)
    }
}

/// Shannon entropy in bits of the discretized values
pub fn shannon_entropy(values: &[f64], binning: EntropyBinning, bins: usize) -> f64 {
    let counts = match binning {
        EntropyBinning::Binned => equal_width_counts(values, bins),
        EntropyBinning::Distinct => distinct_counts(values),
    };
    entropy_of_counts(&counts, values.len())
}

fn equal_width_counts(values: &[f64], bins: usize) -> Vec<usize> {
    let bins = bins.max(1);
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let mut counts = vec![0usize; bins];
    if values.len() < 2 || max <= min {
        counts[0] = values.len();
        return counts;
    }

    // Halved so the span of values near +-f64::MAX stays finite
    let half_width = max / 2.0 - min / 2.0;
    for &v in values {
        let idx = (((v / 2.0 - min / 2.0) / half_width) * bins as f64).floor() as usize;
        // The maximum lands exactly on the upper edge
        counts[idx.min(bins - 1)] += 1;
    }
    counts
}

fn distinct_counts(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut counts: Vec<usize> = Vec::new();
    let mut previous: Option<f64> = None;
    for v in sorted {
        match (previous, counts.last_mut()) {
            (Some(p), Some(count)) if p == v => *count += 1,
            _ => counts.push(1),
        }
        previous = Some(v);
    }
    counts
}

fn entropy_of_counts(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &count in counts.iter().filter(|&&c| c > 0) {
        let p = count as f64 / total as f64;
        entropy -= p * p.log2();
    }
    entropy
}

/// Summarize one plot's filtered values.
///
/// `count` is the plot size before outlier removal. Returns `None` when no
/// values survived, in which case the plot has no statistics at all.
pub fn aggregate_plot(
    plot_id: &str,
    count: usize,
    values: &[f64],
    params: &AggregateParams,
) -> Option<(PlotStatistics, Vec<Diagnostic>)> {
    let mean = mean(values)?;
    let mut diagnostics = Vec::new();

    if values.len() == 1 {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::LowSampleSize,
                "single measurement, std_dev reported as 0",
            )
            .for_plot(plot_id),
        );
    }
    let std_dev = sample_std_dev(values);

    let cv = match coefficient_of_variation(mean, std_dev) {
        Some(cv) if params.cv_percent => cv * 100.0,
        Some(cv) => cv,
        None => {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::DegenerateMetric, "mean is 0, cv reported as NaN")
                    .for_plot(plot_id),
            );
            f64::NAN
        }
    };

    let entropy = shannon_entropy(values, params.binning, params.bins);

    let stats = PlotStatistics {
        plot_id: plot_id.to_string(),
        count,
        retained: values.len(),
        mean,
        std_dev,
        cv,
        entropy,
    };
    Some((stats, diagnostics))
}
