//! Cross-plot rescaling of the metric columns.
//!
//! Each of mean, std_dev, cv and entropy is normalized on its own. NaN cells
//! (an undefined cv) do not take part in the column's min/max or mean/std and
//! stay NaN in the output.

use crate::config::{AnalysisConfig, NormalizationMethod};
use crate::models::{Diagnostic, DiagnosticKind, Metric, NormalizedStatistics, PlotStatistics};
use crate::analysis::stats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeParams {
    pub method: NormalizationMethod,
    /// Output range for min-max; a column without spread maps to `range[0]`
    pub range: [f64; 2],
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            method: NormalizationMethod::MinMax,
            range: [0.0, 1.0],
        }
    }
}

impl From<&AnalysisConfig> for NormalizeParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            method: config.normalize,
            range: config.target_range,
        }
    }
}

pub fn normalize(
    statistics: &[PlotStatistics],
    params: &NormalizeParams,
) -> (Vec<NormalizedStatistics>, Vec<Diagnostic>) {
    let mut normalized: Vec<NormalizedStatistics> = statistics
        .iter()
        .map(|s| NormalizedStatistics {
            plot_id: s.plot_id.clone(),
            mean: s.mean,
            std_dev: s.std_dev,
            cv: s.cv,
            entropy: s.entropy,
        })
        .collect();
    let mut diagnostics = Vec::new();

    if statistics.is_empty() {
        return (normalized, diagnostics);
    }

    for metric in Metric::ALL {
        let column: Vec<f64> = statistics.iter().map(|s| s.metric(metric)).collect();
        let (scaled, diagnostic) = match params.method {
            NormalizationMethod::MinMax => min_max_column(&column, params.range, metric),
            NormalizationMethod::ZScore => z_score_column(&column, metric),
        };
        for (row, value) in normalized.iter_mut().zip(scaled) {
            row.set_metric(metric, value);
        }
        diagnostics.extend(diagnostic);
    }

    (normalized, diagnostics)
}

fn finite(column: &[f64]) -> Vec<f64> {
    column.iter().copied().filter(|v| v.is_finite()).collect()
}

fn no_finite_values(metric: Metric) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::DegenerateMetric,
        format!("column '{}' has no finite values, left as NaN", metric.column_name()),
    )
}

fn min_max_column(column: &[f64], range: [f64; 2], metric: Metric) -> (Vec<f64>, Option<Diagnostic>) {
    let values = finite(column);
    if values.is_empty() {
        return (column.to_vec(), Some(no_finite_values(metric)));
    }

    let [lo, hi] = range;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max == min {
        let scaled = column
            .iter()
            .map(|v| if v.is_finite() { lo } else { f64::NAN })
            .collect();
        let diagnostic = Diagnostic::new(
            DiagnosticKind::DegenerateMetric,
            format!(
                "column '{}' has min = max = {}, normalized to {}",
                metric.column_name(),
                min,
                lo
            ),
        );
        return (scaled, Some(diagnostic));
    }

    let span = max - min;
    let scaled = column
        .iter()
        .map(|&v| {
            if v.is_finite() {
                (lo + (v - min) / span * (hi - lo)).clamp(lo, hi)
            } else {
                f64::NAN
            }
        })
        .collect();
    (scaled, None)
}

fn z_score_column(column: &[f64], metric: Metric) -> (Vec<f64>, Option<Diagnostic>) {
    let values = finite(column);
    let Some(mean) = stats::mean(&values) else {
        return (column.to_vec(), Some(no_finite_values(metric)));
    };
    let std_dev = stats::sample_std_dev(&values);

    if std_dev == 0.0 {
        let scaled = column
            .iter()
            .map(|v| if v.is_finite() { 0.0 } else { f64::NAN })
            .collect();
        let diagnostic = Diagnostic::new(
            DiagnosticKind::DegenerateMetric,
            format!(
                "column '{}' has zero standard deviation, normalized to 0",
                metric.column_name()
            ),
        );
        return (scaled, Some(diagnostic));
    }

    let scaled = column
        .iter()
        .map(|&v| if v.is_finite() { (v - mean) / std_dev } else { f64::NAN })
        .collect();
    (scaled, None)
}
