//! Interquartile-range outlier removal.
//!
//! Filtering repeats until no further value falls outside the fences, so
//! running it again on its own output never removes anything else.

use crate::config::{AnalysisConfig, QuantileMethod};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrParams {
    /// Fence multiplier, `k` in `Q1 - k*IQR`
    pub k: f64,
    /// Below this many values no quartiles are estimated
    pub min_samples: usize,
    pub method: QuantileMethod,
}

impl Default for IqrParams {
    fn default() -> Self {
        Self {
            k: 1.5,
            min_samples: 4,
            method: QuantileMethod::Linear,
        }
    }
}

impl From<&AnalysisConfig> for IqrParams {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            k: config.iqr_k,
            min_samples: config.iqr_min_samples,
            method: config.quantile_method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Outcome of filtering one plot's values
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierFilter {
    /// Indices into the input slice that survived, ascending
    pub kept: Vec<usize>,
    /// Fences of the last pass, `None` when no pass ran
    pub bounds: Option<IqrBounds>,
    /// Passes that removed at least one value
    pub passes: usize,
    /// The input was too small to estimate quartiles
    pub low_sample: bool,
}

impl OutlierFilter {
    pub fn removed(&self, total: usize) -> usize {
        total - self.kept.len()
    }

    pub fn kept_values(&self, values: &[f64]) -> Vec<f64> {
        self.kept.iter().map(|&i| values[i]).collect()
    }
}

/// Percentile `q` (0..=1) of already sorted, non-empty values
pub fn quantile(sorted: &[f64], q: f64, method: QuantileMethod) -> f64 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = (pos.ceil() as usize).min(last);
    let frac = pos - lo as f64;

    match method {
        QuantileMethod::Linear => sorted[lo] + frac * (sorted[hi] - sorted[lo]),
        QuantileMethod::Lower => sorted[lo],
        QuantileMethod::Higher => sorted[hi],
        QuantileMethod::Midpoint => (sorted[lo] + sorted[hi]) / 2.0,
        QuantileMethod::Nearest => {
            // Ties go to the even index, like numpy
            if frac < 0.5 || (frac == 0.5 && lo % 2 == 0) {
                sorted[lo]
            } else {
                sorted[hi]
            }
        }
    }
}

/// Tukey fences for non-empty values
pub fn iqr_bounds(values: &[f64], k: f64, method: QuantileMethod) -> IqrBounds {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile(&sorted, 0.25, method);
    let q3 = quantile(&sorted, 0.75, method);
    let iqr = q3 - q1;

    IqrBounds {
        q1,
        q3,
        iqr,
        lower: q1 - k * iqr,
        upper: q3 + k * iqr,
    }
}

pub fn filter_outliers(values: &[f64], params: &IqrParams) -> OutlierFilter {
    let mut kept: Vec<usize> = (0..values.len()).collect();

    if values.len() < params.min_samples {
        return OutlierFilter {
            kept,
            bounds: None,
            passes: 0,
            low_sample: true,
        };
    }

    let mut bounds = None;
    let mut passes = 0;

    while kept.len() >= params.min_samples {
        let current: Vec<f64> = kept.iter().map(|&i| values[i]).collect();
        let fences = iqr_bounds(&current, params.k, params.method);
        bounds = Some(fences);

        let next: Vec<usize> = kept
            .iter()
            .copied()
            .filter(|&i| fences.contains(values[i]))
            .collect();

        if next.len() == kept.len() {
            break;
        }
        kept = next;
        passes += 1;
    }

    OutlierFilter {
        kept,
        bounds,
        passes,
        low_sample: false,
    }
}
