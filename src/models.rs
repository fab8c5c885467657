use std::fmt;

use serde::Serialize;

/// One row of the upstream measurement table, before plot resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    pub image_id: String,
    pub value: f64,
}

/// A measurement attributed to a plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub plot_id: String,
    pub image_id: String,
    pub value: f64,
}

/// All measurements of one plot, in ingestion order
#[derive(Debug, Clone, PartialEq)]
pub struct PlotGroup {
    pub plot_id: String,
    pub measurements: Vec<Measurement>,
}

impl PlotGroup {
    pub fn new(plot_id: impl Into<String>) -> Self {
        Self {
            plot_id: plot_id.into(),
            measurements: Vec::new(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.measurements.iter().map(|m| m.value).collect()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

/// Aggregated statistics for one plot.
///
/// `count` is the number of measurements before outlier removal and
/// `retained` the number the statistics were computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotStatistics {
    pub plot_id: String,
    pub count: usize,
    pub retained: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub entropy: f64,
}

impl PlotStatistics {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mean => self.mean,
            Metric::StdDev => self.std_dev,
            Metric::Cv => self.cv,
            Metric::Entropy => self.entropy,
        }
    }
}

/// Plot statistics rescaled across all plots, one column at a time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedStatistics {
    pub plot_id: String,
    pub mean: f64,
    pub std_dev: f64,
    pub cv: f64,
    pub entropy: f64,
}

impl NormalizedStatistics {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mean => self.mean,
            Metric::StdDev => self.std_dev,
            Metric::Cv => self.cv,
            Metric::Entropy => self.entropy,
        }
    }

    pub(crate) fn set_metric(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Mean => self.mean = value,
            Metric::StdDev => self.std_dev = value,
            Metric::Cv => self.cv = value,
            Metric::Entropy => self.entropy = value,
        }
    }
}

/// The metric columns that get normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Mean,
    StdDev,
    Cv,
    Entropy,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Mean, Metric::StdDev, Metric::Cv, Metric::Entropy];

    pub fn column_name(&self) -> &'static str {
        match self {
            Metric::Mean => "mean",
            Metric::StdDev => "std_dev",
            Metric::Cv => "cv",
            Metric::Entropy => "entropy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagnosticKind {
    MalformedIdentifier,
    MalformedValue,
    LowSampleSize,
    DegenerateMetric,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::MalformedIdentifier => write!(f, "MalformedIdentifier"),
            DiagnosticKind::MalformedValue => write!(f, "MalformedValue"),
            DiagnosticKind::LowSampleSize => write!(f, "LowSampleSize"),
            DiagnosticKind::DegenerateMetric => write!(f, "DegenerateMetric"),
        }
    }
}

/// A non-fatal condition observed while processing.
///
/// Constructing one through [`Diagnostic::new`] and the `for_*` helpers
/// does not log; the pipeline logs each diagnostic when it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub plot_id: Option<String>,
    pub image_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            plot_id: None,
            image_id: None,
            message: message.into(),
        }
    }

    pub fn for_plot(mut self, plot_id: impl Into<String>) -> Self {
        self.plot_id = Some(plot_id.into());
        self
    }

    pub fn for_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(plot_id) = &self.plot_id {
            write!(f, " [plot {}]", plot_id)?;
        }
        if let Some(image_id) = &self.image_id {
            write!(f, " [{}]", image_id)?;
        }
        write!(f, ": {}", self.message)
    }
}
