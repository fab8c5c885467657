use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::error::AnalysisError;
use crate::models::{
    Diagnostic, DiagnosticKind, Measurement, NormalizedStatistics, PlotGroup, PlotStatistics,
    RawRecord,
};
use crate::report;

/// State that flows through the pipeline.
///
/// Each step fills in the next table and leaves the earlier ones alone, so
/// the final value holds every view the reports need.
#[derive(Debug, Clone, Default)]
pub struct AnalysisData {
    /// Rows as ingested, in input order
    pub raw: Vec<RawRecord>,

    /// Measurements grouped by plot, in report order
    pub groups: Vec<PlotGroup>,

    /// Groups after outlier removal; plots left empty are omitted
    pub cleaned: Vec<PlotGroup>,

    pub statistics: Vec<PlotStatistics>,
    pub normalized: Vec<NormalizedStatistics>,

    /// Everything non-fatal that happened, in the order it happened
    pub diagnostics: Vec<Diagnostic>,

    /// Rows that never reached a plot group
    pub rows_dropped: usize,
    /// Zero-valued rows discarded at ingestion
    pub zero_values_skipped: usize,
    pub outliers_removed: usize,
}

impl AnalysisData {
    pub fn from_records(raw: Vec<RawRecord>) -> Self {
        Self {
            raw,
            ..Default::default()
        }
    }

    /// Append a diagnostic and log it
    pub fn record(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn record_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.record(diagnostic);
        }
    }

    pub fn cleaned_measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.cleaned.iter().flat_map(|g| g.measurements.iter())
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn statistics_for(&self, plot_id: &str) -> Option<&PlotStatistics> {
        self.statistics.iter().find(|s| s.plot_id == plot_id)
    }
}

/// Shared flag a caller flips to stop the run between plot groups
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Context available to all pipeline steps
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
    pub cancel: CancelFlag,
}

impl PipelineContext {
    /// Fails with [`AnalysisError::Cancelled`] once the flag is set
    pub fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Consume the state and return it with this step's table filled in
    fn process(&self, data: AnalysisData, context: &PipelineContext) -> Result<AnalysisData>;

    /// Human-readable name for this step (used in logs and debug directories)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Log each step at info level instead of debug
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)
                .with_context(|| format!("Cannot read debug directory {}", output_dir.display()))?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    /// Use a caller-owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.context.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.context.cancel.clone()
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step on the ingested records
    pub fn run(&self, records: Vec<RawRecord>) -> Result<AnalysisData> {
        self.run_data(AnalysisData::from_records(records))
    }

    /// Run every step on a pre-seeded state (e.g. carrying ingestion diagnostics)
    pub fn run_data(&self, data: AnalysisData) -> Result<AnalysisData> {
        self.run_partial(data, self.steps.len())
    }

    /// Run only the first `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, mut data: AnalysisData, num_steps: usize) -> Result<AnalysisData> {
        self.save_debug_output(0, "input", &data)?;

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            self.context.check_cancelled()?;
            self.log_step(format_args!(
                "Running step {}: {} ({} rows, {} plots)",
                step_idx + 1,
                step.name(),
                data.raw.len(),
                data.groups.len()
            ));

            data = step
                .process(data, &self.context)
                .with_context(|| format!("Step '{}' failed", step.name()))?;

            self.save_debug_output(step_idx + 1, step.name(), &data)?;
        }

        Ok(data)
    }

    fn log_step(&self, message: std::fmt::Arguments<'_>) {
        if self.context.verbose {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
    }

    fn save_debug_output(&self, index: usize, step_name: &str, data: &AnalysisData) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let step_dir_name = format!(
            "{:02}_{}",
            index,
            step_name.to_lowercase().replace(' ', "_")
        );
        let step_dir = debug_config.output_dir.join(&step_dir_name);
        report::write_tables(&step_dir, data)?;
        self.log_step(format_args!("  Debug: saved tables to {}/", step_dir_name));
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
