use std::collections::HashMap;

use anyhow::Result;

use crate::analysis::normalize::{normalize, NormalizeParams};
use crate::analysis::outliers::{filter_outliers, IqrParams};
use crate::analysis::plot_id::{compare_plot_ids, resolve_plot_id};
use crate::analysis::stats::{aggregate_plot, AggregateParams};
use crate::config::MalformedPolicy;
use crate::models::{Diagnostic, DiagnosticKind, Measurement, PlotGroup};
use crate::pipeline::{AnalysisData, PipelineContext, PipelineStep};

/// Attach a plot id to every raw row and group rows by plot
pub struct GroupingStep {
    pub delimiter: char,
    pub on_malformed: MalformedPolicy,
    /// Bucket used by [`MalformedPolicy::Bucket`]
    pub unknown_plot: String,
}

impl PipelineStep for GroupingStep {
    fn process(&self, mut data: AnalysisData, _context: &PipelineContext) -> Result<AnalysisData> {
        let mut groups: Vec<PlotGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut diagnostics = Vec::new();
        let mut dropped = 0;

        for record in &data.raw {
            let plot_id = match resolve_plot_id(&record.image_id, self.delimiter) {
                Ok(plot_id) => plot_id,
                Err(err) => match self.on_malformed {
                    MalformedPolicy::Reject => return Err(err.into()),
                    MalformedPolicy::Drop => {
                        diagnostics.push(
                            Diagnostic::new(DiagnosticKind::MalformedIdentifier, format!("{}, row dropped", err))
                                .for_image(&record.image_id),
                        );
                        dropped += 1;
                        continue;
                    }
                    MalformedPolicy::Bucket => {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::MalformedIdentifier,
                                format!("{}, assigned to plot '{}'", err, self.unknown_plot),
                            )
                            .for_image(&record.image_id),
                        );
                        self.unknown_plot.clone()
                    }
                },
            };

            let slot = *index.entry(plot_id.clone()).or_insert_with(|| {
                groups.push(PlotGroup::new(plot_id.clone()));
                groups.len() - 1
            });
            groups[slot].measurements.push(Measurement {
                plot_id,
                image_id: record.image_id.clone(),
                value: record.value,
            });
        }

        groups.sort_by(|a, b| compare_plot_ids(&a.plot_id, &b.plot_id));

        tracing::info!(
            "Grouped {} rows into {} plots ({} dropped)",
            data.raw.len() - dropped,
            groups.len(),
            dropped
        );

        data.record_all(diagnostics);
        data.rows_dropped += dropped;
        data.groups = groups;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Plot Grouping"
    }
}

/// Remove IQR outliers within each plot
pub struct OutlierFilterStep {
    pub params: IqrParams,
}

impl PipelineStep for OutlierFilterStep {
    fn process(&self, mut data: AnalysisData, context: &PipelineContext) -> Result<AnalysisData> {
        let mut cleaned = Vec::with_capacity(data.groups.len());
        let mut diagnostics = Vec::new();
        let mut removed_total = 0;

        for group in &data.groups {
            context.check_cancelled()?;

            let values = group.values();
            let filter = filter_outliers(&values, &self.params);

            if filter.low_sample {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::LowSampleSize,
                        format!(
                            "{} measurements, fewer than {} needed for quartiles; outlier filtering skipped",
                            values.len(),
                            self.params.min_samples
                        ),
                    )
                    .for_plot(&group.plot_id),
                );
            }

            let removed = filter.removed(values.len());
            removed_total += removed;
            if let Some(bounds) = filter.bounds {
                tracing::debug!(
                    "Plot {}: Q1={} Q3={} fences=[{}, {}], removed {} in {} passes",
                    group.plot_id,
                    bounds.q1,
                    bounds.q3,
                    bounds.lower,
                    bounds.upper,
                    removed,
                    filter.passes
                );
            }

            if filter.kept.is_empty() {
                tracing::warn!("Plot {} has no measurements left after filtering", group.plot_id);
                continue;
            }

            let mut kept = PlotGroup::new(group.plot_id.clone());
            kept.measurements = filter
                .kept
                .iter()
                .map(|&i| group.measurements[i].clone())
                .collect();
            cleaned.push(kept);
        }

        tracing::info!("Removed {} outliers across {} plots", removed_total, data.groups.len());

        data.record_all(diagnostics);
        data.outliers_removed += removed_total;
        data.cleaned = cleaned;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Outlier Filtering"
    }
}

/// Compute mean, std_dev, cv and entropy for every cleaned plot
pub struct AggregationStep {
    pub params: AggregateParams,
}

impl PipelineStep for AggregationStep {
    fn process(&self, mut data: AnalysisData, context: &PipelineContext) -> Result<AnalysisData> {
        let counts: HashMap<&str, usize> = data
            .groups
            .iter()
            .map(|g| (g.plot_id.as_str(), g.len()))
            .collect();

        let mut statistics = Vec::with_capacity(data.cleaned.len());
        let mut diagnostics = Vec::new();

        for group in &data.cleaned {
            context.check_cancelled()?;

            let values = group.values();
            let count = counts.get(group.plot_id.as_str()).copied().unwrap_or(values.len());
            if let Some((stats, plot_diagnostics)) =
                aggregate_plot(&group.plot_id, count, &values, &self.params)
            {
                tracing::debug!(
                    "Plot {}: n={} mean={} std_dev={} cv={} entropy={}",
                    stats.plot_id,
                    stats.retained,
                    stats.mean,
                    stats.std_dev,
                    stats.cv,
                    stats.entropy
                );
                statistics.push(stats);
                diagnostics.extend(plot_diagnostics);
            }
        }

        tracing::info!("Aggregated {} plots", statistics.len());

        data.record_all(diagnostics);
        data.statistics = statistics;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Aggregation"
    }
}

/// Rescale the aggregated metrics across plots
pub struct NormalizationStep {
    pub params: NormalizeParams,
}

impl PipelineStep for NormalizationStep {
    fn process(&self, mut data: AnalysisData, context: &PipelineContext) -> Result<AnalysisData> {
        context.check_cancelled()?;

        let (normalized, diagnostics) = normalize(&data.statistics, &self.params);
        tracing::info!(
            "Normalized {} plots with {:?}",
            normalized.len(),
            self.params.method
        );

        data.record_all(diagnostics);
        data.normalized = normalized;
        Ok(data)
    }

    fn name(&self) -> &str {
        "Normalization"
    }
}
