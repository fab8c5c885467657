use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phenostats::config::{AnalysisConfig, MalformedPolicy, MeasurementMode, NormalizationMethod};
use phenostats::{build_standard_pipeline, ingest, report};

#[derive(Parser)]
#[command(name = "phenostats")]
#[command(about = "Plot-level statistics for seedling detection and segmentation measurements")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate a measurement table (or a mask directory) into plot statistics
    Analyze(AnalyzeArgs),

    /// Measure object areas in a directory of binary mask images
    MeasureMasks {
        /// Directory of mask images, one per source image
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Output CSV file
        #[arg(short, long, value_name = "CSV")]
        out: PathBuf,

        /// Ignore objects smaller than this many pixels
        #[arg(long, default_value_t = 1)]
        min_area: u32,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Measurement table (CSV/TSV/xlsx), or a mask directory in segmentation mode
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Directory the report tables are written to
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,

    /// TOML configuration file; flags below override its values
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<MeasurementMode>,

    /// Separator between the plot id and the rest of the file name
    #[arg(long)]
    delimiter: Option<char>,

    /// IQR fence multiplier
    #[arg(long)]
    iqr_k: Option<f64>,

    /// Number of equal-width entropy bins
    #[arg(long)]
    bins: Option<usize>,

    #[arg(long, value_enum)]
    normalize: Option<NormalizationMethod>,

    /// What to do with file names that carry no plot id
    #[arg(long, value_enum)]
    on_malformed: Option<MalformedPolicy>,

    /// Save the tables after every step to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

impl AnalyzeArgs {
    fn resolve_config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_toml_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(delimiter) = self.delimiter {
            config.delimiter = delimiter;
        }
        if let Some(k) = self.iqr_k {
            config.iqr_k = k;
        }
        if let Some(bins) = self.bins {
            config.entropy_bins = bins;
        }
        if let Some(method) = self.normalize {
            config.normalize = method;
        }
        if let Some(policy) = self.on_malformed {
            config.on_malformed = policy;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "phenostats=debug" } else { "phenostats=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_analyze(args: AnalyzeArgs, verbose: bool) -> anyhow::Result<()> {
    let config = args.resolve_config()?;

    let outcome = ingest::load_measurements(&args.input, &config)?;

    let mut pipeline = build_standard_pipeline(&config, verbose);
    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let data = pipeline.run_data(outcome.into_analysis_data())?;
    let written = report::write_report(&args.out, &args.input, &data, &config)
        .context("Failed to write report")?;

    println!("\n=== Plot Statistics ===");
    println!(
        "Plots aggregated: {} (from {} rows, {} outliers removed, {} diagnostics)",
        data.statistics.len(),
        data.raw.len(),
        data.outliers_removed,
        data.diagnostics.len()
    );
    if verbose {
        for stats in &data.statistics {
            println!(
                "  Plot {}: n={} mean={:.3} std_dev={:.3} cv={:.3} entropy={:.3}",
                stats.plot_id, stats.retained, stats.mean, stats.std_dev, stats.cv, stats.entropy
            );
        }
    }
    println!("\nReports:");
    for path in written {
        println!("  {}", path.display());
    }

    Ok(())
}

fn run_measure_masks(dir: PathBuf, out: PathBuf, min_area: u32) -> anyhow::Result<()> {
    let records = ingest::masks::measure_mask_dir(&dir, min_area)?;

    let file = File::create(&out).with_context(|| format!("Cannot create {}", out.display()))?;
    report::write_table(BufWriter::new(file), &["image_id", "area"], &records)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Measured {} objects, written to {}", records.len(), out.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Analyze(args) => run_analyze(args, cli.verbose),
        Command::MeasureMasks { dir, out, min_area } => run_measure_masks(dir, out, min_area),
    }
}
