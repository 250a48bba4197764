//! Command-line interface components.

use crate::config::{FileConfig, ReferenceLayout, ResolverConfig};
use crate::error::Result;
use crate::models::{LauNameVariant, ResolutionReport};
use crate::resolver::NutsResolver;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::*;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use walkdir::WalkDir;

/// Marker appended to the stem of resolved output files
const OUTPUT_SUFFIX: &str = "_nuts";

#[derive(Parser, Debug, Clone)]
#[command(name = "nuts-resolver")]
#[command(about = "Assign NUTS regions to power-plant records from postcodes, municipalities and coordinates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Record files (CSV or Parquet) or directories containing them
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Two-letter country code (defaults to the first two letters of each file name)
    #[arg(short, long)]
    pub country: Option<String>,

    /// Reference data cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Comma-separated strategy order (latlon, postcode, municipality_code, municipality)
    #[arg(short, long, value_delimiter = ',')]
    pub strategies: Option<Vec<String>>,

    /// Assign the nearest region to points that fall outside every region
    #[arg(long)]
    pub closest: bool,

    /// LAU name column used for municipality names (latin or national)
    #[arg(long, value_name = "VARIANT")]
    pub lau_names: Option<String>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for resolved files (defaults to next to each input)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output file format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Files resolved concurrently (defaults to the number of CPUs)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" => Some(OutputFormat::Csv),
            "parquet" => Some(OutputFormat::Parquet),
            _ => None,
        }
    }
}

/// One input file with its country and output location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub country: String,
}

/// Result of resolving one file
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub job: FileJob,
    pub report: ResolutionReport,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Resolver and reference settings: defaults, then the config file,
    /// then command-line flags
    pub fn build_config(&self) -> anyhow::Result<(ResolverConfig, ReferenceLayout)> {
        let FileConfig {
            resolver: mut config,
            reference: mut layout,
        } = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(strategies) = &self.strategies {
            config = config.with_strategies(strategies);
        }
        if self.closest {
            config = config.with_closest_approximation(true);
        }
        if let Some(variant) = &self.lau_names {
            config = config.with_lau_name_variant(variant.parse::<LauNameVariant>()?);
        }
        if self.verbose {
            config = config.with_verbose(true);
        }
        if let Some(cache_dir) = &self.cache_dir {
            layout = layout.with_cache_dir(cache_dir);
        }

        config.validate()?;
        Ok((config, layout))
    }

    /// Expand inputs into record files, scanning directories recursively
    pub fn discover_inputs(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in &self.inputs {
            if input.is_dir() {
                for entry in WalkDir::new(input) {
                    let entry = entry.with_context(|| format!("Failed to scan {}", input.display()))?;
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && OutputFormat::from_path(path).is_some()
                        && !is_output_file(path)
                    {
                        files.push(path.to_path_buf());
                    }
                }
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                anyhow::bail!("Input not found: {}", input.display());
            }
        }

        files.sort();
        files.dedup();
        debug!("Discovered {} record files", files.len());
        Ok(files)
    }

    /// Country code for a file: the flag, else the file name prefix
    pub fn country_for(&self, path: &Path) -> anyhow::Result<String> {
        if let Some(country) = &self.country {
            return Ok(country.trim().to_uppercase());
        }

        let prefix: String = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .chars()
            .take(2)
            .collect();
        if prefix.len() == 2 && prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(prefix.to_uppercase())
        } else {
            anyhow::bail!(
                "Cannot infer a country from {}; pass --country",
                path.display()
            )
        }
    }

    /// Output path for an input file
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        let name = format!("{}{}.{}", stem, OUTPUT_SUFFIX, self.format.extension());
        match &self.output_dir {
            Some(dir) => dir.join(name),
            None => input.with_file_name(name),
        }
    }

    /// Build one job per discovered input file
    pub fn plan_jobs(&self) -> anyhow::Result<Vec<FileJob>> {
        self.discover_inputs()?
            .into_iter()
            .map(|input| {
                Ok(FileJob {
                    country: self.country_for(&input)?,
                    output: self.output_path(&input),
                    input,
                })
            })
            .collect()
    }
}

fn is_output_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(OUTPUT_SUFFIX))
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();

    // Create filter, letting RUST_LOG override the CLI level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("nuts_resolver={}", log_level)));

    if args.quiet {
        // Minimal logging for quiet mode
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        // Standard logging with timestamps
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

/// Read a record file; CSV columns are kept as strings so codes keep
/// their leading zeros
pub fn read_records(path: &Path) -> Result<DataFrame> {
    match OutputFormat::from_path(path) {
        Some(OutputFormat::Parquet) => Ok(ParquetReader::new(File::open(path)?).finish()?),
        _ => Ok(CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?),
    }
}

/// Write resolved records in the requested format
pub fn write_records(frame: &mut DataFrame, path: &Path, format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    match format {
        OutputFormat::Csv => CsvWriter::new(&mut file).include_header(true).finish(frame)?,
        OutputFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(frame)?;
        }
    }
    Ok(())
}

/// Read, resolve and write one file
pub fn resolve_file(resolver: &NutsResolver, job: &FileJob, format: OutputFormat) -> anyhow::Result<FileSummary> {
    let records = read_records(&job.input)
        .with_context(|| format!("Failed to read {}", job.input.display()))?;
    let resolution = resolver
        .resolve(&records, &job.country)
        .with_context(|| format!("Failed to resolve {} ({})", job.input.display(), job.country))?;

    let mut frame = resolution.frame;
    write_records(&mut frame, &job.output, format)
        .with_context(|| format!("Failed to write {}", job.output.display()))?;

    Ok(FileSummary {
        job: job.clone(),
        report: resolution.report,
    })
}

/// Print the per-file summary
pub fn print_summary(summaries: &[FileSummary], failures: usize, elapsed: Duration) {
    println!("\n{}", "NUTS resolution summary".bright_green().bold());

    for summary in summaries {
        let report = &summary.report;
        let rate = format!("{:.1}%", report.resolution_rate() * 100.0);
        let rate = if report.unresolved == 0 {
            rate.bright_green()
        } else {
            rate.bright_yellow()
        };
        println!(
            "  {} {} {}/{} resolved ({})",
            format!("[{}]", report.country).bright_cyan(),
            summary.job.input.display(),
            report.resolved().to_string().bright_white().bold(),
            report.total_records,
            rate
        );
        for stage in &report.stages {
            println!(
                "      {:<18} +{:<8} {} left",
                stage.strategy.name(),
                stage.newly_resolved,
                stage.unresolved_after
            );
        }
        println!("      {} {}", "->".bright_black(), summary.job.output.display());
    }

    println!(
        "\n  {} {} files in {:.2?}",
        "Resolved".bright_green(),
        summaries.len().to_string().bright_white().bold(),
        elapsed
    );
    if failures > 0 {
        println!(
            "  {} {} files",
            "Failed".bright_red().bold(),
            failures.to_string().bright_white().bold()
        );
    }
}
