use anyhow::Context;
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use nuts_resolver::NutsResolver;
use nuts_resolver::cli::{self, Args, FileSummary};
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{error, info};

fn main() {
    // Parse command line arguments and set up logging
    let args = Args::parse();
    cli::setup_logging(&args);

    // Create async runtime
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    // Run the resolution, stopping early on CTRL+C
    let result = runtime.block_on(async {
        tokio::select! {
            result = run(args) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(anyhow::anyhow!("Processing interrupted by user"))
            }
        }
    });

    // Blocking resolution tasks cannot be cancelled; do not wait for them
    runtime.shutdown_background();

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let start_time = Instant::now();
    // Load configuration: defaults, then config file, then flags
    let (config, layout) = args.build_config()?;

    // Discover input files and their countries
    let jobs = args.plan_jobs()?;
    if jobs.is_empty() {
        anyhow::bail!("No CSV or Parquet record files found");
    }

    let workers = args.workers().min(jobs.len());
    info!(
        "Resolving {} files with {} workers (cache: {})",
        jobs.len(),
        workers,
        layout.cache_dir.display()
    );

    // One resolver shares its reference caches across all files
    let resolver = Arc::new(NutsResolver::from_layout(config, layout));
    let format = args.format;

    // Set up progress reporting
    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    if args.quiet {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    // Resolve files concurrently; polars work runs on blocking threads
    let results: Vec<anyhow::Result<FileSummary>> = stream::iter(jobs)
        .map(|job| {
            let resolver = Arc::clone(&resolver);
            let pb = pb.clone();
            async move {
                pb.set_message(format!("{} ({})", job.input.display(), job.country));
                let result = task::spawn_blocking(move || cli::resolve_file(&resolver, &job, format))
                    .await
                    .context("Resolution task panicked")
                    .and_then(|result| result);
                pb.inc(1);
                result
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;
    pb.finish_and_clear();

    // Collect results, logging failures without aborting other files
    let mut summaries = Vec::new();
    let mut failures = 0usize;
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                error!("{:#}", e);
                failures += 1;
            }
        }
    }
    summaries.sort_by(|a, b| a.job.input.cmp(&b.job.input));

    // Generate final report
    cli::print_summary(&summaries, failures, start_time.elapsed());

    if summaries.is_empty() {
        anyhow::bail!("All {} files failed", failures);
    }
    Ok(())
}
