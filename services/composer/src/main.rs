//! Composite job runner.
//!
//! Executes one end-to-end composite job described by a YAML file:
//! - searches the catalog for matching asset descriptors,
//! - builds a virtual array over them (no pixel reads),
//! - records the requested transformations as a task graph,
//! - executes the graph across a bounded worker pool,
//! - writes the materialized result to disk.
//!
//! Ctrl+C cancels the in-flight execution; outstanding chunk tasks are
//! stopped and the run exits with an error instead of a partial result.

mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use catalog_client::CatalogClient;
use compute_engine::{
    ArrayOps, ComputeError, ExecuteOptions, Executor, IntoLazy, ObjectStoreTileReader,
};
use virtual_array::VirtualArrayBuilder;

use config::JobConfig;

#[derive(Parser, Debug)]
#[command(name = "composer")]
#[command(about = "Run a composite job: catalog search, virtual array build, deferred compute")]
struct Args {
    /// Path to the YAML job file
    #[arg(short, long, env = "COMPOSER_JOB")]
    job: PathBuf,

    /// Override the output path from the job file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Print the plan without executing it
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(job = %args.job.display(), "Starting composer");

    let config = JobConfig::load(&args.job)?;

    // 1. Catalog search
    let client = CatalogClient::connect(&config.catalog.url)
        .context("failed to create catalog client")?;
    let request = config.search_request()?;

    let descriptors = client
        .search_collected(request)
        .await
        .context("catalog search failed")?;

    info!(count = descriptors.len(), "Catalog search complete");

    // 2. Virtual array build (no pixel reads)
    let params = config.build_params()?;
    let array = VirtualArrayBuilder::new(params)
        .build(&descriptors)
        .context("virtual array build failed")?;

    let (times, bands, rows, cols) = array.shape();
    info!(
        times,
        bands,
        rows,
        cols,
        coverage = array.coverage(),
        "Built virtual array"
    );

    // 3. Task graph
    let mut lazy = array.lazy();
    if let Some(reduce) = config.compute.reduce {
        lazy = lazy.reduce(reduce.dims, reduce.reducer);
    }
    let graph = lazy.into_graph();

    if args.dry_run {
        info!(nodes = graph.len(), "Dry run, skipping execution");
        return Ok(());
    }

    // 4. Deferred execution
    let store = config.tiles.build_store()?;
    let reader = Arc::new(ObjectStoreTileReader::new(store, config.read_timeout()));
    let executor = Executor::with_config(reader, config.compute_config());

    // Ctrl+C cancels the in-flight execution
    let cancel = executor.cancel_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal, cancelling execution");
        cancel.cancel();
    });

    let mut opts = ExecuteOptions::compute();
    if config.compute.allow_partial {
        opts = opts.with_partial_tolerance();
    }

    let result = match executor.execute(&graph, &opts).await {
        Ok(result) => result,
        Err(ComputeError::Cancelled) => {
            anyhow::bail!("execution cancelled before completion");
        }
        Err(err) => return Err(err).context("execution failed"),
    };

    for warning in &result.warnings {
        tracing::warn!(warning = %warning, "Execution warning");
    }

    // 5. Output
    let out_path = args.out.unwrap_or_else(|| config.output.path.clone());
    output::write_result(&result, &out_path)?;

    let (nt, nb, ny, nx) = result.shape();
    info!(
        times = nt,
        bands = nb,
        rows = ny,
        cols = nx,
        valid = result.valid_fraction(),
        "Composite job complete"
    );

    Ok(())
}
