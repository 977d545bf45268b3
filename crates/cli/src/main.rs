mod display;

use anyhow::{Context, Result};
use arrow::array::RecordBatch;
use clap::{Parser, Subcommand};
use config::Config;
use futures::stream::{BoxStream, StreamExt};
use object_store::path::Path;
use rgindex::{MetadataExtractor, Predicate};
use scan::{
    index_dataset, prune_dataset, query_dataset, stream_dataset, OrchestratorError, ScanContext,
    ScanError, ScanSummary,
};
use std::fs::File;
use storage::StoreError;
use tracing::{info, warn};

/// Statistics-based row group pruning for Parquet datasets
#[derive(Parser, Debug)]
#[command(name = "rgprune")]
#[command(about = "Statistics-based row group pruning for Parquet datasets", long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the number of files processed concurrently
    #[arg(short, long, global = true)]
    parallelism: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and save row group statistics for every data file
    Index {
        /// Dataset prefix (defaults to storage.prefix)
        prefix: Option<String>,
    },

    /// Report which row groups survive a predicate
    Prune {
        /// Predicate, e.g. "Year=2023;Month>=6"
        #[arg(short = 'w', long = "where")]
        predicate: String,

        /// Dataset prefix (defaults to storage.prefix)
        prefix: Option<String>,
    },

    /// Read the rows matching a predicate from surviving row groups
    Query {
        /// Predicate, e.g. "Year=2023;Month>=6"
        #[arg(short = 'w', long = "where")]
        predicate: String,

        /// Dataset prefix (defaults to storage.prefix)
        prefix: Option<String>,

        /// Stream rows as CSV to this file instead of printing a table
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Show the saved index of one data file
    Inspect {
        /// Data file id (its path in the store)
        file_id: String,

        /// Read statistics from the data file footer instead of the saved index
        #[arg(long)]
        extract: bool,

        /// Print the index as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    // Set RUST_LOG environment variable to control log level
    // Example: RUST_LOG=info or RUST_LOG=debug
    // hyper_util and reqwest are always set to ERROR level to reduce noise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
                .add_directive("hyper_util=error".parse()?)
                .add_directive("reqwest=error".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut app_config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(file) = &args.config {
        info!("Loaded configuration from: {}", file);
    } else {
        info!("Loaded configuration from environment variables");
    }
    if let Some(parallelism) = args.parallelism {
        app_config.scan.parallelism = parallelism;
    }
    app_config.validate().context("Invalid configuration")?;

    info!("Using storage configuration:");
    info!("  Backend: {:?}", app_config.storage.backend);
    info!("  Prefix: {}", app_config.storage.prefix);
    info!("  Index dir: {}", app_config.scan.index_dir);
    info!("  Parallelism: {}", app_config.scan.effective_parallelism());

    let ctx = ScanContext::from_config(&app_config).context("Failed to create object store")?;
    install_ctrl_c(&ctx);

    let default_prefix = app_config.storage.prefix.clone();
    match args.command {
        Command::Index { prefix } => {
            let prefix = prefix.unwrap_or(default_prefix);
            let report = index_dataset(&ctx, &prefix).await?;

            for (file_id, outcome) in report.successes() {
                println!(
                    "{}: {} row groups, {} rows",
                    file_id, outcome.row_group_count, outcome.row_count
                );
            }
            finish(report.summary(), report.failures(), report.outcome())
        }
        Command::Prune { predicate, prefix } => {
            let predicate = parse_predicate(&predicate)?;
            let prefix = prefix.unwrap_or(default_prefix);
            let report = prune_dataset(&ctx, &prefix, &predicate).await?;

            println!("{}", display::format_prune_report(&report));
            finish(report.summary(), report.failures(), report.outcome())
        }
        Command::Query {
            predicate,
            prefix,
            output,
        } => {
            let predicate = parse_predicate(&predicate)?;
            let prefix = prefix.unwrap_or(default_prefix);

            match output {
                Some(path) => {
                    let result = stream_dataset(&ctx, &prefix, &predicate).await?;
                    let pruned = result.pruned.summary();
                    let (rows, failed) = write_csv(&path, result.batches).await?;
                    println!("Wrote {} rows to {}", rows, path);

                    let summary = ScanSummary {
                        succeeded: pruned.succeeded - failed.len(),
                        failed: pruned.failed + failed.len(),
                        ..pruned
                    };
                    let failures = result
                        .pruned
                        .failures()
                        .chain(failed.iter().map(|(id, e)| (id.as_str(), e)));
                    finish(summary, failures, summary.outcome())
                }
                None => {
                    let result = query_dataset(&ctx, &prefix, &predicate).await?;
                    let batches: Vec<_> = result.batches().cloned().collect();
                    println!("{}", display::format_batches(&batches)?);
                    println!("{} rows", result.num_rows());

                    info!(
                        "Pruning: {}; fetching: {}",
                        result.pruned.summary(),
                        result.fetched.summary()
                    );
                    finish(result.summary(), result.failures(), result.outcome())
                }
            }
        }
        Command::Inspect {
            file_id,
            extract,
            json,
        } => {
            let index = if extract {
                MetadataExtractor::new(rgindex::ExtractOptions {
                    skip_unsupported_columns: app_config.extract.skip_unsupported_columns,
                })
                .extract_from_store(ctx.store().as_ref(), &Path::from(file_id.as_str()))
                .await?
            } else {
                match ctx.index_store().load(&file_id).await {
                    Ok(index) => index,
                    Err(StoreError::NotFound { .. }) => {
                        anyhow::bail!("No index for {}; run `rgprune index` first", file_id)
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else {
                println!("{}", display::format_index(&index));
                println!(
                    "{}: {} row groups, {} rows",
                    index.file_id,
                    index.row_group_count,
                    index.total_rows()
                );
            }
            Ok(())
        }
    }
}

fn parse_predicate(raw: &str) -> Result<Predicate> {
    raw.parse()
        .with_context(|| format!("Invalid predicate: {}", raw))
}

/// Cancels the running scan on the first CTRL-C
fn install_ctrl_c(ctx: &ScanContext) {
    let handle = ctx.orchestrator().cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("CTRL-C received, cancelling scan");
            handle.cancel();
        }
    });
}

/// Prints the summary and per-file failures; errors only when every file failed
fn finish<'a>(
    summary: ScanSummary,
    failures: impl Iterator<Item = (&'a str, &'a ScanError)>,
    outcome: Result<(), OrchestratorError>,
) -> Result<()> {
    for (file_id, error) in failures {
        warn!(file_id = %file_id, "{}", error);
        eprintln!("  {}: {}", file_id, error);
    }
    println!("{}", summary);

    match outcome {
        Err(e @ OrchestratorError::AllFailed { .. }) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Writes batches as they arrive; returns the row count and the files that failed
async fn write_csv(
    path: &str,
    mut batches: BoxStream<'static, (String, Result<RecordBatch, ScanError>)>,
) -> Result<(usize, Vec<(String, ScanError)>)> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);

    let mut rows = 0;
    let mut failed: Vec<(String, ScanError)> = Vec::new();
    while let Some((file_id, batch)) = batches.next().await {
        match batch {
            Ok(batch) => {
                writer.write(&batch)?;
                rows += batch.num_rows();
            }
            Err(e) => {
                if !failed.iter().any(|(id, _)| *id == file_id) {
                    failed.push((file_id, e));
                }
            }
        }
    }
    Ok((rows, failed))
}
