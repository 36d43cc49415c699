//! # Recall Harness CLI (`recall`)
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall query <words…>` | Ranked results from every backend |
//! | `recall index` | Index changed corpus files (`--force` re-indexes all) |
//! | `recall stats` | Chunk/fact counts, archival availability, index state |
//! | `recall add "<fact>"` | Store a fact in the fact memory |
//!
//! Logs go to stderr, filtered by `RECALL_LOG` (default `warn`, `info`
//! with `--verbose`). Stdout carries only results.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use recall_harness::config;
use recall_harness::recall::{RawRecall, RecallResponse};
use recall_harness::{Harness, Stats};
use recall_harness_core::index::IndexReport;

/// Recall Harness CLI: one recall query over vector, fact, and archival
/// memory.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Recall Harness: one recall query over vector, fact, and archival memory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    /// Log indexing and backend activity to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every backend and print one ranked list.
    Query {
        /// Query words, joined with spaces.
        #[arg(required = true)]
        words: Vec<String>,

        /// Maximum number of results (defaults to `recall.limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print per-backend results as JSON instead of the ranked list.
        #[arg(long)]
        json: bool,
    },

    /// Index the corpus. Unchanged files are skipped.
    Index {
        /// Re-index every file regardless of its fingerprint.
        #[arg(long)]
        force: bool,
    },

    /// Show backend counts and the index state.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Add a fact to the fact memory.
    Add {
        /// The fact text.
        fact: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("RECALL_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_response(response: &RecallResponse) {
    println!(
        "Recall: \"{}\" ({} results)",
        response.query,
        response.results.len()
    );
    println!();

    for (i, ranked) in response.results.iter().enumerate() {
        let r = &ranked.result;
        match r.auxiliary.get("headerPath").filter(|h| !h.is_empty()) {
            Some(header) => println!("{}. [{:.2}] {}  ({})", i + 1, r.score, r.source, header),
            None => println!("{}. [{:.2}] {}", i + 1, r.score, r.source),
        }
        for line in r.text.lines().filter(|l| !l.trim().is_empty()) {
            println!("   {}", line);
        }
        println!();
    }

    for d in &response.diagnostics {
        eprintln!("note: {} {}: {}", d.backend, d.kind, d.message);
    }
}

fn print_raw(raw: &RawRecall) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(raw)?);
    Ok(())
}

fn print_report(report: &IndexReport) {
    println!("Index complete");
    println!("  indexed files: {}", report.files_indexed);
    println!("  skipped files: {}", report.files_skipped);
    println!("  chunks written: {}", report.chunks_written);
    println!("  errors: {}", report.errors.len());
    for e in &report.errors {
        println!("    {}: {}", e.file, e.message);
    }
}

fn print_stats(stats: &Stats) {
    println!("Recall Harness Stats");
    println!("======================");
    println!();
    println!("  Chunks:      {}", stats.chunk_count);
    println!("  Facts:       {}", stats.fact_count);
    println!(
        "  Archival:    {}",
        if stats.archival_available {
            "available"
        } else {
            "unavailable"
        }
    );
    if let Some(memory) = &stats.archival_core_memory {
        let blocks = memory
            .get("blocks")
            .and_then(|b| b.as_array())
            .map_or(0, |b| b.len());
        println!("  Core blocks: {}", blocks);
    }
    println!("  Indexed:     {} files", stats.index_state.files.len());
    println!(
        "  Last full:   {}",
        stats
            .index_state
            .last_full_index_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let harness = Harness::open(cfg).await?;

    match cli.command {
        Commands::Query { words, limit, json } => {
            let query = words.join(" ");
            if json {
                print_raw(&harness.recall_raw(&query, limit).await)?;
            } else {
                print_response(&harness.recall(&query, limit).await);
            }
        }
        Commands::Index { force } => {
            print_report(&harness.index_all(force).await);
        }
        Commands::Stats { json } => {
            let stats = harness.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Commands::Add { fact } => {
            let ack = harness.add_fact(&fact).await?;
            println!("Fact added ({})", ack.backend);
            println!("{}", serde_json::to_string_pretty(&ack.detail)?);
        }
    }

    Ok(())
}
