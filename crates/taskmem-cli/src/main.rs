//! taskmem CLI: inspect configuration and drive a synthetic page workload.

use std::fs;
use std::path::PathBuf;
use std::thread::{self, ScopedJoinHandle};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use taskmem_core::config::{parse_byte_size, MemoryConfig};
use taskmem_core::prelude::{Category, CategoryBreakdown, Error};
use taskmem_mem::{MemorySnapshot, Page, TaskMemoryManager};

#[derive(Parser)]
#[command(name = "taskmem")]
#[command(about = "Per-task memory accounting and page allocation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file (defaults to TASKMEM_* environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage budget, e.g. 512M (overrides config)
    #[arg(long)]
    storage_mem: Option<String>,

    /// Shuffle budget (overrides config)
    #[arg(long)]
    shuffle_mem: Option<String>,

    /// Intersection budget (overrides config)
    #[arg(long)]
    intersection_mem: Option<String>,

    /// Maximum number of live pages (overrides config)
    #[arg(long)]
    max_pages: Option<usize>,

    /// Initial page table size; the table grows up to max-pages
    #[arg(long)]
    initial_pages: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        cfg: ConfigArgs,
    },

    /// Run a concurrent allocate/free workload and report the accounting
    Simulate {
        #[command(flatten)]
        cfg: ConfigArgs,

        /// Worker threads
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Pages each worker tries to allocate
        #[arg(long, default_value_t = 64)]
        pages_per_thread: usize,

        /// Size of every page, e.g. 4K
        #[arg(long, default_value = "4K")]
        page_size: String,

        /// Category the workers charge
        #[arg(long, default_value = "shuffle")]
        category: Category,

        /// Free every Nth page before teardown (0 keeps them all)
        #[arg(long, default_value_t = 2)]
        free_every: usize,
    },
}

#[derive(Serialize)]
struct SimulationReport {
    allocated: usize,
    out_of_memory: usize,
    table_exhausted: usize,
    freed_before_teardown: usize,
    held_at_teardown: usize,
    before_teardown: MemorySnapshot,
    peak: CategoryBreakdown,
    freed_on_teardown: usize,
    after_teardown: MemorySnapshot,
}

#[derive(Default)]
struct WorkerTally {
    kept: Vec<Page>,
    allocated: usize,
    out_of_memory: usize,
    table_exhausted: usize,
    freed: usize,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Config { cfg } => show_config(&cfg),
        Commands::Simulate {
            cfg,
            threads,
            pages_per_thread,
            page_size,
            category,
            free_every,
        } => simulate(&cfg, threads, pages_per_thread, &page_size, category, free_every),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &ConfigArgs) -> Result<MemoryConfig, Error> {
    let mut cfg = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            MemoryConfig::from_json(&raw)?
        }
        None => MemoryConfig::from_env()?,
    };

    if let Some(s) = &args.storage_mem {
        cfg.storage_budget_bytes = parse_byte_size(s)?;
    }
    if let Some(s) = &args.shuffle_mem {
        cfg.shuffle_budget_bytes = parse_byte_size(s)?;
    }
    if let Some(s) = &args.intersection_mem {
        cfg.intersection_budget_bytes = parse_byte_size(s)?;
    }
    if let Some(n) = args.max_pages {
        cfg.max_pages = n;
    }
    if let Some(n) = args.initial_pages {
        cfg.initial_pages = Some(n);
    }

    cfg.validate()?;
    Ok(cfg)
}

fn show_config(args: &ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(args)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

fn simulate(
    args: &ConfigArgs,
    threads: usize,
    pages_per_thread: usize,
    page_size: &str,
    category: Category,
    free_every: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(args)?;
    let page_bytes = parse_byte_size(page_size)?;
    let manager = TaskMemoryManager::new(&cfg)?;

    tracing::info!(
        threads,
        pages_per_thread,
        page_bytes,
        %category,
        "starting simulation"
    );

    let tallies: Vec<WorkerTally> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads.max(1))
            .map(|worker| {
                let manager = &manager;
                s.spawn(move || {
                    run_worker(
                        manager,
                        worker,
                        pages_per_thread,
                        page_bytes,
                        category,
                        free_every,
                    )
                })
            })
            .collect();
        join_workers(handles)
    })?;

    let mut report = SimulationReport {
        allocated: 0,
        out_of_memory: 0,
        table_exhausted: 0,
        freed_before_teardown: 0,
        held_at_teardown: 0,
        before_teardown: manager.snapshot(),
        peak: manager.ledger().snapshot().peak,
        freed_on_teardown: 0,
        after_teardown: manager.snapshot(),
    };
    for tally in &tallies {
        report.allocated += tally.allocated;
        report.out_of_memory += tally.out_of_memory;
        report.table_exhausted += tally.table_exhausted;
        report.freed_before_teardown += tally.freed;
        report.held_at_teardown += tally.kept.len();
    }

    report.freed_on_teardown = manager.clean_all_allocated_memory();
    report.after_teardown = manager.snapshot();
    // Handles still held by the workers are stale now.
    drop(tallies);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Join every worker; any panic fails the whole run instead of being counted
/// as an empty tally.
fn join_workers<T>(handles: Vec<ScopedJoinHandle<'_, T>>) -> Result<Vec<T>, String> {
    let mut results = Vec::with_capacity(handles.len());
    let mut panicked = 0;
    for handle in handles {
        match handle.join() {
            Ok(value) => results.push(value),
            Err(_) => panicked += 1,
        }
    }
    if panicked > 0 {
        return Err(format!("{panicked} worker thread(s) panicked"));
    }
    Ok(results)
}

fn run_worker(
    manager: &TaskMemoryManager,
    worker: usize,
    pages: usize,
    page_bytes: usize,
    category: Category,
    free_every: usize,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    for i in 0..pages {
        match manager.allocate_page(page_bytes, &category) {
            Ok(mut page) => {
                tally.allocated += 1;
                let fill = (worker + i) as u8;
                if let Err(e) = manager.with_block_mut(&page, |bytes| bytes.fill(fill)) {
                    tracing::error!(worker, error = %e, "fill failed");
                }
                if free_every > 0 && i % free_every == 0 {
                    match manager.free_page(&mut page) {
                        Ok(()) => tally.freed += 1,
                        Err(e) => tracing::error!(error = %e, "free failed"),
                    }
                } else {
                    tally.kept.push(page);
                }
            }
            Err(Error::OutOfMemory(_)) => tally.out_of_memory += 1,
            Err(Error::TableExhausted { .. }) => tally.table_exhausted += 1,
            Err(e) => tracing::error!(worker, error = %e, "allocation failed"),
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_workers_reports_panics() {
        let joined = thread::scope(|s| {
            let handles = vec![
                s.spawn(|| 1),
                s.spawn(|| -> i32 { panic!("worker failed") }),
                s.spawn(|| 3),
            ];
            join_workers(handles)
        });
        assert_eq!(joined.unwrap_err(), "1 worker thread(s) panicked");
    }

    #[test]
    fn join_workers_collects_results_in_order() {
        let joined = thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|i| s.spawn(move || i * 10)).collect();
            join_workers(handles)
        });
        assert_eq!(joined.unwrap(), vec![0, 10, 20, 30]);
    }
}
