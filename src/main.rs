mod browser;
mod config;
mod crawl;
mod db;
mod error;
mod extract;
mod model;
mod session;
mod snapshot;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::session::Outcome;

#[derive(Parser)]
#[command(name = "job_scraper", about = "Job listing scraper via headless Chrome")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every configured search term and persist new listings
    Run {
        /// Search terms (repeatable); overrides the configured list
        #[arg(short, long = "term")]
        terms: Vec<String>,
        /// Path to a JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Defensive cap on pages per term
        #[arg(long)]
        max_pages: Option<usize>,
        /// Run the browser with a visible window
        #[arg(long)]
        headed: bool,
    },
    /// Show snapshot and database statistics
    Stats {
        /// Path to a JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            terms,
            config,
            max_pages,
            headed,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            if !terms.is_empty() {
                cfg.search_terms = terms;
            }
            if let Some(cap) = max_pages {
                cfg.max_pages = cap;
            }
            if headed {
                cfg.headless = false;
            }
            if cfg.search_terms.is_empty() {
                println!("No search terms configured, nothing to do.");
                return Ok(());
            }

            let summary = crawl::run(&cfg).await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Stats { config } => {
            let cfg = Config::load(config.as_deref())?;
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;

            let snap = snapshot::load(&cfg.snapshot_path)?;
            let stats = db::get_stats(&conn)?;

            println!("Snapshot posts:  {}", snap.len());
            println!("Database rows:   {}", stats.total);
            println!("Distinct links:  {}", stats.distinct_links);
            if !stats.by_category.is_empty() {
                println!("\n--- By search term ---");
                for (category, count) in &stats.by_category {
                    println!("  {:<24} {}", truncate(category, 24), count);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_summary(summary: &crawl::CrawlSummary) {
    println!(
        "{:<24} | {:>5} | {:>5} | {:>5} | {:>8} | {:>6} | {}",
        "Term", "Pages", "Found", "New", "Inserted", "Errors", "Outcome"
    );
    println!("{}", "-".repeat(80));

    for r in &summary.reports {
        let outcome = match &r.outcome {
            Outcome::Done => "done".to_string(),
            Outcome::Cancelled => "cancelled".to_string(),
            Outcome::Failed(e) => format!("failed: {}", truncate(e, 40)),
        };
        println!(
            "{:<24} | {:>5} | {:>5} | {:>5} | {:>8} | {:>6} | {}",
            truncate(&r.term, 24),
            r.pages,
            r.found,
            r.fresh,
            r.inserted,
            r.insert_failures,
            outcome
        );
    }

    let found: usize = summary.reports.iter().map(|r| r.found).sum();
    let fresh: usize = summary.reports.iter().map(|r| r.fresh).sum();
    let failed = summary
        .reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
        .count();

    println!(
        "\n{} listings seen, {} new, {} sessions failed. Snapshot now tracks {} posts.",
        found, fresh, failed, summary.snapshot_total
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
