use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use nd_core::config::DEFAULT_CONFIG_FILE;
use nd_core::{AppConfig, DigestSelection};
use nd_curation::{Curator, RunOutcome, RunReport};
use nd_inference::{ClusterModelLoader, FileClusterModelLoader};
use nd_scrappers::logging::init_logging;
use nd_storage::{create_store, RunLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if let Ok(num) = current_number.parse::<u64>() {
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(|| "Duration is too large".to_string())?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // a trailing bare number counts as seconds
        if !current_number.is_empty() {
            let num = current_number
                .parse::<u64>()
                .map_err(|_| "Invalid number in duration".to_string())?;
            total_seconds = total_seconds
                .checked_add(num)
                .ok_or_else(|| "Duration is too large".to_string())?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Duration must be greater than zero".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Curates a recurring news digest", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "ND_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,
    /// Overrides storage.data_dir
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the curation pipeline once, or periodically
    Run {
        /// Run in periodic mode with the specified interval (e.g. 1h, 30m, 1d, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
        /// Overrides curation.top_n_per_cluster
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Print the digest of the persisted corpus as JSON
    Select {
        #[arg(long)]
        top_n: Option<usize>,
    },
    /// Show the ledger size, or whether it holds a URL
    Ledger {
        #[arg(long)]
        contains: Option<String>,
    },
    /// List configured sources
    Sources,
    /// Remove a run lock left behind by a crashed run
    Unlock,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn write_digest(output_dir: &Path, selection: &DigestSelection) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;
    let stamp = selection.generated_at.unwrap_or_else(Utc::now).format("%Y%m%dT%H%M%SZ");
    let path = output_dir.join(format!("digest_{}.json", stamp));
    let json = serde_json::to_string_pretty(selection)?;
    std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

fn summarize(report: &RunReport) {
    let c = &report.counts;
    info!(
        candidates = c.candidates,
        new = c.new_candidates,
        fetched = c.fetched,
        valid = c.valid,
        dropped = c.dropped,
        merged = c.merged,
        recency_degraded = report.recency_degraded,
        failed_sources = report.failed_sources.len(),
        "run summary"
    );
}

async fn run_once(curator: &Curator) -> Result<RunReport> {
    let config = curator.config();
    let _lock = RunLock::acquire(&config.storage.data_dir).context("another run holds the lock")?;

    let report = curator.run(Utc::now()).await;
    summarize(&report);

    match &report.outcome {
        RunOutcome::Completed => {
            if let Some(selection) = &report.selection {
                let path = write_digest(&config.storage.output_dir, selection)?;
                info!(path = %path.display(), articles = selection.len(), "digest written");
            }
        }
        RunOutcome::NoOp { reason } => info!(reason = %reason, "run finished without changes"),
        RunOutcome::Aborted { stage, error } => bail!("run aborted at {}: {}", stage, error),
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Run { interval, top_n } => {
            if let Some(n) = top_n {
                config.curation.top_n_per_cluster = n;
                config.validate()?;
            }
            let curator = Curator::from_config(config)
                .await
                .context("failed to set up the curation run")?;
            info!(sources = ?curator.scrapers().list_sources(), "curator ready");
            if curator.scrapers().is_empty() {
                warn!("no sources configured, runs will be no-ops");
            }

            match interval {
                Some(interval) => {
                    info!("Running in periodic mode with {}s interval", interval.0.as_secs());
                    loop {
                        info!("Starting curation cycle");
                        if let Err(e) = run_once(&curator).await {
                            error!("Error during curation cycle: {:#}", e);
                        }
                        info!("Waiting {}s before next cycle", interval.0.as_secs());
                        tokio::time::sleep(interval.0).await;
                    }
                }
                None => {
                    let report = run_once(&curator).await?;
                    println!("{}", serde_json::to_string_pretty(&report.outcome)?);
                }
            }
        }
        Commands::Select { top_n } => {
            let store = create_store(&config.storage).await?;
            let corpus = store.load_corpus().await?;
            let n = top_n.unwrap_or(config.curation.top_n_per_cluster);
            let mut selection = nd_curation::select(&corpus, n, Some(Utc::now()));
            match FileClusterModelLoader::new(&config.storage.cluster_model_path).load().await {
                Ok(model) => selection.label_clusters(model.names()),
                Err(e) => warn!("cluster names unavailable: {}", e),
            }
            println!("{}", serde_json::to_string_pretty(&selection)?);
        }
        Commands::Ledger { contains } => {
            let store = create_store(&config.storage).await?;
            let ledger = store.load_ledger().await?;
            match contains {
                Some(url) => {
                    let present = ledger.contains(&url);
                    println!("{}: {}", url, if present { "seen" } else { "new" });
                }
                None => println!("{} urls in ledger", ledger.len()),
            }
        }
        Commands::Sources => {
            if config.sources.is_empty() {
                println!("no sources configured");
            }
            for source in &config.sources {
                let kind = match source {
                    nd_core::SourceConfig::Html { .. } => "html",
                    nd_core::SourceConfig::File { .. } => "file",
                };
                let score = config.scoring.sources.score(source.name());
                println!("{:<24} {:<5} source_score={:.2}", source.name(), kind, score);
            }
        }
        Commands::Unlock => {
            if RunLock::force_release(&config.storage.data_dir)? {
                println!("lock removed");
            } else {
                println!("no lock held");
            }
        }
    }

    Ok(())
}
