//! webgate CLI
//!
//! Checks URLs against the shell allow-list and replays host event scripts
//! through the gatekeeper.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use webgate::config::{parse_host_list, ShellConfig};
use webgate::metrics::global_metrics;
use webgate::replay::Replay;

/// Navigation and session gatekeeper for embedded web shells
#[derive(Parser, Debug)]
#[command(name = "webgate")]
#[command(author = "ReasonKit Team <team@reasonkit.sh>")]
#[command(version)]
#[command(about = "Navigation and session gatekeeper for embedded web shells")]
struct Args {
    /// Start URL (overrides WEBGATE_START_URL)
    #[arg(long, global = true)]
    start_url: Option<String>,

    /// Allowed host suffixes, comma separated (overrides WEBGATE_ALLOWED_HOSTS)
    #[arg(long, global = true)]
    allowed_hosts: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the policy decision for each URL
    Check {
        /// URLs to evaluate
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Replay a JSON-lines host event script (stdin when no file is given)
    Replay {
        /// Script file
        file: Option<PathBuf>,

        /// Print metrics in Prometheus format when done
        #[arg(long)]
        metrics: bool,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(args: &Args) -> Result<ShellConfig> {
    let mut config = ShellConfig::from_env().context("reading configuration from environment")?;

    if let Some(url) = &args.start_url {
        config.start_url = url.clone();
    }
    if let Some(raw) = &args.allowed_hosts {
        config.allowed_hosts = parse_host_list(raw);
    }

    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("{} {} starting", webgate::NAME, webgate::VERSION);

    let config = load_config(&args)?;
    let policy = config.validate().context("invalid shell configuration")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Check { urls } => {
            for url in urls {
                let decision = policy.evaluate(&url);
                let line = json!({ "url": url, "result": decision });
                writeln!(out, "{}", line)?;
            }
        }
        Command::Replay { file, metrics } => {
            tracing::info!(
                "Replaying host events against {} allowed host(s)",
                policy.allow_set().len()
            );

            let mut replay = Replay::new(&config, global_metrics())?;
            let summary = match file {
                Some(path) => {
                    let reader = File::open(&path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    replay.run(BufReader::new(reader), &mut out)?
                }
                None => replay.run(io::stdin().lock(), &mut out)?,
            };

            tracing::info!(
                "Replay finished: {} events, {} effects{}",
                summary.events,
                summary.effects,
                if summary.closed { ", shell closed" } else { "" }
            );

            if metrics {
                write!(out, "{}", global_metrics().to_prometheus_format())?;
            }
        }
        Command::Config => {
            serde_json::to_writer_pretty(&mut out, &config)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
