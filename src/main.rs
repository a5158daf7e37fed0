//! Polymarket Trading Bots
//!
//! Copies a target trader's entries or enters on probability-band triggers,
//! with hard daily/weekly loss limits, stop-losses and an emergency stop.

mod api;
mod bot;
mod engine;
mod error;
mod models;
mod strategy;
mod trading;

#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{MarketFeed, PolymarketFeed};
use crate::bot::{BotManager, OperatorControls};
use crate::engine::{ChannelListener, EngineEvent, EventListener, LogListener};
use crate::strategy::{ScanContext, SignalSource, ThresholdSource};
use crate::trading::{AppConfig, EntryGuard};

/// Polymarket trading bot CLI.
#[derive(Parser)]
#[command(name = "polybot")]
#[command(about = "Copy a Polymarket trader or trade probability-band triggers", long_about = None)]
struct Cli {
    /// Config file path (TOML); defaults are used when it does not exist
    #[arg(short, long, env = "POLYBOT_CONFIG", default_value = "polybot.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Never send real orders
    #[arg(long)]
    dry_run: bool,

    /// Book open positions as closed at their last price on shutdown
    #[arg(long)]
    close_on_exit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every strategy enabled in the config
    Run,

    /// Run only the copy (mirror) strategy
    Copy {
        /// Target trader's wallet address (overrides the config)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Run only the threshold strategy
    Threshold,

    /// Scan markets once and print threshold candidates without trading
    Scan {
        /// Maximum number of candidates to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if cli.dry_run {
        config.engine.dry_run = true;
    }

    match cli.command {
        Commands::Run => run(config, &cli.config, Mode::Enabled, cli.close_on_exit).await?,

        Commands::Copy { target } => {
            if let Some(target) = target {
                config.mirror.target = target;
            }
            run(config, &cli.config, Mode::Mirror, cli.close_on_exit).await?
        }

        Commands::Threshold => {
            run(config, &cli.config, Mode::Threshold, cli.close_on_exit).await?
        }

        Commands::Scan { limit } => scan(config, limit).await?,

        Commands::Config { default } => {
            let shown = if default { AppConfig::default() } else { config };
            println!("{}", shown.to_toml()?);
        }
    }

    Ok(())
}

enum Mode {
    Enabled,
    Mirror,
    Threshold,
}

/// Start engines, stream their events until Ctrl+C, then print final stats.
async fn run(config: AppConfig, config_path: &Path, mode: Mode, close_on_exit: bool) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let listeners: Vec<Arc<dyn EventListener>> =
        vec![Arc::new(LogListener), Arc::new(ChannelListener::new(tx))];

    let mut controls = OperatorControls::new(config_path, &config);
    let mut bot = BotManager::new(config, listeners)?;

    let started = match mode {
        Mode::Enabled => bot.start_enabled()?,
        Mode::Mirror => bot.start_mirror().map(|_| 1)?,
        Mode::Threshold => bot.start_threshold().map(|_| 1)?,
    };
    if started == 0 {
        println!("No strategies enabled. Set `enabled = true` under [mirror] or [threshold].");
        return Ok(());
    }

    println!("\n=== Polymarket Trading Bot ===");
    println!("Mode: {}", if bot.is_paper() { "DRY RUN (paper orders)" } else { "LIVE TRADING" });
    if let Some(engine) = bot.mirror() {
        println!("Copy:      {}", engine.status().await.description);
    }
    if let Some(engine) = bot.threshold() {
        println!("Threshold: {}", engine.status().await.description);
    }
    println!("\nPress Ctrl+C to stop.\n");

    let display_limit = bot.config().engine.display_limit;
    let mut summary = tokio::time::interval(Duration::from_secs(300));
    summary.tick().await;
    let control_secs = bot.config().engine.control_interval_secs.max(1);
    let mut control = tokio::time::interval(Duration::from_secs(control_secs));
    control.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            Some(event) = rx.recv() => {
                if let EngineEvent::Decision(record) = event {
                    println!(
                        "[{}] {:<10} {:<14} {} {} (${}) - {}",
                        record.timestamp.format("%H:%M:%S"),
                        record.strategy,
                        record.action,
                        truncate(&record.label, 40),
                        record.outcome,
                        record.size.round_dp(2),
                        record.reason
                    );
                }
            }
            _ = summary.tick() => {
                for status in bot.statuses().await {
                    println!("\n{}", status);
                }
            }
            _ = control.tick() => {
                let was_halted = controls.halted();
                controls.poll(&mut bot).await;
                if controls.halted() && !was_halted {
                    println!("\nKill switch triggered: all engines emergency stopped.");
                }
            }
        }
    }

    bot.stop_all();

    if close_on_exit {
        for closed in bot.close_all_positions().await {
            println!(
                "Closed {} at {} (P&L ${})",
                truncate(&closed.position.label, 40),
                closed.exit_price,
                closed.realized_pnl.round_dp(2)
            );
        }
    }

    // Show final stats
    for status in bot.statuses().await {
        println!("\n{}", status);
    }
    if let Some(engine) = bot.mirror() {
        print_recent(&engine.decisions(display_limit.min(10)).await);
    }
    if let Some(engine) = bot.threshold() {
        print_recent(&engine.decisions(display_limit.min(10)).await);
    }

    Ok(())
}

fn print_recent(records: &[crate::models::DecisionRecord]) {
    if records.is_empty() {
        return;
    }
    println!("\n{:<10} {:<14} {:<42} {:>10}", "TIME", "ACTION", "MARKET", "SIZE");
    println!("{}", "-".repeat(80));
    for record in records {
        println!(
            "{:<10} {:<14} {:<42} {:>10}",
            record.timestamp.format("%H:%M:%S"),
            record.action,
            truncate(&record.label, 40),
            format!("${:.2}", record.size)
        );
    }
}

/// One-shot threshold scan with no orders.
async fn scan(config: AppConfig, limit: usize) -> Result<()> {
    let threshold = config.threshold;
    let mut source = ThresholdSource::new(threshold.clone());
    source.validate()?;

    let feed = PolymarketFeed::new()?;
    let guard = EntryGuard::new();
    let ctx = ScanContext {
        feed: &feed as &dyn MarketFeed,
        guard: &guard,
        now: Utc::now(),
        call_timeout: Duration::from_secs(config.engine.call_timeout_secs.max(1)),
    };

    info!(
        entry_min = %threshold.entry_min,
        entry_max = %threshold.entry_max,
        "Scanning markets"
    );
    let report = source.scan(&ctx).await?;
    if report.candidates.is_empty() {
        warn!(scanned = report.scanned, "No markets in the entry band");
    }

    println!("\n{}", source.describe());
    println!("Markets scanned: {}\n", report.scanned);
    println!(
        "{:<50} {:<6} {:>8} {:>8} {:>10}",
        "MARKET", "BUY", "TRIGGER", "ENTRY", "SIZE"
    );
    println!("{}", "-".repeat(86));

    for candidate in report.candidates.iter().take(limit) {
        let size = match candidate.size {
            crate::strategy::SizeRequest::Fixed(size) => size,
            crate::strategy::SizeRequest::Mirror { target_notional } => target_notional,
        };
        println!(
            "{:<50} {:<6} {:>8} {:>8} {:>10}",
            truncate(&candidate.label, 48),
            candidate.outcome,
            candidate.detected_price,
            candidate.entry_price,
            format!("${:.2}", size)
        );
    }
    if report.candidates.len() > limit {
        println!("... and {} more", report.candidates.len() - limit);
    }

    Ok(())
}

/// Truncate a string to max length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long market question", 10), "a long ...");
    }

    #[test]
    fn test_cli_parses() {
        let args = ["polybot", "--dry-run", "copy", "--target", "0xabc"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.dry_run);
        assert!(!cli.close_on_exit);
        assert!(matches!(cli.command, Commands::Copy { target: Some(ref t) } if t == "0xabc"));

        let cli = Cli::try_parse_from(["polybot", "config", "--default"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { default: true }));

        let cli = Cli::try_parse_from(["polybot", "--close-on-exit", "run"]).unwrap();
        assert!(cli.close_on_exit);
    }
}
