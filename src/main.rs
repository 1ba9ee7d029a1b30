//! # Islet — Progressive Activation Scenario Runner
//!
//! Replays a scenario file against the scheduler and prints what activated,
//! when, and what each boundary renders at the end.
//!
//! Usage:
//!   islet --scenario page.toml                 # Virtual clock, table output
//!   islet --scenario page.toml --json          # Machine-readable report
//!   islet --scenario page.toml --realtime      # Follow wall time
//!   islet --scenario page.toml --config ~/islet.toml -v

mod scenario;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use islet_core::IsletConfig;
use scenario::{Pace, Scenario, ScenarioReport};

#[derive(Parser)]
#[command(
    name = "islet",
    version,
    about = "🏝️ Islet — progressive activation scenario runner"
)]
struct Cli {
    /// Scenario file (TOML)
    #[arg(short, long)]
    scenario: String,

    /// Config file (defaults to ~/.islet/config.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Advance the clock with wall time instead of jumping between steps
    #[arg(long)]
    realtime: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "islet=debug,islet_scheduler=debug"
    } else {
        "islet=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let path = expand_path(path);
            IsletConfig::load_from(&path)
                .with_context(|| format!("loading config {}", path.display()))?
        }
        None => IsletConfig::load().context("loading default config")?,
    };

    let scenario_path = expand_path(&cli.scenario);
    let scenario = Scenario::load(&scenario_path)?;

    let pace = if cli.realtime {
        Pace::Realtime(Duration::from_millis(config.host.driver_tick_ms))
    } else {
        Pace::Virtual
    };
    let report = scenario::run(&scenario, &config, pace).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("🏝️  Scenario '{}' — ended at {}ms\n", report.name, report.ended_at_ms);
    println!(
        "  {:<16} {:<12} {:<9} {:<11} {:<12} {:>10}",
        "ID", "TRIGGER", "PRIORITY", "STATE", "RENDER", "ACTIVE AT"
    );
    for b in &report.boundaries {
        let render = match (b.render, b.deferred) {
            (Some(_), true) => "deferred".to_string(),
            (Some(decision), false) => format!("{decision:?}").to_lowercase(),
            (None, _) => "-".to_string(),
        };
        let active_at = b
            .activation_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<12} {:<9} {:<11} {:<12} {:>10}",
            b.id,
            b.trigger.to_string(),
            b.priority.to_string(),
            b.state,
            render,
            active_at
        );
    }

    if !report.activations.is_empty() {
        println!("\n⚡ Activations:");
        for a in &report.activations {
            println!("   t={:>6}ms  {} ({}, {})", a.at_ms, a.id, a.trigger, a.priority);
        }
    }

    let m = &report.metrics;
    println!("\n📊 Metrics:");
    println!("   Boundaries: {} live, {} active, {} deferred", m.total, m.active, m.deferred);
    println!("   Completion: {:.1}%", m.completion_pct);
    if let (Some(mean), Some(p95)) = (m.mean_activation_ms, m.p95_activation_ms) {
        println!("   Activation: mean {mean:.1}ms, p95 {p95:.1}ms");
    }
    println!(
        "   Signals:    {} published, {} dropped",
        report.signals_published, report.signals_dropped
    );
}
