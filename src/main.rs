//! Argos Audit - element auditing CLI

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use argos_audit::checks::{BlindTimingCheck, ReflectionCheck};
use argos_audit::config;
use argos_audit::models::{AuditReport, SessionConfig, Severity};
use argos_audit::orchestrator::Orchestrator;
use argos_audit::session::Session;

/// Argos Audit - injects payloads into a page's elements and reports issues
#[derive(Parser)]
#[command(name = "argos-audit", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a page and every page training discovers from it
    Audit {
        /// Target URL to audit
        #[arg(short, long)]
        url: String,

        /// Value injected into every input
        #[arg(short, long)]
        seed: String,

        /// Verify responses with this regular expression instead of the seed
        #[arg(short, long)]
        regexp: Option<String>,

        /// Delay-inducing seed for timing audits (must contain __TIME__)
        #[arg(long)]
        timing_seed: Option<String>,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Max requests per second
        #[arg(long)]
        rate_limit: Option<u32>,

        /// Custom headers (format: "Key: Value")
        #[arg(short = 'H', long)]
        header: Option<Vec<String>>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

fn print_summary(report: &AuditReport) {
    let count = |severity| report.count_by_severity(severity);

    eprintln!("\n{}", "  Audit Summary".bold());
    eprintln!("  {}", "─".repeat(35));
    eprintln!("  {} {}", "Pages audited:".bold(), report.pages_audited);
    eprintln!("  {} {}", "Requests:".bold(), report.total_requests);
    eprintln!(
        "\n  {} {} {} {} {}",
        format!("{} Critical", count(Severity::Critical)).red().bold(),
        format!("{} High", count(Severity::High)).bright_red(),
        format!("{} Medium", count(Severity::Medium)).yellow(),
        format!("{} Low", count(Severity::Low)).blue(),
        format!("{} Info", count(Severity::Info)).white(),
    );
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Audit {
            url,
            seed,
            regexp,
            timing_seed,
            config: config_path,
            timeout,
            rate_limit,
            header,
            output,
            verbose,
        } => {
            let filter = if verbose {
                "argos_audit=debug"
            } else {
                "argos_audit=info"
            };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
                )
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();

            let mut session_config = if let Some(ref path) = config_path {
                config::load_config(path)?
            } else {
                let default_path = Path::new("config/default.toml");
                if default_path.exists() {
                    config::load_config(default_path)?
                } else {
                    SessionConfig::default()
                }
            };
            config::merge_cli_args(&mut session_config, url, timeout, rate_limit, header)?;

            eprintln!("  {} {}", "Target:".bold(), session_config.target.green());
            eprintln!("  {} {}\n", "Seed:".bold(), seed.cyan());

            let timing = session_config.timing;
            let session = Session::new(session_config)?;
            let mut orchestrator = Orchestrator::new(session);

            let mut reflection = ReflectionCheck::new(seed);
            if let Some(regexp) = regexp {
                reflection = reflection.with_regexp(regexp);
            }
            orchestrator.register(Arc::new(reflection));
            if let Some(timing_seed) = timing_seed {
                orchestrator.register(Arc::new(BlindTimingCheck::new(timing_seed, timing)));
            }

            let report = orchestrator.audit_target().await?;
            print_summary(&report);

            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    eprintln!(
                        "\n  {} {}",
                        "Report saved to:".bold(),
                        path.display().to_string().green()
                    );
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}
