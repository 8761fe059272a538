//! WARDEN Demo CLI
//!
//! Runs one or all of the demo scenarios. Each scenario builds a real
//! `PolicyEngine` with built-in guards and an audit log, then replays the
//! tool calls an agent might make.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- quickstart
//!   cargo run -p demo -- email-cleanup
//!   cargo run -p demo -- shopping
//!   cargo run -p demo -- runaway-loop
//!   cargo run -p demo -- secrets
//!   cargo run -p demo -- toml-config

mod scenarios;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use warden_contracts::error::WardenResult;

use scenarios::{email_cleanup, quickstart, runaway_loop, secrets, shopping, toml_config};

// ── CLI definition ────────────────────────────────────────────────────────────

/// WARDEN: policy engine for AI-agent tool calls.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "WARDEN policy engine demo",
    long_about = "Runs WARDEN demo scenarios showing budget, rate-limit, deletion,\n\
                  purchase, scope and sensitive-data enforcement with audit chain integrity."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Budget, rate limit and scope on a research agent.
    Quickstart,
    /// Deletion guard on an inbox-cleaning agent, through `guarded`.
    EmailCleanup,
    /// Purchase guard with a callback approver.
    Shopping,
    /// Loop detection and burst cooldown.
    RunawayLoop,
    /// Sensitive-data detection, denying and redacting.
    Secrets,
    /// Engine built from a TOML file.
    TomlConfig,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output, RUST_LOG=warden::audit=info for audit lines.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::Quickstart => quickstart::run_scenario().await,
        Command::EmailCleanup => email_cleanup::run_scenario().await,
        Command::Shopping => shopping::run_scenario().await,
        Command::RunawayLoop => runaway_loop::run_scenario().await,
        Command::Secrets => secrets::run_scenario().await,
        Command::TomlConfig => toml_config::run_scenario().await,
    };

    match result {
        Ok(()) => println!("All selected scenarios completed successfully."),
        Err(e) => {
            error!(error = %e, "scenario failed");
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_all() -> WardenResult<()> {
    quickstart::run_scenario().await?;
    email_cleanup::run_scenario().await?;
    shopping::run_scenario().await?;
    runaway_loop::run_scenario().await?;
    secrets::run_scenario().await?;
    toml_config::run_scenario().await?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("WARDEN: Policy Engine for Agent Tool Calls");
    println!("==========================================");
    println!();
    println!("Per call:");
    println!("  [1] Every applicable guard evaluates the call in parallel");
    println!("  [2] Decisions merge: DENY > REQUIRE_APPROVAL > MODIFY > ALLOW");
    println!("  [3] REQUIRE_APPROVAL suspends for the approval handler (timeout = deny)");
    println!("  [4] A final DENY rolls back spend and counters the guards recorded");
    println!("  [5] Post-hooks append the decision to a SHA-256 audit chain");
    println!();
}
