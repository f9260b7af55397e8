//! berry - deploy and verify the Berry supply chain contracts
//!
//! Usage:
//!   berry deploy                 Deploy every unit, wire late bindings, record artifacts
//!   berry verify                 Run the verification workflow against the recorded deployment
//!   berry plan                   Print the deployment order without touching the network
//!   berry balance                Print the sender address and balance
//!
//! Exit status is 0 on success and 1 on any fatal error or failed verification step.

mod commands;
mod style;

use berry_deploy::OrchestratorError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use style::*;
use tracing_subscriber::EnvFilter;

// ==================== CLI ====================

#[derive(Parser, Debug)]
#[command(name = "berry")]
#[command(author, version, about = "Berry supply chain deployment orchestrator")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Orchestrator config file
    #[arg(short, long, global = true, env = "BERRY_CONFIG", default_value = "berry.toml")]
    pub config: PathBuf,

    /// Plan manifest declaring units, bindings and verification steps
    #[arg(short, long, global = true, env = "BERRY_PLAN", default_value = "deploy/supply-chain.toml")]
    pub plan: PathBuf,

    /// JSON-RPC endpoint, overrides network.url
    #[arg(long, global = true, env = "BERRY_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Expected chain id, overrides network.chain_id
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// Artifact output directory, overrides artifacts.output_dir
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy all units and wire late bindings
    Deploy {
        /// Run against an in-memory chain instead of the configured network
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the verification workflow against the recorded deployment
    Verify {
        /// Run against an in-memory chain instead of the configured network
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the deployment order, bindings and verification steps
    Plan,

    /// Show the sender address and balance
    Balance,
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Deploy { dry_run } => commands::deploy::run(&cli, *dry_run).await,
        Commands::Verify { dry_run } => commands::verify::run(&cli, *dry_run).await,
        Commands::Plan => commands::plan::run(&cli).map(|_| true),
        Commands::Balance => commands::balance::run(&cli).await.map(|_| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print error kind, subject and detail of a fatal error
fn report_fatal(err: &anyhow::Error) {
    println!();
    match err.chain().find_map(|e| e.downcast_ref::<OrchestratorError>()) {
        Some(e) => {
            print_error(&format!("{} {}", e.kind(), e.subject().unwrap_or("-")));
            eprintln!("  {}", e);
            if err.to_string() != e.to_string() {
                eprintln!("  {}", style_dim(&format!("{:#}", err)));
            }
        }
        None => print_error(&format!("{:#}", err)),
    }
}
