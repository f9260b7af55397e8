//! Command implementations and the setup they share

pub mod balance;
pub mod deploy;
pub mod plan;
pub mod verify;

use crate::style::*;
use crate::Cli;
use anyhow::{Context, Result};
use berry_deploy::{
    Address, ChainClient, HardhatArtifacts, JsonRpcClient, LocalSigner, MockChain,
    Orchestrator, OrchestratorConfig, PlanManifest,
};
use std::sync::Arc;
use tracing::debug;

/// Hardhat's first development account, used by dry runs without a key
const DRY_RUN_SENDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Config file plus command-line overrides. Dry runs write under
/// `<output_dir>/dry-run` so they never clobber a real deployment record.
pub fn load_config(cli: &Cli, dry_run: bool) -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::load(&cli.config)?;
    if let Some(url) = &cli.rpc_url {
        config.network.url = url.clone();
    }
    if let Some(chain_id) = cli.chain_id {
        config.network.chain_id = chain_id;
    }
    if let Some(dir) = &cli.output_dir {
        config.artifacts.output_dir = dir.clone();
    }
    if dry_run {
        config.artifacts.output_dir = config.artifacts.output_dir.join("dry-run");
    }
    config.validate()?;
    Ok(config)
}

pub fn load_manifest(cli: &Cli) -> Result<PlanManifest> {
    Ok(PlanManifest::load(&cli.plan)?)
}

/// Chain client for the configured network, or an in-memory chain for dry runs
pub fn connect(config: &OrchestratorConfig, dry_run: bool) -> Result<Arc<dyn ChainClient>> {
    if dry_run {
        let sender = match config.sender.resolve_key() {
            Ok(key) => LocalSigner::from_hex(&key)?.address(),
            Err(_) => DRY_RUN_SENDER
                .parse::<Address>()
                .map_err(anyhow::Error::msg)?,
        };
        debug!(%sender, "Using in-memory chain");
        return Ok(Arc::new(MockChain::new(config.network.chain_id, sender)));
    }

    let signer = LocalSigner::from_hex(&config.sender.resolve_key()?)?;
    let client = JsonRpcClient::new(
        &config.network.url,
        signer,
        config.network.chain_id,
        config.network.gas_limit,
        config.network.request_timeout(),
    )
    .context("Failed to build JSON-RPC client")?;
    Ok(Arc::new(client))
}

/// Orchestrator over `client` with artifacts read from `contracts_dir`.
/// Real runs check the endpoint serves the configured chain first.
pub async fn orchestrator(
    config: OrchestratorConfig,
    client: Arc<dyn ChainClient>,
    dry_run: bool,
) -> Result<Orchestrator> {
    let artifacts = Arc::new(HardhatArtifacts::new(config.artifacts.contracts_dir.clone()));
    let orchestrator = Orchestrator::new(config, client, artifacts);
    if !dry_run {
        orchestrator.check_network().await?;
    }
    Ok(orchestrator)
}

pub fn print_target(config: &OrchestratorConfig, sender: Address, dry_run: bool) {
    if dry_run {
        print_key_value_colored("Network", "in-memory (dry run)", colors::YELLOW);
    } else {
        print_key_value("Network", &config.network.url);
    }
    print_key_value("Chain ID", &config.network.chain_id.to_string());
    print_key_value("Sender", &sender.to_checksum());
    print_key_value("Output", &config.artifacts.output_dir.display().to_string());
}
