//! Deploy command - deploy every unit, wire late bindings, record artifacts

use super::{connect, load_config, load_manifest, orchestrator, print_target};
use crate::style::*;
use crate::Cli;
use anyhow::Result;
use berry_deploy::types::format_ether;

pub async fn run(cli: &Cli, dry_run: bool) -> Result<bool> {
    print_header("Deploy");

    // Everything that can fail without the network fails here
    let config = load_config(cli, dry_run)?;
    let manifest = load_manifest(cli)?;
    let plan = manifest.deployment_plan()?;

    let client = connect(&config, dry_run)?;
    let sender = client.sender();
    print_target(&config, sender, dry_run);
    let orchestrator = orchestrator(config, client, dry_run).await?;

    if let Ok(balance) = orchestrator.client().balance(sender).await {
        print_key_value("Balance", &format!("{} ETH", format_ether(balance)));
    }

    print_section("Order");
    for (i, unit) in plan.units.iter().enumerate() {
        print_step(i + 1, plan.units.len(), &unit.name);
    }

    let outcome = orchestrator.deploy(&plan).await?;
    orchestrator.record_deployment(&outcome)?;

    print_section("Deployed");
    for component in &outcome.components {
        print_key_value(&component.name, &component.address.to_checksum());
    }

    if !outcome.bindings.is_empty() {
        print_section("Bindings");
        for binding in &outcome.bindings {
            println!(
                "  {} {} {}",
                icon_success(),
                binding.label,
                style_dim(&binding.transaction_hash.to_string())
            );
        }
    }

    println!();
    print_success(&format!(
        "{} units deployed, addresses written to {}",
        outcome.components.len(),
        orchestrator.writer().addresses_path().display()
    ));
    if dry_run {
        print_warning("Dry run: nothing was sent to the network");
    }
    Ok(true)
}
