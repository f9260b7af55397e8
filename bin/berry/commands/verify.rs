//! Verify command - run the verification workflow against the recorded deployment

use super::{connect, load_config, load_manifest, orchestrator, print_target};
use crate::style::*;
use crate::Cli;
use anyhow::Result;
use berry_deploy::verify::validate_steps;
use berry_deploy::StepOutcome;

/// Returns whether every step passed or was skipped
pub async fn run(cli: &Cli, dry_run: bool) -> Result<bool> {
    print_header("Verify");

    let config = load_config(cli, dry_run)?;
    let manifest = load_manifest(cli)?;
    validate_steps(&manifest.steps)?;

    let client = connect(&config, dry_run)?;
    print_target(&config, client.sender(), dry_run);
    let orchestrator = orchestrator(config, client, dry_run).await?;

    let report = orchestrator.verify_recorded(&manifest.steps).await?;

    println!();
    println!("{}", report.render_table());
    println!();
    print_key_value_colored(
        "Succeeded",
        &report.count(StepOutcome::Success).to_string(),
        colors::GREEN,
    );
    print_key_value_colored(
        "Skipped",
        &report.count(StepOutcome::Skipped).to_string(),
        colors::YELLOW,
    );
    print_key_value_colored(
        "Failed",
        &report.failed_count().to_string(),
        colors::RED,
    );
    print_key_value(
        "Report",
        &orchestrator.writer().report_path().display().to_string(),
    );
    println!();

    if report.passed() {
        print_success("Verification passed");
    } else {
        print_error(&format!(
            "{} of {} steps failed",
            report.failed_count(),
            report.results.len()
        ));
    }
    Ok(report.passed())
}
