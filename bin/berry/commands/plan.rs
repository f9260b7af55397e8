//! Plan command - show what deploy and verify would do, offline

use super::load_manifest;
use crate::style::*;
use crate::Cli;
use anyhow::Result;
use berry_deploy::verify::validate_steps;
use berry_deploy::{Argument, IdempotencyClass};

pub fn run(cli: &Cli) -> Result<()> {
    print_header("Plan");
    print_key_value("Manifest", &cli.plan.display().to_string());

    let manifest = load_manifest(cli)?;
    let plan = manifest.deployment_plan()?;
    validate_steps(&manifest.steps)?;

    print_section("Deployment order");
    for (i, unit) in plan.units.iter().enumerate() {
        let deps: Vec<&str> = unit.dependencies().collect();
        let detail = if deps.is_empty() {
            String::new()
        } else {
            style_dim(&format!("after {}", deps.join(", ")))
        };
        println!(
            "  {:>2}. {} {}",
            i + 1,
            style_bold(&unit.name),
            detail
        );
        if unit.contract_name() != unit.name {
            println!("      {}", style_dim(&format!("contract {}", unit.contract_name())));
        }
        for arg in &unit.args {
            println!("      {}", describe(arg));
        }
    }

    if !plan.bindings.is_empty() {
        print_section("Late bindings");
        for binding in &plan.bindings {
            println!("  {} {}", icon_arrow(), binding.label());
        }
    }

    if !manifest.steps.is_empty() {
        print_section("Verification steps");
        for step in &manifest.steps {
            let class = match step.idempotency {
                IdempotencyClass::Guarded => style_cyan("guarded"),
                IdempotencyClass::Repeatable => style_dim("repeatable"),
                IdempotencyClass::Once => style_bold("once"),
            };
            println!(
                "  {} {:<24} {:<12} {}.{}",
                icon_arrow(),
                step.label,
                class,
                step.action.contract(),
                step.action.function()
            );
            if let Some(pre) = &step.precondition {
                println!(
                    "      {}",
                    style_dim(&format!("skip when {} {}", pre.describe(), pre.expect))
                );
            }
        }
    }

    println!();
    print_info(&format!(
        "{} units, {} bindings, {} steps",
        plan.units.len(),
        plan.bindings.len(),
        manifest.steps.len()
    ));
    Ok(())
}

fn describe(arg: &Argument) -> String {
    match arg {
        Argument::Reference { unit } => format!("ref {}", unit),
        Argument::Context {
            context,
            offset_secs,
        } if *offset_secs != 0 => format!("{:?} {:+}s", context, offset_secs).to_lowercase(),
        Argument::Context { context, .. } => format!("{:?}", context).to_lowercase(),
        Argument::Literal(value) => value.to_string(),
    }
}
