//! End-to-end phases
//!
//! `deploy`: plan -> deploy units in order -> wire late bindings.
//! `verify`: run the verification steps against a recorded deployment.
//!
//! A deployment-phase failure aborts everything after it; nothing is written
//! to the artifact directory unless deployment and wiring both complete.

use crate::abi::InterfaceSet;
use crate::artifacts::{ArtifactSource, ArtifactWriter, ComponentInterfaceDocument};
use crate::chain::ChainClient;
use crate::config::OrchestratorConfig;
use crate::deployer::{ComponentDeployer, DeployedComponent};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::DeploymentPlan;
use crate::registry::AddressRegistry;
use crate::sender::SenderQueue;
use crate::verify::{RunContext, VerificationReport, VerificationRunner, VerificationStep};
use crate::wiring::{AppliedBinding, WiringCoordinator};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{error, info};

/// Everything a successful deployment produced
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub components: Vec<DeployedComponent>,
    pub registry: AddressRegistry,
    pub bindings: Vec<AppliedBinding>,
}

impl DeploymentOutcome {
    pub fn interfaces(&self) -> InterfaceSet {
        interfaces_of(&self.components)
    }

    pub fn interface_documents(
        &self,
        chain_id: u64,
    ) -> IndexMap<String, ComponentInterfaceDocument> {
        self.components
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ComponentInterfaceDocument {
                        contract_name: c.interface.contract_name.clone(),
                        address: c.address,
                        chain_id,
                        transaction_hash: Some(c.transaction_hash),
                        abi: c.interface.abi.clone(),
                    },
                )
            })
            .collect()
    }
}

fn interfaces_of(components: &[DeployedComponent]) -> InterfaceSet {
    components
        .iter()
        .map(|c| (c.name.clone(), c.interface.clone()))
        .collect()
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    queue: Arc<SenderQueue>,
    artifacts: Arc<dyn ArtifactSource>,
    writer: ArtifactWriter,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn ChainClient>,
        artifacts: Arc<dyn ArtifactSource>,
    ) -> Self {
        let queue = Arc::new(SenderQueue::new(client, config.network.poll_interval()));
        let writer = ArtifactWriter::new(config.artifacts.output_dir.clone());
        Self {
            config,
            queue,
            artifacts,
            writer,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        self.queue.client()
    }

    /// Refuse to run against a network other than the configured one
    pub async fn check_network(&self) -> OrchestratorResult<()> {
        let chain_id = self
            .client()
            .chain_id()
            .await
            .map_err(|e| OrchestratorError::from_chain("eth_chainId", e, 1))?;
        if chain_id != self.config.network.chain_id {
            return Err(OrchestratorError::Configuration(format!(
                "endpoint {} serves chain {}, expected {}",
                self.config.network.url, chain_id, self.config.network.chain_id
            )));
        }
        info!(chain_id, sender = %self.queue.sender(), "Connected");
        Ok(())
    }

    /// Deploy every unit, then wire the late bindings
    pub async fn deploy(&self, plan: &DeploymentPlan) -> OrchestratorResult<DeploymentOutcome> {
        let timeout = self.config.timeouts.deployment();
        let deployer = ComponentDeployer::new(
            self.queue.clone(),
            self.artifacts.clone(),
            self.config.retry.clone(),
            timeout,
        );

        let mut registry = AddressRegistry::new();
        let components = match deployer.deploy_all(&plan.units, &mut registry).await {
            Ok(components) => components,
            Err(e) => {
                log_partial(&registry);
                return Err(e);
            }
        };

        let mut wiring =
            WiringCoordinator::new(self.queue.clone(), self.config.retry.clone(), timeout);
        let interfaces = interfaces_of(&components);
        let bindings = match wiring
            .run_phase(
                &plan.bindings,
                &registry,
                &interfaces,
                self.config.wiring.phase_attempts,
            )
            .await
        {
            Ok(bindings) => bindings,
            Err(e) => {
                log_partial(&registry);
                return Err(e);
            }
        };

        info!(
            units = components.len(),
            bindings = bindings.len(),
            "Deployment complete"
        );
        Ok(DeploymentOutcome {
            components,
            registry,
            bindings,
        })
    }

    /// Persist interface documents, then addresses, of a completed
    /// deployment. The address map is written last and marks the record as
    /// complete.
    pub fn record_deployment(&self, outcome: &DeploymentOutcome) -> OrchestratorResult<()> {
        self.writer
            .write_interfaces(&outcome.interface_documents(self.config.network.chain_id))?;
        self.writer.write_addresses(&outcome.registry)?;
        Ok(())
    }

    /// Run `steps` against the given deployment
    pub async fn verify(
        &self,
        steps: &[VerificationStep],
        registry: &AddressRegistry,
        interfaces: &InterfaceSet,
        previous: Option<&VerificationReport>,
    ) -> OrchestratorResult<VerificationReport> {
        self.run_verification(steps, registry, interfaces, previous, false)
            .await
    }

    /// Load the recorded deployment, run `steps`, persist the report.
    ///
    /// The report is rewritten after every step, so an interrupted run
    /// still records which `once` steps took effect.
    pub async fn verify_recorded(
        &self,
        steps: &[VerificationStep],
    ) -> OrchestratorResult<VerificationReport> {
        let registry = self.writer.load_addresses()?;
        let interfaces = self.writer.load_interfaces()?;
        let previous = self.writer.load_report()?;

        let report = self
            .run_verification(steps, &registry, &interfaces, previous.as_ref(), true)
            .await?;
        self.writer.write_report(&report)?;
        Ok(report)
    }

    async fn run_verification(
        &self,
        steps: &[VerificationStep],
        registry: &AddressRegistry,
        interfaces: &InterfaceSet,
        previous: Option<&VerificationReport>,
        persist: bool,
    ) -> OrchestratorResult<VerificationReport> {
        let runner = VerificationRunner::new(
            self.queue.clone(),
            self.config.retry.clone(),
            self.config.timeouts.verification(),
        );
        let ctx = RunContext::new(registry, interfaces).with_previous(previous);

        let mut report = VerificationReport::begin(
            self.config.network.chain_id,
            self.queue.sender(),
            registry,
            previous,
        );
        runner
            .run_with(steps, &ctx, |result| {
                report.record(result.clone());
                if persist {
                    self.writer.checkpoint_report(&report)?;
                }
                Ok(())
            })
            .await?;
        report.finish();

        info!(
            passed = report.passed(),
            failed = report.failed_count(),
            "Verification finished"
        );
        Ok(report)
    }
}

fn log_partial(registry: &AddressRegistry) {
    for (name, address) in registry.iter() {
        error!(unit = name, %address, "Deployed before the failure, not recorded");
    }
}
