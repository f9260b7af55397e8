//! Component deployment
//!
//! Deploys one unit at a time: resolve constructor arguments against the
//! registry, encode them against the contract ABI, submit the creation
//! transaction through the sender queue and register the resulting address.

use crate::abi::InterfaceDescriptor;
use crate::artifacts::ArtifactSource;
use crate::chain::TransactionRequest;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::{DeploymentUnit, ResolveContext};
use crate::registry::AddressRegistry;
use crate::retry::RetryPolicy;
use crate::sender::SenderQueue;
use crate::types::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// A unit after successful deployment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeployedComponent {
    pub name: String,
    pub address: Address,
    pub interface: InterfaceDescriptor,
    pub transaction_hash: TxHash,
}

pub struct ComponentDeployer {
    queue: Arc<SenderQueue>,
    artifacts: Arc<dyn ArtifactSource>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl ComponentDeployer {
    pub fn new(
        queue: Arc<SenderQueue>,
        artifacts: Arc<dyn ArtifactSource>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            artifacts,
            policy,
            timeout,
        }
    }

    /// Deploy `unit` and record its address. Fails before submitting if the
    /// name is already registered or an argument cannot be resolved.
    pub async fn deploy(
        &self,
        unit: &DeploymentUnit,
        registry: &mut AddressRegistry,
    ) -> OrchestratorResult<DeployedComponent> {
        if registry.contains(&unit.name) {
            return Err(OrchestratorError::DuplicateRegistration(unit.name.clone()));
        }

        let artifact = self.artifacts.load(unit.contract_name())?;
        if artifact.bytecode.0.is_empty() {
            return Err(OrchestratorError::Artifact(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                unit.contract_name()
            )));
        }
        let interface = artifact.interface();

        let args = ResolveContext::new(registry, self.queue.sender()).resolve_all(&unit.args)?;
        let mut code = artifact.bytecode.0;
        code.extend(interface.encode_constructor(&args)?);

        info!(unit = %unit.name, contract = %unit.contract_name(), "Deploying");
        let receipt = self
            .queue
            .submit(
                &unit.name,
                &TransactionRequest::deploy(code),
                &self.policy,
                self.timeout,
            )
            .await?;

        let address = receipt.contract_address.ok_or_else(|| OrchestratorError::Rejected {
            subject: unit.name.clone(),
            detail: format!(
                "receipt {} carries no contract address",
                receipt.transaction_hash
            ),
        })?;
        registry.set(&unit.name, address)?;
        info!(unit = %unit.name, %address, "Deployed");

        Ok(DeployedComponent {
            name: unit.name.clone(),
            address,
            interface,
            transaction_hash: receipt.transaction_hash,
        })
    }

    /// Deploy `units` in order, stopping at the first failure. Later units
    /// are abandoned without being submitted.
    pub async fn deploy_all(
        &self,
        units: &[DeploymentUnit],
        registry: &mut AddressRegistry,
    ) -> OrchestratorResult<Vec<DeployedComponent>> {
        let mut deployed = Vec::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            match self.deploy(unit, registry).await {
                Ok(component) => deployed.push(component),
                Err(e) => {
                    let abandoned: Vec<&str> =
                        units[index + 1..].iter().map(|u| u.name.as_str()).collect();
                    error!(
                        unit = %unit.name,
                        kind = e.kind(),
                        ?abandoned,
                        "Deployment failed: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(deployed)
    }
}
