//! Late binding of cross-references once every unit has an address

use crate::abi::InterfaceSet;
use crate::chain::TransactionRequest;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::{LateBinding, ResolveContext};
use crate::registry::AddressRegistry;
use crate::retry::RetryPolicy;
use crate::sender::SenderQueue;
use crate::types::TxHash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A binding confirmed on-chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedBinding {
    pub label: String,
    pub transaction_hash: TxHash,
}

/// Applies late bindings in declaration order and remembers, for the
/// lifetime of the coordinator, which ones are already in place.
pub struct WiringCoordinator {
    queue: Arc<SenderQueue>,
    policy: RetryPolicy,
    timeout: Duration,
    applied: HashMap<String, TxHash>,
}

/// Identity of a binding across phase retries
fn binding_key(binding: &LateBinding) -> String {
    serde_json::to_string(binding).unwrap_or_else(|_| binding.label())
}

impl WiringCoordinator {
    pub fn new(queue: Arc<SenderQueue>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            queue,
            policy,
            timeout,
            applied: HashMap::new(),
        }
    }

    pub fn is_applied(&self, binding: &LateBinding) -> bool {
        self.applied.contains_key(&binding_key(binding))
    }

    /// Apply every binding not applied yet. A failure stops the pass;
    /// bindings applied before it stay applied.
    pub async fn apply_bindings(
        &mut self,
        bindings: &[LateBinding],
        registry: &AddressRegistry,
        interfaces: &InterfaceSet,
    ) -> OrchestratorResult<Vec<AppliedBinding>> {
        let resolve = ResolveContext::new(registry, self.queue.sender());
        let mut applied = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let label = binding.label();
            let key = binding_key(binding);
            if let Some(hash) = self.applied.get(&key) {
                info!(binding = %label, "Already applied, skipping");
                applied.push(AppliedBinding {
                    label,
                    transaction_hash: *hash,
                });
                continue;
            }

            let target = registry.get(&binding.target)?;
            let interface = interfaces.get(&binding.target).ok_or_else(|| {
                OrchestratorError::UnresolvedReference(format!("{} interface", binding.target))
            })?;
            let function = interface.function(&binding.function, binding.args.len())?;
            let data = function.encode_call(&resolve.resolve_all(&binding.args)?)?;

            let receipt = self
                .queue
                .submit(
                    &label,
                    &TransactionRequest::call(target, data),
                    &self.policy,
                    self.timeout,
                )
                .await?;
            info!(binding = %label, hash = %receipt.transaction_hash, "Binding applied");
            self.applied.insert(key, receipt.transaction_hash);
            applied.push(AppliedBinding {
                label,
                transaction_hash: receipt.transaction_hash,
            });
        }
        Ok(applied)
    }

    /// Run the wiring phase, re-entering it after a network failure or
    /// timeout up to `phase_attempts` times in total. Reverts and every
    /// other error end the phase immediately.
    pub async fn run_phase(
        &mut self,
        bindings: &[LateBinding],
        registry: &AddressRegistry,
        interfaces: &InterfaceSet,
        phase_attempts: u32,
    ) -> OrchestratorResult<Vec<AppliedBinding>> {
        let phase_attempts = phase_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.apply_bindings(bindings, registry, interfaces).await {
                Ok(applied) => return Ok(applied),
                Err(e @ (OrchestratorError::Network { .. } | OrchestratorError::Timeout { .. }))
                    if attempt < phase_attempts =>
                {
                    warn!(
                        attempt,
                        phase_attempts,
                        applied = self.applied.len(),
                        "Wiring phase interrupted, re-entering: {}",
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{AbiItem, AbiParam, InterfaceDescriptor};
    use crate::chain::MockChain;
    use crate::plan::Argument;
    use crate::types::Address;

    fn address(byte: u8) -> Address {
        Address::from_slice(&[byte; 20]).unwrap()
    }

    fn setter(name: &str) -> AbiItem {
        AbiItem::function(name, vec![AbiParam::new("target", "address")], vec![])
    }

    fn fixture() -> (AddressRegistry, InterfaceSet, Vec<LateBinding>) {
        let mut registry = AddressRegistry::new();
        registry.set("SupplyChainManager", address(0x10)).unwrap();
        registry.set("PaymentHandler", address(0x20)).unwrap();
        registry.set("QualityControl", address(0x30)).unwrap();

        let mut interfaces = InterfaceSet::new();
        interfaces.insert(
            "PaymentHandler".to_string(),
            InterfaceDescriptor::new("PaymentHandler", vec![setter("setSupplyChainManager")]),
        );
        interfaces.insert(
            "QualityControl".to_string(),
            InterfaceDescriptor::new("QualityControl", vec![setter("setSupplyChainManager")]),
        );

        let bindings = vec![
            LateBinding::new(
                "PaymentHandler",
                "setSupplyChainManager",
                vec![Argument::reference("SupplyChainManager")],
            ),
            LateBinding::new(
                "QualityControl",
                "setSupplyChainManager",
                vec![Argument::reference("SupplyChainManager")],
            ),
        ];
        (registry, interfaces, bindings)
    }

    fn coordinator(chain: &Arc<MockChain>) -> WiringCoordinator {
        let queue = Arc::new(SenderQueue::new(chain.clone(), Duration::from_millis(10)));
        WiringCoordinator::new(queue, RetryPolicy::none(), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_bindings_applied_in_declaration_order() {
        let chain = Arc::new(MockChain::new(31337, address(1)));
        let (registry, interfaces, bindings) = fixture();

        let applied = coordinator(&chain)
            .apply_bindings(&bindings, &registry, &interfaces)
            .await
            .unwrap();

        assert_eq!(applied.len(), 2);
        assert_eq!(
            applied[0].label,
            "PaymentHandler.setSupplyChainManager(SupplyChainManager)"
        );
        let targets: Vec<Option<Address>> = chain.sent().iter().map(|tx| tx.request.to).collect();
        assert_eq!(targets, vec![Some(address(0x20)), Some(address(0x30))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_retry_skips_applied_bindings() {
        let chain = Arc::new(MockChain::new(31337, address(1)));
        let quality_control = address(0x30);
        chain.fail_sends_matching(1, move |req| req.to == Some(quality_control));
        let (registry, interfaces, bindings) = fixture();
        let mut coordinator = coordinator(&chain);

        let applied = coordinator
            .run_phase(&bindings, &registry, &interfaces, 2)
            .await
            .unwrap();

        assert_eq!(applied.len(), 2);
        // PaymentHandler once, QualityControl failed once then succeeded
        assert_eq!(chain.sent().len(), 2);
        assert_eq!(chain.send_attempts(), 3);
        assert!(bindings.iter().all(|b| coordinator.is_applied(b)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_fatal_without_rollback() {
        let chain = Arc::new(MockChain::new(31337, address(1)));
        chain.on_transact("setSupplyChainManager(address)", |state, invocation| {
            if state.flag("locked") {
                return Err(format!("{} is locked", invocation.to));
            }
            state.set("locked", true);
            Ok(())
        });
        let (registry, interfaces, bindings) = fixture();
        let mut coordinator = coordinator(&chain);

        let err = coordinator
            .run_phase(&bindings, &registry, &interfaces, 3)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "RevertError");
        assert_eq!(
            err.subject(),
            Some("QualityControl.setSupplyChainManager(SupplyChainManager)")
        );
        assert!(coordinator.is_applied(&bindings[0]));
        assert!(!coordinator.is_applied(&bindings[1]));
        assert_eq!(chain.send_attempts(), 2);
    }
}
