//! Runs verification steps in declared order against a live deployment

use super::report::VerificationReport;
use super::step::{
    validate_steps, IdempotencyClass, Precondition, SkipReason, StepAction, StepResult,
    VerificationStep,
};
use crate::abi::{AbiItem, InterfaceSet};
use crate::chain::TransactionRequest;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::{Argument, ResolveContext};
use crate::registry::AddressRegistry;
use crate::retry::RetryPolicy;
use crate::sender::SenderQueue;
use crate::types::Address;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What the steps run against
pub struct RunContext<'a> {
    pub registry: &'a AddressRegistry,
    pub interfaces: &'a InterfaceSet,
    /// Report of an earlier run; consulted only if it covers the same
    /// deployment
    pub previous: Option<&'a VerificationReport>,
}

impl<'a> RunContext<'a> {
    pub fn new(registry: &'a AddressRegistry, interfaces: &'a InterfaceSet) -> Self {
        Self {
            registry,
            interfaces,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: Option<&'a VerificationReport>) -> Self {
        let registry = self.registry;
        self.previous = previous.filter(|report| report.covers(registry));
        self
    }

    fn already_executed(&self, label: &str) -> bool {
        self.previous
            .map(|report| report.succeeded(label))
            .unwrap_or(false)
    }
}

/// A call resolved against the deployment
struct BoundCall<'a> {
    to: Address,
    function: &'a AbiItem,
    data: Vec<u8>,
}

pub struct VerificationRunner {
    queue: Arc<SenderQueue>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl VerificationRunner {
    pub fn new(queue: Arc<SenderQueue>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            queue,
            policy,
            timeout,
        }
    }

    /// Run every step in order. A failing step is recorded and the run moves
    /// on; only an invalid step list aborts, before anything is sent.
    pub async fn run(
        &self,
        steps: &[VerificationStep],
        ctx: &RunContext<'_>,
    ) -> OrchestratorResult<Vec<StepResult>> {
        self.run_with(steps, ctx, |_| Ok(())).await
    }

    /// Like [`run`](Self::run), handing each result to `checkpoint` as soon
    /// as the step finishes. A checkpoint error stops the run.
    pub async fn run_with<F>(
        &self,
        steps: &[VerificationStep],
        ctx: &RunContext<'_>,
        mut checkpoint: F,
    ) -> OrchestratorResult<Vec<StepResult>>
    where
        F: FnMut(&StepResult) -> OrchestratorResult<()>,
    {
        validate_steps(steps)?;

        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            info!(step = %step.label, "Verification step {}/{}", index + 1, steps.len());
            let result = match self.run_step(step, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(step = %step.label, kind = e.kind(), "step failed: {}", e);
                    StepResult::failed(&step.label, &e)
                }
            };
            info!(step = %result.label, outcome = %result.outcome, "step finished");
            checkpoint(&result)?;
            results.push(result);
        }
        Ok(results)
    }

    async fn run_step(
        &self,
        step: &VerificationStep,
        ctx: &RunContext<'_>,
    ) -> OrchestratorResult<StepResult> {
        let policy = step.retry.as_ref().unwrap_or(&self.policy);
        let resolve = ResolveContext::new(ctx.registry, self.queue.sender());

        if step.idempotency == IdempotencyClass::Once && ctx.already_executed(&step.label) {
            return Ok(StepResult::skipped(
                &step.label,
                SkipReason::AlreadyExecuted,
                None,
            ));
        }

        if let Some(precondition) = &step.precondition {
            let observed = self
                .check_precondition(&step.label, precondition, ctx, &resolve, policy)
                .await?;
            if let Some(observed) = observed {
                return Ok(StepResult::skipped(
                    &step.label,
                    SkipReason::PreconditionSatisfied,
                    Some(observed),
                ));
            }
        }

        match &step.action {
            StepAction::Transact { gas_limit, .. } => {
                let call = bind(
                    ctx,
                    &resolve,
                    step.action.contract(),
                    step.action.function(),
                    step.action.args(),
                )?;
                let request = TransactionRequest::call(call.to, call.data)
                    .with_value(step.action.value()?)
                    .with_gas_limit(*gas_limit);
                let receipt = self
                    .queue
                    .submit(&step.label, &request, policy, self.timeout)
                    .await?;
                Ok(StepResult::success(
                    &step.label,
                    Some(receipt.transaction_hash),
                    None,
                ))
            }
            StepAction::Read { .. } => {
                let call = bind(
                    ctx,
                    &resolve,
                    step.action.contract(),
                    step.action.function(),
                    step.action.args(),
                )?;
                let output = self
                    .queue
                    .read(&step.label, call.to, &call.data, policy)
                    .await?;
                let decoded = call.function.decode_output(&output)?;
                Ok(StepResult::success(
                    &step.label,
                    None,
                    Some(single_or_array(decoded)),
                ))
            }
        }
    }

    /// `Some(observed value)` when the precondition already holds
    async fn check_precondition(
        &self,
        label: &str,
        precondition: &Precondition,
        ctx: &RunContext<'_>,
        resolve: &ResolveContext<'_>,
        policy: &RetryPolicy,
    ) -> OrchestratorResult<Option<Value>> {
        let call = bind(
            ctx,
            resolve,
            &precondition.contract,
            &precondition.function,
            &precondition.args,
        )?;
        let output = self.queue.read(label, call.to, &call.data, policy).await?;
        let decoded = call.function.decode_output(&output)?;
        let observed = precondition
            .select(decoded)
            .map_err(OrchestratorError::Abi)?;
        let satisfied = precondition
            .expect
            .matches(&observed)
            .map_err(|e| OrchestratorError::Abi(format!("{}: {}", precondition.describe(), e)))?;

        info!(
            step = label,
            check = %precondition.describe(),
            observed = %observed,
            expected = %precondition.expect,
            satisfied,
            "precondition evaluated"
        );
        Ok(satisfied.then(|| json!({ precondition.describe(): observed })))
    }
}

fn bind<'a>(
    ctx: &RunContext<'a>,
    resolve: &ResolveContext<'_>,
    contract: &str,
    function: &str,
    args: &[Argument],
) -> OrchestratorResult<BoundCall<'a>> {
    let to = ctx.registry.get(contract)?;
    let interface = ctx
        .interfaces
        .get(contract)
        .ok_or_else(|| OrchestratorError::UnresolvedReference(format!("{} interface", contract)))?;
    let function = interface.function(function, args.len())?;
    let values = resolve.resolve_all(args)?;
    let data = function.encode_call(&values)?;
    Ok(BoundCall { to, function, data })
}

fn single_or_array(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{encode, AbiParam, InterfaceDescriptor, Token};
    use crate::chain::MockChain;
    use crate::verify::step::{Expectation, StepOutcome};

    const SCM: u8 = 0x20;
    const TOKEN: u8 = 0x10;

    fn address(byte: u8) -> Address {
        Address::from_slice(&[byte; 20]).unwrap()
    }

    fn interfaces() -> InterfaceSet {
        let mut set = InterfaceSet::new();
        set.insert(
            "MockToken".to_string(),
            InterfaceDescriptor::new(
                "MockToken",
                vec![AbiItem::function(
                    "approve",
                    vec![AbiParam::new("spender", "address"), AbiParam::new("amount", "uint256")],
                    vec![AbiParam::new("", "bool")],
                )],
            ),
        );
        set.insert(
            "SupplyChainManager".to_string(),
            InterfaceDescriptor::new(
                "SupplyChainManager",
                vec![
                    AbiItem::function("register", vec![], vec![]),
                    AbiItem::function("isRegistered", vec![], vec![AbiParam::new("", "bool")])
                        .view(),
                ],
            ),
        );
        set
    }

    fn registry() -> AddressRegistry {
        let mut registry = AddressRegistry::new();
        registry.set("MockToken", address(TOKEN)).unwrap();
        registry.set("SupplyChainManager", address(SCM)).unwrap();
        registry
    }

    fn chain() -> Arc<MockChain> {
        let chain = Arc::new(MockChain::new(31337, address(1)));
        chain.on_transact("register()", |state, _| {
            if state.flag("registered") {
                return Err("Participant already registered".to_string());
            }
            state.set("registered", true);
            Ok(())
        });
        chain.on_call("isRegistered()", |state, _| {
            encode(&[Token::Bool(state.flag("registered"))])
        });
        chain
    }

    fn runner(chain: &Arc<MockChain>) -> VerificationRunner {
        let queue = Arc::new(SenderQueue::new(chain.clone(), Duration::from_millis(10)));
        VerificationRunner::new(queue, RetryPolicy::none(), Duration::from_secs(5))
    }

    fn register_step() -> VerificationStep {
        VerificationStep::new(
            "register",
            StepAction::Transact {
                contract: "SupplyChainManager".to_string(),
                function: "register".to_string(),
                args: vec![],
                value: None,
                gas_limit: Some(500_000),
            },
        )
        .guarded_by(Precondition {
            contract: "SupplyChainManager".to_string(),
            function: "isRegistered".to_string(),
            args: vec![],
            field: None,
            expect: Expectation::Equals(json!(true)),
        })
    }

    fn unguarded_register() -> VerificationStep {
        let mut step = register_step().repeatable();
        step.label = "register-again".to_string();
        step.precondition = None;
        step
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_step_skipped_once_satisfied() {
        let chain = chain();
        let runner = runner(&chain);
        let (registry, interfaces) = (registry(), interfaces());
        let ctx = RunContext::new(&registry, &interfaces);

        let first = runner.run(&[register_step()], &ctx).await.unwrap();
        assert_eq!(first[0].outcome, StepOutcome::Success);
        assert!(first[0].transaction_hash.is_some());

        let second = runner.run(&[register_step()], &ctx).await.unwrap();
        assert_eq!(second[0].outcome, StepOutcome::Skipped);
        assert_eq!(second[0].skip_reason, Some(SkipReason::PreconditionSatisfied));
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_recorded_and_run_continues() {
        let chain = chain();
        let runner = runner(&chain);
        let (registry, interfaces) = (registry(), interfaces());
        let ctx = RunContext::new(&registry, &interfaces);

        let steps = vec![register_step(), unguarded_register(), register_step()];
        let results = runner.run(&steps, &ctx).await;
        // Duplicate label "register" is rejected before anything runs
        assert_eq!(results.unwrap_err().kind(), "ConfigurationError");
        assert!(chain.sent().is_empty());

        let mut probe = register_step();
        probe.label = "register-check".to_string();
        let steps = vec![register_step(), unguarded_register(), probe];
        let results = runner.run(&steps, &ctx).await.unwrap();

        let outcomes: Vec<StepOutcome> = results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![StepOutcome::Success, StepOutcome::Failed, StepOutcome::Skipped]
        );
        let error = results[1].error.as_deref().unwrap();
        assert!(error.starts_with("RevertError"));
        assert!(error.contains("Participant already registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_contract_fails_step_only() {
        let chain = chain();
        let runner = runner(&chain);
        let (registry, interfaces) = (registry(), interfaces());
        let ctx = RunContext::new(&registry, &interfaces);

        let missing = VerificationStep::new(
            "probe-missing",
            StepAction::Read {
                contract: "PaymentHandler".to_string(),
                function: "owner".to_string(),
                args: vec![],
            },
        );
        let probe = VerificationStep::new(
            "probe",
            StepAction::Read {
                contract: "SupplyChainManager".to_string(),
                function: "isRegistered".to_string(),
                args: vec![],
            },
        );
        let results = runner.run(&[missing, probe], &ctx).await.unwrap();
        assert_eq!(results[0].outcome, StepOutcome::Failed);
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("UnresolvedReferenceError"));
        assert_eq!(results[1].outcome, StepOutcome::Success);
        assert_eq!(results[1].detail, Some(json!(false)));
    }
}
