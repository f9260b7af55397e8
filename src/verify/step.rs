//! Verification step model: action, precondition, idempotency class

use crate::abi::parse_amount;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::plan::Argument;
use crate::retry::RetryPolicy;
use crate::types::{TxHash, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Whether a step may safely run again on a later invocation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyClass {
    /// Skipped whenever its precondition already holds
    #[default]
    Guarded,
    /// Executes on every run
    Repeatable,
    /// Executes until a report for the same deployment records it as done
    Once,
}

/// The call a step makes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// State-changing call through the sender queue
    Transact {
        contract: String,
        function: String,
        #[serde(default)]
        args: Vec<Argument>,
        /// Native value, e.g. `"1 ether"`
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        gas_limit: Option<u64>,
    },
    /// Read-only probe; decoded output is recorded in the result
    Read {
        contract: String,
        function: String,
        #[serde(default)]
        args: Vec<Argument>,
    },
}

impl StepAction {
    pub fn contract(&self) -> &str {
        match self {
            StepAction::Transact { contract, .. } | StepAction::Read { contract, .. } => contract,
        }
    }

    pub fn function(&self) -> &str {
        match self {
            StepAction::Transact { function, .. } | StepAction::Read { function, .. } => function,
        }
    }

    pub fn args(&self) -> &[Argument] {
        match self {
            StepAction::Transact { args, .. } | StepAction::Read { args, .. } => args,
        }
    }

    pub fn is_transact(&self) -> bool {
        matches!(self, StepAction::Transact { .. })
    }

    /// Native value to attach, parsed
    pub fn value(&self) -> OrchestratorResult<U256> {
        match self {
            StepAction::Transact {
                value: Some(value), ..
            } => parse_amount(value)
                .map_err(|e| OrchestratorError::Configuration(format!("step value: {}", e))),
            _ => Ok(U256::zero()),
        }
    }
}

/// Expected state that makes a step unnecessary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Numbers compare numerically (amount strings allowed), strings
    /// case-insensitively, anything else structurally
    Equals(Value),
    /// Unsigned amount, e.g. `"1000 ether"`
    AtLeast(String),
    /// Not zero, false, empty, or the zero address
    NonZero,
}

fn as_amount(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => parse_amount(s).ok(),
        _ => None,
    }
}

impl Expectation {
    pub fn matches(&self, actual: &Value) -> Result<bool, String> {
        match self {
            Expectation::Equals(expected) => Ok(match (as_amount(actual), as_amount(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => match (actual, expected) {
                    (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
                    _ => actual == expected,
                },
            }),
            Expectation::AtLeast(min) => {
                let min = parse_amount(min)?;
                let actual = as_amount(actual)
                    .ok_or_else(|| format!("{} is not an unsigned amount", actual))?;
                Ok(actual >= min)
            }
            Expectation::NonZero => Ok(match actual {
                Value::Bool(b) => *b,
                Value::Null => false,
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
                other => match as_amount(other) {
                    Some(n) => !n.is_zero(),
                    None => other.as_str().map(|s| !s.is_empty()).unwrap_or(true),
                },
            }),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Equals(v) => write!(f, "== {}", v),
            Expectation::AtLeast(min) => write!(f, ">= {}", min),
            Expectation::NonZero => write!(f, "!= 0"),
        }
    }
}

/// Read-only state check evaluated before a step runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    pub contract: String,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Argument>,
    /// Dotted path into the decoded output, e.g. `isRegistered` or `0.role`
    #[serde(default)]
    pub field: Option<String>,
    pub expect: Expectation,
}

impl Precondition {
    pub fn describe(&self) -> String {
        match &self.field {
            Some(field) => format!("{}.{}().{}", self.contract, self.function, field),
            None => format!("{}.{}()", self.contract, self.function),
        }
    }

    /// Pick the checked value out of decoded outputs. A single output is the
    /// root; several outputs form an array.
    pub fn select(&self, outputs: Vec<Value>) -> Result<Value, String> {
        let root = if outputs.len() == 1 {
            outputs.into_iter().next().unwrap_or(Value::Null)
        } else {
            Value::Array(outputs)
        };
        let Some(path) = &self.field else {
            return Ok(root);
        };
        path.split('.')
            .try_fold(&root, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned()
            .ok_or_else(|| format!("output of {} has no field '{}'", self.describe(), path))
    }
}

/// One scripted probe against the deployed system
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationStep {
    pub label: String,
    #[serde(default)]
    pub idempotency: IdempotencyClass,
    #[serde(default)]
    pub precondition: Option<Precondition>,
    pub action: StepAction,
    /// Overrides the runner's default policy
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl VerificationStep {
    pub fn new(label: &str, action: StepAction) -> Self {
        Self {
            label: label.to_string(),
            idempotency: IdempotencyClass::Guarded,
            precondition: None,
            action,
            retry: None,
        }
    }

    pub fn guarded_by(mut self, precondition: Precondition) -> Self {
        self.idempotency = IdempotencyClass::Guarded;
        self.precondition = Some(precondition);
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.idempotency = IdempotencyClass::Repeatable;
        self
    }

    pub fn once(mut self) -> Self {
        self.idempotency = IdempotencyClass::Once;
        self
    }
}

/// Reject step lists whose re-run behaviour would be ambiguous
pub fn validate_steps(steps: &[VerificationStep]) -> OrchestratorResult<()> {
    let mut labels = HashSet::new();
    for step in steps {
        if step.label.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "verification step with an empty label".to_string(),
            ));
        }
        if !labels.insert(step.label.as_str()) {
            return Err(OrchestratorError::Configuration(format!(
                "duplicate verification step label '{}'",
                step.label
            )));
        }
        match (step.idempotency, &step.precondition) {
            (IdempotencyClass::Guarded, None) if step.action.is_transact() => {
                return Err(OrchestratorError::Configuration(format!(
                    "step '{}' is guarded but has no precondition",
                    step.label
                )))
            }
            (IdempotencyClass::Repeatable, Some(_)) => {
                return Err(OrchestratorError::Configuration(format!(
                    "step '{}' is repeatable and cannot have a precondition",
                    step.label
                )))
            }
            _ => {}
        }
        if let Some(Precondition {
            expect: Expectation::AtLeast(min),
            ..
        }) = &step.precondition
        {
            parse_amount(min).map_err(|e| {
                OrchestratorError::Configuration(format!("step '{}': {}", step.label, e))
            })?;
        }
        step.action
            .value()
            .map_err(|e| OrchestratorError::Configuration(format!("step '{}': {}", step.label, e)))?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Success => write!(f, "success"),
            StepOutcome::Skipped => write!(f, "skipped"),
            StepOutcome::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PreconditionSatisfied,
    AlreadyExecuted,
}

/// Outcome of one step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub label: String,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// `Kind: detail` when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<TxHash>,
    /// Observed value: precondition reading or decoded read output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl StepResult {
    pub fn success(label: &str, transaction_hash: Option<TxHash>, detail: Option<Value>) -> Self {
        Self {
            label: label.to_string(),
            outcome: StepOutcome::Success,
            skip_reason: None,
            error: None,
            transaction_hash,
            detail,
        }
    }

    pub fn skipped(label: &str, reason: SkipReason, detail: Option<Value>) -> Self {
        Self {
            label: label.to_string(),
            outcome: StepOutcome::Skipped,
            skip_reason: Some(reason),
            error: None,
            transaction_hash: None,
            detail,
        }
    }

    pub fn failed(label: &str, error: &OrchestratorError) -> Self {
        Self {
            label: label.to_string(),
            outcome: StepOutcome::Failed,
            skip_reason: None,
            error: Some(format!("{}: {}", error.kind(), error)),
            transaction_hash: None,
            detail: None,
        }
    }

    /// The step's effect is known to be in place
    pub fn is_done(&self) -> bool {
        match self.outcome {
            StepOutcome::Success => true,
            StepOutcome::Skipped => self.skip_reason == Some(SkipReason::AlreadyExecuted),
            StepOutcome::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transact(contract: &str, function: &str) -> StepAction {
        StepAction::Transact {
            contract: contract.to_string(),
            function: function.to_string(),
            args: Vec::new(),
            value: None,
            gas_limit: None,
        }
    }

    fn precondition(expect: Expectation) -> Precondition {
        Precondition {
            contract: "MockToken".to_string(),
            function: "allowance".to_string(),
            args: Vec::new(),
            field: None,
            expect,
        }
    }

    #[test]
    fn test_expectations() {
        let at_least = Expectation::AtLeast("1000 ether".to_string());
        assert!(at_least.matches(&json!("1000000000000000000000")).unwrap());
        assert!(!at_least.matches(&json!("999")).unwrap());
        assert!(at_least.matches(&json!(true)).is_err());

        let equals = Expectation::Equals(json!(true));
        assert!(equals.matches(&json!(true)).unwrap());
        assert!(!equals.matches(&json!(false)).unwrap());

        let address = Expectation::Equals(json!("0xABCDEF0000000000000000000000000000000001"));
        assert!(address
            .matches(&json!("0xabcdef0000000000000000000000000000000001"))
            .unwrap());

        assert!(Expectation::NonZero.matches(&json!("5")).unwrap());
        assert!(!Expectation::NonZero.matches(&json!("0")).unwrap());
        assert!(!Expectation::NonZero
            .matches(&json!("0x0000000000000000000000000000000000000000"))
            .unwrap());
    }

    #[test]
    fn test_select_field_path() {
        let mut pre = precondition(Expectation::NonZero);
        pre.field = Some("isRegistered".to_string());
        let selected = pre
            .select(vec![json!({ "role": "0", "isRegistered": true })])
            .unwrap();
        assert_eq!(selected, json!(true));

        pre.field = Some("1".to_string());
        assert_eq!(pre.select(vec![json!("a"), json!("b")]).unwrap(), json!("b"));

        pre.field = Some("missing".to_string());
        assert!(pre.select(vec![json!({})]).is_err());
    }

    #[test]
    fn test_step_manifest_syntax() {
        let step: VerificationStep = toml::from_str(
            r#"
            label = "approve-stake"
            idempotency = "guarded"

            [action]
            kind = "transact"
            contract = "MockToken"
            function = "approve"
            args = [{ ref = "SupplyChainManager" }, "1000 ether"]

            [precondition]
            contract = "MockToken"
            function = "allowance"
            args = [{ context = "sender" }, { ref = "SupplyChainManager" }]
            expect = { at_least = "1000 ether" }
            "#,
        )
        .unwrap();
        assert_eq!(step.idempotency, IdempotencyClass::Guarded);
        assert_eq!(step.action.contract(), "MockToken");
        assert_eq!(step.action.args()[0], Argument::reference("SupplyChainManager"));
        assert_eq!(step.action.args()[1], Argument::literal("1000 ether"));
        assert_eq!(
            step.precondition.unwrap().expect,
            Expectation::AtLeast("1000 ether".to_string())
        );
    }

    #[test]
    fn test_validation_rules() {
        let unguarded = VerificationStep::new("register", transact("SCM", "register"));
        assert_eq!(
            validate_steps(&[unguarded]).unwrap_err().kind(),
            "ConfigurationError"
        );

        let repeatable_with_guard = VerificationStep::new("ship", transact("SCM", "ship"))
            .guarded_by(precondition(Expectation::NonZero))
            .repeatable();
        assert!(validate_steps(&[repeatable_with_guard]).is_err());

        let a = VerificationStep::new("same", transact("SCM", "a")).repeatable();
        let b = VerificationStep::new("same", transact("SCM", "b")).repeatable();
        assert!(validate_steps(&[a, b])
            .unwrap_err()
            .to_string()
            .contains("duplicate"));

        let read = VerificationStep::new(
            "probe",
            StepAction::Read {
                contract: "SCM".to_string(),
                function: "getParticipant".to_string(),
                args: Vec::new(),
            },
        );
        assert!(validate_steps(&[read]).is_ok());
    }

    #[test]
    fn test_result_serialization() {
        let result = StepResult::skipped("approve-stake", SkipReason::PreconditionSatisfied, None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["skip_reason"], "precondition_satisfied");
        assert!(json.get("error").is_none());
        assert!(!result.is_done());
    }
}
