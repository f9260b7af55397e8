//! Deployment plan: units, late bindings, and the planner that orders them
//!
//! A plan manifest declares:
//! - `[[unit]]` deployable components with constructor arguments
//! - `[[binding]]` setter calls applied once every unit has an address
//! - `[[step]]` the verification workflow run against the live deployment
//!
//! The planner turns constructor references into a deterministic deployment
//! order and rejects cycles before anything touches the network.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::registry::AddressRegistry;
use crate::types::Address;
use crate::verify::VerificationStep;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Values known only at execution time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextValue {
    /// Address of the sending account
    Sender,
    /// Current unix time in seconds, plus `offset_secs`
    Timestamp,
}

/// One call or constructor argument
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Argument {
    /// Address of another unit: `{ ref = "MockToken" }`
    Reference {
        #[serde(rename = "ref")]
        unit: String,
    },
    /// Execution context value: `{ context = "timestamp", offset_secs = 86400 }`
    Context {
        context: ContextValue,
        #[serde(default)]
        offset_secs: i64,
    },
    /// Any JSON/TOML literal, coerced against the ABI type
    Literal(Value),
}

impl Argument {
    pub fn reference(unit: &str) -> Self {
        Argument::Reference {
            unit: unit.to_string(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Argument::Literal(value.into())
    }

    pub fn sender() -> Self {
        Argument::Context {
            context: ContextValue::Sender,
            offset_secs: 0,
        }
    }

    /// Name of the referenced unit, if this is a reference
    pub fn referenced_unit(&self) -> Option<&str> {
        match self {
            Argument::Reference { unit } => Some(unit),
            _ => None,
        }
    }

    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> OrchestratorResult<Value> {
        match self {
            Argument::Reference { unit } => Ok(Value::String(ctx.registry.get(unit)?.to_checksum())),
            Argument::Context {
                context: ContextValue::Sender,
                ..
            } => Ok(Value::String(ctx.sender.to_checksum())),
            Argument::Context {
                context: ContextValue::Timestamp,
                offset_secs,
            } => Ok(Value::from(ctx.now + offset_secs)),
            Argument::Literal(value) => Ok(value.clone()),
        }
    }
}

// Only tables keyed by `ref` or `context` are special; arrays and every
// other table stay literals.
impl<'de> Deserialize<'de> for Argument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Reference {
            #[serde(rename = "ref")]
            unit: String,
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Context {
            context: ContextValue,
            #[serde(default)]
            offset_secs: i64,
        }

        let value = Value::deserialize(deserializer)?;
        let (is_ref, is_context) = match &value {
            Value::Object(map) => (map.contains_key("ref"), map.contains_key("context")),
            _ => (false, false),
        };

        if is_ref {
            let Reference { unit } = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Argument::Reference { unit })
        } else if is_context {
            let Context {
                context,
                offset_secs,
            } = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Argument::Context {
                context,
                offset_secs,
            })
        } else {
            Ok(Argument::Literal(value))
        }
    }
}

/// What an argument can be resolved against
pub struct ResolveContext<'a> {
    pub registry: &'a AddressRegistry,
    pub sender: Address,
    pub now: i64,
}

impl<'a> ResolveContext<'a> {
    pub fn new(registry: &'a AddressRegistry, sender: Address) -> Self {
        Self {
            registry,
            sender,
            now: chrono::Utc::now().timestamp(),
        }
    }

    pub fn resolve_all(&self, args: &[Argument]) -> OrchestratorResult<Vec<Value>> {
        args.iter().map(|arg| arg.resolve(self)).collect()
    }
}

/// A deployable component
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    /// Unique name, key of the address registry
    pub name: String,
    /// Compiled contract to deploy; defaults to `name`
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl DeploymentUnit {
    pub fn new(name: &str, args: Vec<Argument>) -> Self {
        Self {
            name: name.to_string(),
            contract: None,
            args,
        }
    }

    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Units this one references at construction time
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Argument::referenced_unit)
    }
}

/// Setter call applied after every unit is deployed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LateBinding {
    /// Unit whose setter is called
    pub target: String,
    /// Setter name or full signature
    pub function: String,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl LateBinding {
    pub fn new(target: &str, function: &str, args: Vec<Argument>) -> Self {
        Self {
            target: target.to_string(),
            function: function.to_string(),
            args,
        }
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Argument::referenced_unit)
    }

    /// `Target.setter(Ref, ...)`, used in logs and errors
    pub fn label(&self) -> String {
        let refs: Vec<&str> = self.references().collect();
        format!("{}.{}({})", self.target, self.function, refs.join(", "))
    }
}

/// Unit names double as artifact file names: identifier characters only
pub fn is_valid_unit_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '$'))
}

/// Order units so that every unit comes after the units it references.
///
/// Among units whose dependencies are all placed, the earliest declared goes
/// first, so the order is stable across runs.
pub fn plan(units: &[DeploymentUnit]) -> OrchestratorResult<Vec<DeploymentUnit>> {
    let mut seen = HashSet::new();
    for unit in units {
        if !is_valid_unit_name(&unit.name) {
            return Err(OrchestratorError::Configuration(format!(
                "unit name '{}' must use only letters, digits, '_', '-' or '$'",
                unit.name
            )));
        }
        if !seen.insert(unit.name.as_str()) {
            return Err(OrchestratorError::Configuration(format!(
                "unit '{}' is declared more than once",
                unit.name
            )));
        }
    }
    for unit in units {
        if let Some(missing) = unit.dependencies().find(|dep| !seen.contains(dep)) {
            return Err(OrchestratorError::Configuration(format!(
                "unit '{}' references undeclared unit '{}'",
                unit.name, missing
            )));
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(units.len());
    while order.len() < units.len() {
        let next = units.iter().find(|unit| {
            !placed.contains(unit.name.as_str())
                && unit.dependencies().all(|dep| placed.contains(dep))
        });
        match next {
            Some(unit) => {
                placed.insert(unit.name.as_str());
                order.push(unit.clone());
            }
            None => {
                let cycle = find_cycle(units, &placed);
                return Err(OrchestratorError::CyclicDependency { cycle });
            }
        }
    }

    debug!(
        order = ?order.iter().map(|u| u.name.as_str()).collect::<Vec<_>>(),
        "deployment order computed"
    );
    Ok(order)
}

/// Walk unresolved dependencies from the first blocked unit until a name repeats
fn find_cycle(units: &[DeploymentUnit], placed: &HashSet<&str>) -> Vec<String> {
    let by_name: HashMap<&str, &DeploymentUnit> =
        units.iter().map(|u| (u.name.as_str(), u)).collect();

    let mut path: Vec<&str> = Vec::new();
    let mut current = units
        .iter()
        .find(|u| !placed.contains(u.name.as_str()))
        .map(|u| u.name.as_str());

    while let Some(name) = current {
        if let Some(start) = path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return cycle;
        }
        path.push(name);
        current = by_name
            .get(name)
            .and_then(|unit| unit.dependencies().find(|dep| !placed.contains(dep)));
    }

    path.into_iter().map(String::from).collect()
}

/// Check late bindings against the declared units
pub fn validate_bindings(
    units: &[DeploymentUnit],
    bindings: &[LateBinding],
) -> OrchestratorResult<()> {
    let declared: HashSet<&str> = units.iter().map(|u| u.name.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut edges: HashSet<(&str, &str)> = HashSet::new();

    for binding in bindings {
        if !declared.contains(binding.target.as_str()) {
            return Err(OrchestratorError::Configuration(format!(
                "binding {} targets undeclared unit '{}'",
                binding.label(),
                binding.target
            )));
        }
        if let Some(missing) = binding.references().find(|r| !declared.contains(r)) {
            return Err(OrchestratorError::Configuration(format!(
                "binding {} references undeclared unit '{}'",
                binding.label(),
                missing
            )));
        }

        let key = serde_json::to_string(binding)?;
        if !seen.insert(key) {
            return Err(OrchestratorError::Configuration(format!(
                "binding {} is declared more than once",
                binding.label()
            )));
        }

        for reference in binding.references() {
            if reference != binding.target
                && edges.contains(&(reference, binding.target.as_str()))
            {
                return Err(OrchestratorError::Configuration(format!(
                    "late bindings between '{}' and '{}' reference each other",
                    binding.target, reference
                )));
            }
            edges.insert((binding.target.as_str(), reference));
        }
    }
    Ok(())
}

/// A validated, ordered deployment plan
#[derive(Clone, Debug)]
pub struct DeploymentPlan {
    /// Units in deployment order
    pub units: Vec<DeploymentUnit>,
    /// Bindings in declaration order
    pub bindings: Vec<LateBinding>,
}

impl DeploymentPlan {
    pub fn build(units: &[DeploymentUnit], bindings: &[LateBinding]) -> OrchestratorResult<Self> {
        let ordered = plan(units)?;
        validate_bindings(units, bindings)?;
        Ok(Self {
            units: ordered,
            bindings: bindings.to_vec(),
        })
    }
}

/// Plan manifest file (`deploy/*.toml`)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlanManifest {
    #[serde(default, rename = "unit")]
    pub units: Vec<DeploymentUnit>,
    #[serde(default, rename = "binding")]
    pub bindings: Vec<LateBinding>,
    #[serde(default, rename = "step")]
    pub steps: Vec<VerificationStep>,
}

impl PlanManifest {
    pub fn from_toml_str(contents: &str) -> OrchestratorResult<Self> {
        toml::from_str(contents)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid plan manifest: {}", e)))
    }

    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "failed to read plan manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn deployment_plan(&self) -> OrchestratorResult<DeploymentPlan> {
        DeploymentPlan::build(&self.units, &self.bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit(name: &str, deps: &[&str]) -> DeploymentUnit {
        DeploymentUnit::new(name, deps.iter().map(|d| Argument::reference(d)).collect())
    }

    fn names(units: &[DeploymentUnit]) -> Vec<&str> {
        units.iter().map(|u| u.name.as_str()).collect()
    }

    fn assert_topological(order: &[DeploymentUnit]) {
        for (i, unit) in order.iter().enumerate() {
            for dep in unit.dependencies() {
                let pos = order.iter().position(|u| u.name == dep).unwrap();
                assert!(pos < i, "{} placed before its dependency {}", unit.name, dep);
            }
        }
    }

    #[test]
    fn test_dependency_first() {
        let order = plan(&[unit("B", &["A"]), unit("A", &[])]).unwrap();
        assert_eq!(names(&order), vec!["A", "B"]);
    }

    #[test]
    fn test_supply_chain_order() {
        let units = vec![
            unit("MockToken", &[]),
            unit("QualityControl", &[]),
            unit("TemperatureMonitor", &[]),
            unit("PaymentHandler", &["MockToken"]),
            unit(
                "SupplyChainManager",
                &["TemperatureMonitor", "QualityControl", "PaymentHandler"],
            ),
        ];
        let order = plan(&units).unwrap();
        assert_topological(&order);
        // already topological input keeps declaration order
        assert_eq!(names(&order), names(&units));
    }

    #[test]
    fn test_stable_tie_break_uses_declaration_order() {
        let units = vec![
            unit("Z", &["C"]),
            unit("C", &[]),
            unit("B", &[]),
            unit("A", &["B"]),
        ];
        let order = plan(&units).unwrap();
        assert_eq!(names(&order), vec!["C", "Z", "B", "A"]);
        assert_topological(&order);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let units = vec![
            unit("D", &["B", "C"]),
            unit("C", &["A"]),
            unit("B", &["A"]),
            unit("A", &[]),
            unit("E", &[]),
        ];
        let first = plan(&units).unwrap();
        for _ in 0..10 {
            assert_eq!(names(&plan(&units).unwrap()), names(&first));
        }
        assert_topological(&first);
    }

    #[test]
    fn test_cycle_detected() {
        let units = vec![unit("X", &[]), unit("A", &["B"]), unit("B", &["C"]), unit("C", &["A"])];
        let err = plan(&units).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        match err {
            OrchestratorError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["A", "B", "C", "A"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = plan(&[unit("A", &["A"])]).unwrap_err();
        assert!(matches!(err, OrchestratorError::CyclicDependency { ref cycle } if cycle == &["A", "A"]));
    }

    #[test]
    fn test_undeclared_reference_rejected() {
        let err = plan(&[unit("A", &["Ghost"])]).unwrap_err();
        assert!(err.to_string().contains("undeclared unit 'Ghost'"));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let err = plan(&[unit("A", &[]), unit("A", &[])]).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_unit_names_must_be_file_safe() {
        for bad in ["", "../MockToken", "Mock/Token", "Mock Token", "."] {
            let err = plan(&[unit(bad, &[])]).unwrap_err();
            assert_eq!(err.kind(), "ConfigurationError", "{:?}", bad);
        }
        assert!(plan(&[unit("Mock_Token-v2", &[])]).is_ok());
    }

    #[test]
    fn test_binding_may_close_constructor_cycle() {
        // PaymentHandler needs the manager's address, which needs PaymentHandler
        let units = vec![unit("PaymentHandler", &[]), unit("SupplyChainManager", &["PaymentHandler"])];
        let bindings = vec![LateBinding::new(
            "PaymentHandler",
            "setSupplyChainManager",
            vec![Argument::reference("SupplyChainManager")],
        )];
        let plan = DeploymentPlan::build(&units, &bindings).unwrap();
        assert_eq!(names(&plan.units), vec!["PaymentHandler", "SupplyChainManager"]);
        assert_eq!(plan.bindings.len(), 1);
    }

    #[test]
    fn test_binding_pair_cycle_rejected() {
        let units = vec![unit("A", &[]), unit("B", &[])];
        let bindings = vec![
            LateBinding::new("A", "setPeer", vec![Argument::reference("B")]),
            LateBinding::new("B", "setPeer", vec![Argument::reference("A")]),
        ];
        let err = validate_bindings(&units, &bindings).unwrap_err();
        assert!(err.to_string().contains("reference each other"));
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let units = vec![unit("A", &[]), unit("B", &[])];
        let binding = LateBinding::new("A", "setPeer", vec![Argument::reference("B")]);
        let err = validate_bindings(&units, &[binding.clone(), binding]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_binding_to_unknown_unit_rejected() {
        let units = vec![unit("A", &[])];
        let bindings = vec![LateBinding::new("A", "setPeer", vec![Argument::reference("Nope")])];
        assert!(validate_bindings(&units, &bindings).is_err());
    }

    #[test]
    fn test_argument_resolution() {
        let mut registry = AddressRegistry::new();
        registry.set("MockToken", Address([0x11; 20])).unwrap();
        let ctx = ResolveContext {
            registry: &registry,
            sender: Address([0x22; 20]),
            now: 1_000,
        };

        assert_eq!(
            Argument::reference("MockToken").resolve(&ctx).unwrap(),
            json!(Address([0x11; 20]).to_checksum())
        );
        assert_eq!(
            Argument::sender().resolve(&ctx).unwrap(),
            json!(Address([0x22; 20]).to_checksum())
        );
        let deadline = Argument::Context {
            context: ContextValue::Timestamp,
            offset_secs: 86400,
        };
        assert_eq!(deadline.resolve(&ctx).unwrap(), json!(87_400));
        assert_eq!(
            Argument::reference("Missing").resolve(&ctx).unwrap_err().kind(),
            "UnresolvedReferenceError"
        );
    }

    #[test]
    fn test_manifest_parsing() {
        let manifest = PlanManifest::from_toml_str(
            r#"
            [[unit]]
            name = "MockToken"

            [[unit]]
            name = "PaymentHandler"
            args = [{ ref = "MockToken" }, "1 ether", true]

            [[binding]]
            target = "MockToken"
            function = "setHandler"
            args = [{ ref = "PaymentHandler" }]
            "#,
        )
        .unwrap();

        assert_eq!(manifest.units.len(), 2);
        assert_eq!(
            manifest.units[1].args,
            vec![
                Argument::reference("MockToken"),
                Argument::literal("1 ether"),
                Argument::literal(true),
            ]
        );
        let plan = manifest.deployment_plan().unwrap();
        assert_eq!(names(&plan.units), vec!["MockToken", "PaymentHandler"]);
        assert_eq!(plan.bindings[0].label(), "MockToken.setHandler(PaymentHandler)");
    }

    #[test]
    fn test_argument_shapes() {
        let args: Vec<Argument> = serde_json::from_value(json!([
            { "ref": "MockToken" },
            { "context": "timestamp", "offset_secs": 86400 },
            { "context": "sender" },
            ["Test Product"],
            { "role": 0 },
        ]))
        .unwrap();

        assert_eq!(args[0], Argument::reference("MockToken"));
        assert_eq!(
            args[1],
            Argument::Context {
                context: ContextValue::Timestamp,
                offset_secs: 86400
            }
        );
        assert_eq!(args[2], Argument::sender());
        assert_eq!(args[3], Argument::literal(json!(["Test Product"])));
        assert_eq!(args[4], Argument::literal(json!({ "role": 0 })));

        let bad: Result<Argument, _> = serde_json::from_value(json!({ "ref": "A", "extra": 1 }));
        assert!(bad.is_err());
    }
}
