//! Berry supply chain deployment and verification orchestrator
//!
//! Deploys a set of mutually dependent on-chain components, wires the
//! cross-references that can only be set once addresses exist, then drives a
//! re-runnable verification workflow against the live deployment.
//!
//! ## Module Structure
//!
//! - `plan`: units, late bindings, verification steps; deployment ordering
//! - `registry`: unit name to deployed address, written once per name
//! - `deployer`: per-unit deployment with retry discipline
//! - `wiring`: late bindings applied after every unit is deployed
//! - `verify/`: verification steps, runner and report
//! - `orchestrator`: the deploy and verify phases end to end
//! - `sender`: single per-sender queue that owns the nonce
//! - `chain/`: chain client trait, JSON-RPC client, signer, in-memory mock
//! - `abi`: Solidity ABI encoding for the narrow call interface
//! - `artifacts`: compiled contracts in, addresses/interfaces/reports out

// ============================================================================
// CORE
// ============================================================================

/// Deployment plan and planner
pub mod plan;

/// Address registry
pub mod registry;

/// Component deployment
pub mod deployer;

/// Late binding
pub mod wiring;

/// Post-deployment verification
pub mod verify;

/// Deploy and verify phases
pub mod orchestrator;

// ============================================================================
// SUPPORT
// ============================================================================

pub mod abi;
pub mod artifacts;
pub mod chain;
pub mod config;
pub mod error;
pub mod retry;
pub mod sender;
pub mod types;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use abi::{InterfaceDescriptor, InterfaceSet};
pub use artifacts::{
    ArtifactSource, ArtifactWriter, ComponentInterfaceDocument, ContractArtifact,
    HardhatArtifacts, StaticArtifacts,
};
pub use chain::{ChainClient, JsonRpcClient, LocalSigner, MockChain, Receipt, TransactionRequest};
pub use config::OrchestratorConfig;
pub use deployer::{ComponentDeployer, DeployedComponent};
pub use error::{ChainError, OrchestratorError, OrchestratorResult};
pub use orchestrator::{DeploymentOutcome, Orchestrator};
pub use plan::{
    plan, Argument, ContextValue, DeploymentPlan, DeploymentUnit, LateBinding, PlanManifest,
};
pub use registry::AddressRegistry;
pub use retry::RetryPolicy;
pub use sender::SenderQueue;
pub use types::{Address, TxHash, U256};
pub use verify::{
    IdempotencyClass, StepOutcome, StepResult, VerificationReport, VerificationRunner,
    VerificationStep,
};
pub use wiring::{AppliedBinding, WiringCoordinator};
