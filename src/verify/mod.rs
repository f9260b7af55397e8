//! Post-deployment verification
//!
//! An ordered list of steps probes the live deployment. Each step declares
//! how it behaves on re-run (its idempotency class), so the whole sequence
//! can be run again after a partial failure without repeating effects.

pub mod report;
pub mod runner;
pub mod step;

pub use report::VerificationReport;
pub use runner::{RunContext, VerificationRunner};
pub use step::{
    validate_steps, Expectation, IdempotencyClass, Precondition, SkipReason, StepAction,
    StepOutcome, StepResult, VerificationStep,
};
