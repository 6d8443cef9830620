//! The decision loop that drives a workflow run.

mod context;
mod decision;
mod trace;

pub use context::RuntimeContext;
pub use decision::{run, DecisionEngine, EngineOptions, StepObserver};
pub use trace::{DispatchedAction, Outcome, RunTrace, StepOutcome, TraceEntry};
