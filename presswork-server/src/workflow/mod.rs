//! Workflow layer: the only writer to the stores

pub mod engine;
pub mod reprints;

pub use engine::{plan_transition, TransitionPlan, WorkflowEngine, MAX_TRANSITION_ATTEMPTS};
pub use reprints::ReprintRequestManager;
