//! Quality gating for task results.
//!
//! Each task type carries a minimum acceptable self-reported quality score.
//! The gate decides whether a completed task is accepted, re-queued with
//! expanded parameters, or accepted with a non-fatal warning once its retry
//! budget is spent.

#![warn(missing_docs)]

mod gate;

pub use gate::{GateDecision, QualityGate, QualityThresholds, QualityWarning};
