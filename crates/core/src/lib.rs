//! Harness core data models.
//!
//! This crate defines the fundamental data structures shared by the research
//! task execution engine: jobs, tasks, artifacts, and the performance
//! snapshot written when a job settles.

#![warn(missing_docs)]

// Core identities
mod id;

// Job lifecycle
mod job;

// Task execution
mod artifact;
mod task;

// Performance instrumentation
mod metrics;

// Re-exports
pub use id::*;

pub use job::{Job, JobStatus};
pub use task::{
    ExecutorRole, ParseTaskTypeError, RetryHint, Task, TaskOutcome, TaskStatus, TaskType,
};

pub use artifact::{Artifact, ArtifactKind};
pub use metrics::{ExecutionMetrics, TaskDuration, WaveTiming};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
