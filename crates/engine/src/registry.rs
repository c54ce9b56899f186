//! Executor registry - routes task types to external executor roles.

use std::sync::Arc;

use async_trait::async_trait;
use harness_core::{ExecutorRole, JobId, Task, TaskOutcome};

/// Error raised by an external executor.
///
/// The variant steers the engine's retry policy: recoverable errors consume
/// the task's retry budget, unrecoverable errors fail the task immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// Transient failure worth retrying (network, rate limit, upstream blip)
    #[error("recoverable executor error: {0}")]
    Recoverable(String),

    /// Failure that will not succeed on retry (bad input, auth, contract)
    #[error("unrecoverable executor error: {0}")]
    Unrecoverable(String),
}

/// An external collaborator capable of running tasks of one role.
///
/// The engine treats this as an opaque, possibly slow, possibly failing call
/// and wraps it with its own retry and timeout policy.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute one task attempt.
    async fn execute(&self, task: &Task, job_id: JobId) -> Result<TaskOutcome, ExecutorError>;
}

/// A fixed mapping from executor role to executor.
///
/// Routing from task type to role is the exhaustive
/// [`TaskType::role`](harness_core::TaskType::role) match, so there is no
/// runtime "unknown type" path: a registry always has an executor for every
/// task that parsed.
pub struct ExecutorRegistry {
    retrieval: Arc<dyn TaskExecutor>,
    synthesis: Arc<dyn TaskExecutor>,
    report: Arc<dyn TaskExecutor>,
}

impl ExecutorRegistry {
    /// Build a registry from one executor per role.
    pub fn new(
        retrieval: Arc<dyn TaskExecutor>,
        synthesis: Arc<dyn TaskExecutor>,
        report: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            retrieval,
            synthesis,
            report,
        }
    }

    /// Build a registry that routes every role to the same executor.
    pub fn uniform(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            retrieval: Arc::clone(&executor),
            synthesis: Arc::clone(&executor),
            report: executor,
        }
    }

    /// The executor for a role.
    pub fn executor_for(&self, role: ExecutorRole) -> &Arc<dyn TaskExecutor> {
        match role {
            ExecutorRole::Retrieval => &self.retrieval,
            ExecutorRole::Synthesis => &self.synthesis,
            ExecutorRole::Report => &self.report,
        }
    }
}
