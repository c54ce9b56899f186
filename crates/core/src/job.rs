//! Job model - one research request and its lifecycle.

use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::metrics::ExecutionMetrics;
use crate::Time;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, nothing loaded yet
    Initializing,
    /// Plan is being produced (by the external planner)
    Planning,
    /// Task list accepted, not yet executing
    Planned,
    /// Retrieval waves in flight
    Executing,
    /// Only synthesis/report work remains
    Synthesizing,
    /// Only report-writing work remains
    GeneratingReport,
    /// All waves settled successfully
    Complete,
    /// Terminal failure
    Failed,
    /// Cancelled by the user
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is allowed.
    ///
    /// Forward progress only; `Failed` and `Cancelled` are reachable from
    /// any non-terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed | JobStatus::Cancelled => true,
            JobStatus::Initializing => false,
            JobStatus::Planning => matches!(self, JobStatus::Initializing),
            JobStatus::Planned => matches!(self, JobStatus::Initializing | JobStatus::Planning),
            JobStatus::Executing => matches!(self, JobStatus::Planned),
            JobStatus::Synthesizing => matches!(self, JobStatus::Executing),
            JobStatus::GeneratingReport => {
                matches!(self, JobStatus::Executing | JobStatus::Synthesizing)
            }
            JobStatus::Complete => matches!(
                self,
                JobStatus::Executing | JobStatus::Synthesizing | JobStatus::GeneratingReport
            ),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Planning => "planning",
            JobStatus::Planned => "planned",
            JobStatus::Executing => "executing",
            JobStatus::Synthesizing => "synthesizing",
            JobStatus::GeneratingReport => "generating_report",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A research job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: JobId,

    /// The research question
    pub query: String,

    /// Free-text context supplied with the request
    pub context: String,

    /// Current status
    pub status: JobStatus,

    /// Total planned tasks
    pub total_tasks: usize,

    /// Tasks that reached `complete`
    pub completed_tasks: usize,

    /// completed_tasks / total_tasks, as a percentage
    pub progress_percentage: f32,

    /// Key of the most recently started task (for display)
    pub current_task_key: Option<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// When execution started
    pub started_at: Option<Time>,

    /// When the job reached a terminal state
    pub completed_at: Option<Time>,

    /// Terminal error message, if failed
    pub error_message: Option<String>,

    /// Performance snapshot, written once at completion
    pub execution_metrics: Option<ExecutionMetrics>,
}

impl Job {
    /// Create a job in `Planned` state, ready to accept a task list.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            query: query.into(),
            context: String::new(),
            status: JobStatus::Planned,
            total_tasks: 0,
            completed_tasks: 0,
            progress_percentage: 0.0,
            current_task_key: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            execution_metrics: None,
        }
    }

    /// Set the free-text context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}
