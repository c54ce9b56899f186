//! Task model - one unit of work within a research job.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::id::{JobId, TaskId};
use crate::Time;

/// The kind of work a task performs.
///
/// This is a closed set: routing a task to an executor is an exhaustive
/// match, so an unknown task type is a parse error at plan load time, not a
/// runtime dispatch miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Web search retrieval
    RetrievalWeb,
    /// Vector similarity retrieval
    RetrievalVector,
    /// Knowledge graph traversal retrieval
    RetrievalGraph,
    /// Synthesize findings from retrieved passages
    Synthesis,
    /// Verify claims against sources
    FactCheck,
    /// Write one report section
    WriteSection,
    /// Write the full report
    WriteReport,
    /// Review the assembled report
    Review,
}

impl TaskType {
    /// The executor role that runs this task type.
    pub fn role(&self) -> ExecutorRole {
        match self {
            TaskType::RetrievalWeb | TaskType::RetrievalVector | TaskType::RetrievalGraph => {
                ExecutorRole::Retrieval
            }
            TaskType::Synthesis | TaskType::FactCheck => ExecutorRole::Synthesis,
            TaskType::WriteSection | TaskType::WriteReport | TaskType::Review => {
                ExecutorRole::Report
            }
        }
    }

    /// Whether a terminal failure of this task type fails the whole job.
    ///
    /// The final report cannot be substituted from other artifacts, so its
    /// writer is on the critical path.
    pub fn is_critical(&self) -> bool {
        matches!(self, TaskType::WriteReport)
    }

    /// All task type variants, in plan order.
    pub fn all() -> &'static [TaskType] {
        &[
            TaskType::RetrievalWeb,
            TaskType::RetrievalVector,
            TaskType::RetrievalGraph,
            TaskType::Synthesis,
            TaskType::FactCheck,
            TaskType::WriteSection,
            TaskType::WriteReport,
            TaskType::Review,
        ]
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::RetrievalWeb => "retrieval_web",
            TaskType::RetrievalVector => "retrieval_vector",
            TaskType::RetrievalGraph => "retrieval_graph",
            TaskType::Synthesis => "synthesis",
            TaskType::FactCheck => "fact_check",
            TaskType::WriteSection => "write_section",
            TaskType::WriteReport => "write_report",
            TaskType::Review => "review",
        };
        write!(f, "{}", s)
    }
}

/// Error parsing a task type from its wire name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown task type: {0}")]
pub struct ParseTaskTypeError(pub String);

impl std::str::FromStr for TaskType {
    type Err = ParseTaskTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retrieval_web" => Ok(TaskType::RetrievalWeb),
            "retrieval_vector" => Ok(TaskType::RetrievalVector),
            "retrieval_graph" => Ok(TaskType::RetrievalGraph),
            "synthesis" => Ok(TaskType::Synthesis),
            "fact_check" => Ok(TaskType::FactCheck),
            "write_section" => Ok(TaskType::WriteSection),
            "write_report" => Ok(TaskType::WriteReport),
            "review" => Ok(TaskType::Review),
            other => Err(ParseTaskTypeError(other.to_string())),
        }
    }
}

/// External executor roles a task can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorRole {
    /// Passage retrieval (web, vector, graph)
    Retrieval,
    /// Synthesis and fact-checking
    Synthesis,
    /// Section, report, and review writing
    Report,
}

impl std::fmt::Display for ExecutorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorRole::Retrieval => write!(f, "retrieval"),
            ExecutorRole::Synthesis => write!(f, "synthesis"),
            ExecutorRole::Report => write!(f, "report"),
        }
    }
}

/// Task lifecycle status.
///
/// `Pending` is re-entrant from `Failed` while retries remain; the other
/// failure-side states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies or a dispatch slot
    Pending,
    /// Dispatched, not yet running
    Queued,
    /// Executing
    Running,
    /// Finished successfully
    Complete,
    /// Finished unsuccessfully, no retries remain
    Failed,
    /// Never ran because a dependency failed
    Skipped,
    /// Abandoned by a job-level cancel
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Complete | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Typed retry adjustment attached to a task's next execution request.
///
/// Replaces a free-form config bag: the only retry knobs are widening the
/// query and raising the quality bar the executor should aim for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryHint {
    /// Ask the executor to broaden its query/recall parameters
    pub expand_query: bool,
    /// Raised quality target for the retry attempt
    pub quality_target: Option<f64>,
}

impl RetryHint {
    /// Whether any adjustment is requested.
    pub fn is_set(&self) -> bool {
        self.expand_query || self.quality_target.is_some()
    }
}

/// A task within a research job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning job
    pub job_id: JobId,

    /// Key unique within the job, referenced by `depends_on`
    pub task_key: String,

    /// What kind of work this is
    pub task_type: TaskType,

    /// Planner-assigned ordering hint
    pub sequence_order: u32,

    /// Task keys (same job) that must complete first
    pub depends_on: Vec<String>,

    /// Short human description of the work
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Retries consumed (transient failures and quality re-queues share this budget)
    pub retry_count: u32,

    /// Adjustment for the next attempt, set by the quality gate
    pub retry_hint: RetryHint,

    /// Self-reported quality score of the last completed attempt (0-1)
    pub quality_score: Option<f64>,

    /// When the last attempt started
    pub started_at: Option<Time>,

    /// When the task reached a terminal state
    pub completed_at: Option<Time>,

    /// Execution duration of the last attempt, in seconds
    pub duration_seconds: Option<f64>,

    /// Brief result summary from the executor
    pub summary: Option<String>,

    /// Structured result data from the executor
    pub result_data: serde_json::Value,

    /// Error message if the task failed
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: Time,
}

impl Task {
    /// Create a pending task.
    pub fn new(
        job_id: JobId,
        task_key: impl Into<String>,
        task_type: TaskType,
        depends_on: Vec<String>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            job_id,
            task_key: task_key.into(),
            task_type,
            sequence_order: 0,
            depends_on,
            description: String::new(),
            status: TaskStatus::Pending,
            retry_count: 0,
            retry_hint: RetryHint::default(),
            quality_score: None,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            summary: None,
            result_data: serde_json::Value::Null,
            error_message: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the ordering hint.
    pub fn with_sequence_order(mut self, order: u32) -> Self {
        self.sequence_order = order;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Result returned by an external executor for one task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Brief result summary
    pub summary: String,

    /// Structured result data
    pub data: serde_json::Value,

    /// Artifacts produced by this attempt
    pub artifacts: Vec<Artifact>,

    /// Self-reported quality score (0-1)
    pub quality_score: f64,
}
