//! Artifacts - typed outputs produced by completed tasks.

use serde::{Deserialize, Serialize};

use crate::id::{ArtifactId, JobId, TaskId};
use crate::Time;

/// What kind of output an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A retrieved passage with provenance
    Passage,
    /// A synthesized finding
    Finding,
    /// A written report section
    Section,
    /// The final report
    Report,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Passage => "passage",
            ArtifactKind::Finding => "finding",
            ArtifactKind::Section => "section",
            ArtifactKind::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// A typed output owned by the task that produced it.
///
/// Downstream tasks reference artifacts as context but never mutate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier
    pub id: ArtifactId,

    /// Owning job
    pub job_id: JobId,

    /// Producing task
    pub task_id: TaskId,

    /// Output kind
    pub kind: ArtifactKind,

    /// Short title
    pub title: String,

    /// Artifact body
    pub content: String,

    /// Self-reported quality score (0-1)
    pub quality_score: f64,

    /// Creation timestamp
    pub created_at: Time,
}

impl Artifact {
    /// Create an artifact for a task.
    pub fn new(
        job_id: JobId,
        task_id: TaskId,
        kind: ArtifactKind,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            job_id,
            task_id,
            kind,
            title: title.into(),
            content: content.into(),
            quality_score: 0.0,
            created_at: chrono::Utc::now(),
        }
    }

    /// Set the quality score.
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = score;
        self
    }
}
