//! Quality gate - decides what happens to a task's self-reported score.

use harness_core::{RetryHint, TaskType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Minimum acceptable quality score per task type.
///
/// Retrieval is held to a lower bar than the stages that synthesize and
/// present output: early-stage noise can still be filtered downstream, a
/// weak final report cannot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Retrieval tasks (web, vector, graph)
    pub retrieval: f64,
    /// Synthesis tasks
    pub synthesis: f64,
    /// Fact-check tasks
    pub fact_check: f64,
    /// Section writing
    pub write_section: f64,
    /// Full report writing
    pub write_report: f64,
    /// Report review
    pub review: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            retrieval: 0.70,
            synthesis: 0.80,
            fact_check: 0.80,
            write_section: 0.80,
            write_report: 0.85,
            review: 0.85,
        }
    }
}

impl QualityThresholds {
    /// The threshold for a task type.
    pub fn for_type(&self, task_type: TaskType) -> f64 {
        match task_type {
            TaskType::RetrievalWeb | TaskType::RetrievalVector | TaskType::RetrievalGraph => {
                self.retrieval
            }
            TaskType::Synthesis => self.synthesis,
            TaskType::FactCheck => self.fact_check,
            TaskType::WriteSection => self.write_section,
            TaskType::WriteReport => self.write_report,
            TaskType::Review => self.review,
        }
    }
}

/// A non-fatal quality shortfall recorded against the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityWarning {
    /// Task that fell short
    pub task_key: String,
    /// Task type
    pub task_type: TaskType,
    /// Score the task reported
    pub score: f64,
    /// Threshold it missed
    pub threshold: f64,
    /// Retries consumed before accepting
    pub retries: u32,
}

impl std::fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) scored {:.2} below threshold {:.2} after {} retries",
            self.task_key, self.task_type, self.score, self.threshold, self.retries
        )
    }
}

/// Outcome of evaluating one completed task.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Score meets the threshold
    Accept,
    /// Score is short and retries remain; re-queue with the given hint
    RetryWithExpansion(RetryHint),
    /// Score is short and retries are exhausted; accept and surface a warning
    AcceptWithWarning(QualityWarning),
}

/// Quality gate policy.
///
/// A persistently low-quality task never blocks the job: once its retry
/// budget is spent the shortfall is downgraded to a warning on the job
/// result.
#[derive(Debug, Clone)]
pub struct QualityGate {
    thresholds: QualityThresholds,
    max_retries: u32,
    /// How much a retry raises the executor's quality target above threshold
    target_uplift: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            thresholds: QualityThresholds::default(),
            max_retries: 2,
            target_uplift: 0.05,
        }
    }
}

impl QualityGate {
    /// Create a gate with default thresholds and a 2-retry budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thresholds.
    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The threshold for a task type.
    pub fn threshold_for(&self, task_type: TaskType) -> f64 {
        self.thresholds.for_type(task_type)
    }

    /// Evaluate a completed task's score against its type's threshold.
    pub fn evaluate(&self, task_key: &str, task_type: TaskType, score: f64, retry_count: u32) -> GateDecision {
        let threshold = self.thresholds.for_type(task_type);

        if score >= threshold {
            debug!(task_key, %task_type, score, threshold, "quality gate passed");
            return GateDecision::Accept;
        }

        if retry_count < self.max_retries {
            let hint = RetryHint {
                expand_query: true,
                quality_target: Some((threshold + self.target_uplift).min(1.0)),
            };
            debug!(
                task_key,
                %task_type,
                score,
                threshold,
                attempt = retry_count + 1,
                "quality below threshold, re-queueing with expanded parameters"
            );
            return GateDecision::RetryWithExpansion(hint);
        }

        let warning = QualityWarning {
            task_key: task_key.to_string(),
            task_type,
            score,
            threshold,
            retries: retry_count,
        };
        warn!(task_key, %task_type, score, threshold, "quality retries exhausted, accepting with warning");
        GateDecision::AcceptWithWarning(warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let thresholds = QualityThresholds::default();
        assert_eq!(thresholds.for_type(TaskType::RetrievalWeb), 0.70);
        assert_eq!(thresholds.for_type(TaskType::RetrievalVector), 0.70);
        assert_eq!(thresholds.for_type(TaskType::RetrievalGraph), 0.70);
        assert_eq!(thresholds.for_type(TaskType::Synthesis), 0.80);
        assert_eq!(thresholds.for_type(TaskType::FactCheck), 0.80);
        assert_eq!(thresholds.for_type(TaskType::WriteReport), 0.85);
    }

    #[test]
    fn test_accept_at_threshold() {
        let gate = QualityGate::new();
        let decision = gate.evaluate("retrieval_a", TaskType::RetrievalWeb, 0.70, 0);
        assert_eq!(decision, GateDecision::Accept);
    }

    #[test]
    fn test_retry_below_threshold_with_retries_left() {
        let gate = QualityGate::new();
        let decision = gate.evaluate("retrieval_a", TaskType::RetrievalWeb, 0.55, 0);

        match decision {
            GateDecision::RetryWithExpansion(hint) => {
                assert!(hint.expand_query);
                assert_eq!(hint.quality_target, Some(0.75));
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_still_allowed_at_one_retry() {
        let gate = QualityGate::new();
        let decision = gate.evaluate("synthesis", TaskType::Synthesis, 0.5, 1);
        assert!(matches!(decision, GateDecision::RetryWithExpansion(_)));
    }

    #[test]
    fn test_warning_after_retries_exhausted() {
        let gate = QualityGate::new();
        let decision = gate.evaluate("synthesis", TaskType::Synthesis, 0.5, 2);

        match decision {
            GateDecision::AcceptWithWarning(warning) => {
                assert_eq!(warning.task_key, "synthesis");
                assert_eq!(warning.score, 0.5);
                assert_eq!(warning.threshold, 0.80);
                assert_eq!(warning.retries, 2);
            }
            other => panic!("expected warning, got {:?}", other),
        }
    }

    #[test]
    fn test_quality_target_caps_at_one() {
        let gate = QualityGate::new().with_thresholds(QualityThresholds {
            review: 0.99,
            ..Default::default()
        });
        match gate.evaluate("review", TaskType::Review, 0.5, 0) {
            GateDecision::RetryWithExpansion(hint) => {
                assert_eq!(hint.quality_target, Some(1.0));
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_warning_display_names_task() {
        let gate = QualityGate::new();
        if let GateDecision::AcceptWithWarning(warning) =
            gate.evaluate("retrieval_b", TaskType::RetrievalVector, 0.4, 2)
        {
            let text = warning.to_string();
            assert!(text.contains("retrieval_b"));
            assert!(text.contains("0.40"));
        } else {
            panic!("expected warning");
        }
    }
}
