//! SLA tiers - task-count-based wall-clock targets.

use serde::{Deserialize, Serialize};

/// Target tier for a job, sized by its task count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaTier {
    /// Up to 5 tasks: 120 s target
    Small,
    /// Up to 10 tasks: 300 s target
    Medium,
    /// More than 10 tasks: 900 s target
    Large,
}

impl SlaTier {
    /// The tier for a job with `task_count` tasks.
    pub fn for_task_count(task_count: usize) -> Self {
        if task_count <= 5 {
            SlaTier::Small
        } else if task_count <= 10 {
            SlaTier::Medium
        } else {
            SlaTier::Large
        }
    }

    /// Target wall-clock duration for this tier, in seconds.
    pub fn target_seconds(&self) -> f64 {
        match self {
            SlaTier::Small => 120.0,
            SlaTier::Medium => 300.0,
            SlaTier::Large => 900.0,
        }
    }
}

impl std::fmt::Display for SlaTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlaTier::Small => write!(f, "small"),
            SlaTier::Medium => write!(f, "medium"),
            SlaTier::Large => write!(f, "large"),
        }
    }
}

/// Outcome of checking a job run against its SLA tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaReport {
    /// The tier the job falls into
    pub tier: SlaTier,
    /// Tier target, in seconds
    pub target_seconds: f64,
    /// Actual wall-clock duration, in seconds
    pub duration_seconds: f64,
    /// Whether the run met the target
    pub compliant: bool,
    /// target - duration; negative when the target was missed
    pub margin_seconds: f64,
}

impl SlaReport {
    /// Evaluate a run against its tier.
    pub fn evaluate(task_count: usize, duration_seconds: f64) -> Self {
        let tier = SlaTier::for_task_count(task_count);
        let target_seconds = tier.target_seconds();
        Self {
            tier,
            target_seconds,
            duration_seconds,
            compliant: duration_seconds <= target_seconds,
            margin_seconds: target_seconds - duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SlaTier::for_task_count(1), SlaTier::Small);
        assert_eq!(SlaTier::for_task_count(5), SlaTier::Small);
        assert_eq!(SlaTier::for_task_count(6), SlaTier::Medium);
        assert_eq!(SlaTier::for_task_count(10), SlaTier::Medium);
        assert_eq!(SlaTier::for_task_count(11), SlaTier::Large);
        assert_eq!(SlaTier::for_task_count(100), SlaTier::Large);
    }

    #[test]
    fn test_tier_targets() {
        assert_eq!(SlaTier::Small.target_seconds(), 120.0);
        assert_eq!(SlaTier::Medium.target_seconds(), 300.0);
        assert_eq!(SlaTier::Large.target_seconds(), 900.0);
    }

    #[test]
    fn test_compliant_run() {
        let report = SlaReport::evaluate(4, 60.0);
        assert_eq!(report.tier, SlaTier::Small);
        assert!(report.compliant);
        assert_eq!(report.margin_seconds, 60.0);
    }

    #[test]
    fn test_violating_run() {
        let report = SlaReport::evaluate(8, 450.0);
        assert_eq!(report.tier, SlaTier::Medium);
        assert!(!report.compliant);
        assert_eq!(report.margin_seconds, -150.0);
    }

    #[test]
    fn test_exactly_on_target_is_compliant() {
        let report = SlaReport::evaluate(12, 900.0);
        assert!(report.compliant);
        assert_eq!(report.margin_seconds, 0.0);
    }
}
