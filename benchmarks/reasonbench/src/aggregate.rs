//! Result aggregation
//!
//! Folds run records into the counts and rates of the results file.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::RunRecord;

/// Counts for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub provider: String,
    pub runs: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub verified_correct: usize,
    pub fallback_runs: usize,
    pub success_rate: f64,
    pub accuracy_rate: f64,
}

/// Summary of a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub timestamp: DateTime<Utc>,
    /// Outcomes recorded, skipped included
    pub total: usize,
    /// Distinct prompt sets among non-skipped runs
    pub total_prompts: usize,
    /// Distinct (provider, model) pairs among non-skipped runs
    pub total_models: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub verified_correct: usize,
    /// Successful runs where at least one node fell back to free text
    pub fallback_runs: usize,
    /// successful / (total - skipped), in percent
    pub success_rate: f64,
    /// verified_correct / successful, in percent
    pub accuracy_rate: f64,
    pub avg_duration_ms: u64,
    pub p50_duration_ms: u64,
    pub p95_duration_ms: u64,
    pub providers: Vec<ProviderSummary>,
}

impl BenchmarkSummary {
    pub fn from_records(records: &[RunRecord]) -> Self {
        let attempted: Vec<&RunRecord> = records.iter().filter(|r| !r.outcome.is_skipped()).collect();

        let total_prompts = attempted
            .iter()
            .map(|r| r.identity.prompt.as_str())
            .collect::<HashSet<_>>()
            .len();
        let total_models = attempted
            .iter()
            .map(|r| (r.identity.provider.as_str(), r.identity.model.as_str()))
            .collect::<HashSet<_>>()
            .len();

        let durations: Vec<u64> = attempted.iter().map(|r| r.duration_ms).collect();
        let counts = Counts::of(records.iter());

        let mut by_provider: IndexMap<&str, Vec<&RunRecord>> = IndexMap::new();
        for record in records {
            by_provider
                .entry(record.identity.provider.as_str())
                .or_default()
                .push(record);
        }
        let providers = by_provider
            .into_iter()
            .map(|(provider, records)| {
                let counts = Counts::of(records.into_iter());
                ProviderSummary {
                    provider: provider.to_string(),
                    runs: counts.total,
                    successful: counts.successful,
                    skipped: counts.skipped,
                    failed: counts.failed,
                    verified_correct: counts.verified_correct,
                    fallback_runs: counts.fallback_runs,
                    success_rate: counts.success_rate(),
                    accuracy_rate: counts.accuracy_rate(),
                }
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            total: counts.total,
            total_prompts,
            total_models,
            successful: counts.successful,
            skipped: counts.skipped,
            failed: counts.failed,
            verified_correct: counts.verified_correct,
            fallback_runs: counts.fallback_runs,
            success_rate: counts.success_rate(),
            accuracy_rate: counts.accuracy_rate(),
            avg_duration_ms: if durations.is_empty() {
                0
            } else {
                durations.iter().sum::<u64>() / durations.len() as u64
            },
            p50_duration_ms: percentile(&durations, 50.0),
            p95_duration_ms: percentile(&durations, 95.0),
            providers,
        }
    }
}

#[derive(Default)]
struct Counts {
    total: usize,
    successful: usize,
    skipped: usize,
    failed: usize,
    verified_correct: usize,
    fallback_runs: usize,
}

impl Counts {
    fn of<'a>(records: impl Iterator<Item = &'a RunRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.total += 1;
            match &record.outcome {
                crate::RunOutcome::Success(report) => {
                    counts.successful += 1;
                    if !report.fallback_nodes.is_empty() {
                        counts.fallback_runs += 1;
                    }
                }
                crate::RunOutcome::Skipped { .. } => counts.skipped += 1,
                crate::RunOutcome::Failed { .. } => counts.failed += 1,
            }
            if record.outcome.is_verified_correct() {
                counts.verified_correct += 1;
            }
        }
        counts
    }

    fn success_rate(&self) -> f64 {
        rate(self.successful, self.total - self.skipped)
    }

    fn accuracy_rate(&self) -> f64 {
        rate(self.verified_correct, self.successful)
    }
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}

/// Calculate percentile from a slice of values
fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RunIdentity, RunOutcome, SuccessReport};
    use orchestrator::{StepResult, Verification, WorkflowState};

    fn record(prompt: &str, provider: &str, outcome: RunOutcome, duration_ms: u64) -> RunRecord {
        RunRecord {
            identity: RunIdentity::new(prompt, provider, "m"),
            outcome,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    fn success(is_correct: bool, fallback: bool) -> RunOutcome {
        let mut state = WorkflowState::new();
        state.merge(StepResult::new().with_artifact(&Verification {
            is_correct,
            issues_found: vec![],
            final_answer: "27".to_string(),
        }));
        RunOutcome::Success(SuccessReport {
            response: state,
            fallback_nodes: if fallback { vec!["solve".to_string()] } else { vec![] },
            trace: vec![],
            pending_nodes: vec![],
        })
    }

    #[test]
    fn test_summary_counts_and_rates() {
        let records = vec![
            record("cubes", "a", success(true, false), 100),
            record("cubes", "b", success(false, true), 300),
            record("cubes", "b", RunOutcome::Failed { error: "401".into() }, 200),
            record("sums", "a", RunOutcome::Skipped { reason: "dup".into() }, 0),
        ];

        let summary = BenchmarkSummary::from_records(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.total_prompts, 1);
        assert_eq!(summary.total_models, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.verified_correct, 1);
        assert_eq!(summary.fallback_runs, 1);
        assert!((summary.success_rate - 66.666).abs() < 0.01);
        assert!((summary.accuracy_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.avg_duration_ms, 200);
        assert_eq!(summary.p50_duration_ms, 200);

        let providers: Vec<_> = summary.providers.iter().map(|p| (p.provider.as_str(), p.runs)).collect();
        assert_eq!(providers, vec![("a", 2), ("b", 2)]);
        assert_eq!(summary.providers[0].skipped, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BenchmarkSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.accuracy_rate, 0.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(percentile(&values, 50.0), 6);
        assert_eq!(percentile(&values, 95.0), 10);
        assert_eq!(percentile(&values, 0.0), 1);
    }
}
