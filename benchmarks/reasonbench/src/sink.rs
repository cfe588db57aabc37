//! Streaming result sink
//!
//! The runner sends every record over an unbounded channel as soon as it
//! exists. A single consumer task appends it, recomputes the summary and
//! rewrites the results file, so an interrupted sweep keeps every record
//! completed before the interruption.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::aggregate::BenchmarkSummary;
use crate::reporter::Reporter;
use crate::RunRecord;

pub type OutcomeSender = mpsc::UnboundedSender<RunRecord>;
pub type OutcomeReceiver = mpsc::UnboundedReceiver<RunRecord>;

/// Create the channel between runner and sink
pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    mpsc::unbounded_channel()
}

/// Contents of a results file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub timestamp: DateTime<Utc>,
    /// Prompt sets with at least one successful run
    pub prompts_used: Vec<String>,
    /// Workflow name and shape
    pub workflow: String,
    pub results: Vec<RunRecord>,
    pub summary: BenchmarkSummary,
}

impl ResultsDocument {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            prompts_used: Vec::new(),
            workflow: workflow.into(),
            results: Vec::new(),
            summary: BenchmarkSummary::from_records(&[]),
        }
    }

    pub fn push(&mut self, record: RunRecord) {
        if record.outcome.is_success() && !self.prompts_used.contains(&record.identity.prompt) {
            self.prompts_used.push(record.identity.prompt.clone());
        }
        self.results.push(record);
        self.summary = BenchmarkSummary::from_records(&self.results);
    }

    /// Load a results file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write atomically: temp file, then rename
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move results into {}", path.display()))?;
        Ok(())
    }
}

/// `results_dir/benchmark_results_<timestamp>.json`
pub fn results_path(results_dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    results_dir.join(format!(
        "benchmark_results_{}.json",
        timestamp.format("%Y%m%d_%H%M%S")
    ))
}

/// Single writer for run records
pub struct ResultSink {
    document: ResultsDocument,
    path: Option<PathBuf>,
    progress: Option<Reporter>,
}

impl ResultSink {
    /// Sink that rewrites `path` after every record; `None` keeps results in memory
    pub fn new(workflow: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            document: ResultsDocument::new(workflow),
            path,
            progress: None,
        }
    }

    /// Print a progress line per record
    pub fn with_progress(mut self, reporter: Reporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Consume records until every sender is dropped
    ///
    /// A failed write is logged and retried with the next record.
    pub async fn consume(mut self, mut rx: OutcomeReceiver) -> ResultsDocument {
        while let Some(record) = rx.recv().await {
            if let Some(ref reporter) = self.progress {
                println!("{}", reporter.progress_line(&record));
            }
            self.document.push(record);

            if let Some(ref path) = self.path {
                if let Err(e) = self.document.save(path).await {
                    tracing::error!("Failed to persist results: {:#}", e);
                }
            }
        }

        if let Some(ref path) = self.path {
            tracing::info!(path = %path.display(), records = self.document.results.len(), "Results saved");
        }
        self.document
    }
}
