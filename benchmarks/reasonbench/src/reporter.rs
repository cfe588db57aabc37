//! Benchmark result reporting
//!
//! Generates formatted output in various formats (Terminal, Markdown, JSON, CSV).

use anyhow::Result;
use orchestrator::ProblemAnalysis;
use std::io::Write;

use crate::{BenchmarkSummary, RunOutcome, RunRecord};

/// Output format for benchmark reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable Markdown
    #[value(alias = "md")]
    Markdown,
    /// Machine-readable JSON
    Json,
    /// Spreadsheet-compatible CSV
    Csv,
    /// Compact terminal output
    #[value(alias = "term", alias = "console")]
    Terminal,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "terminal" | "term" | "console" => Ok(Self::Terminal),
            _ => Err(anyhow::anyhow!("Unknown format: {}", s)),
        }
    }
}

/// Benchmark report generator
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    format: OutputFormat,
}

const ANSWER_PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(ANSWER_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

impl Reporter {
    /// Create a new reporter with the specified format
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Generate a summary report
    pub fn summary(&self, summary: &BenchmarkSummary) -> String {
        match self.format {
            OutputFormat::Markdown => self.summary_markdown(summary),
            OutputFormat::Json => self.summary_json(summary),
            OutputFormat::Csv => self.summary_csv(summary),
            OutputFormat::Terminal => self.summary_terminal(summary),
        }
    }

    /// Generate detailed results report
    pub fn results(&self, records: &[RunRecord]) -> String {
        match self.format {
            OutputFormat::Markdown => self.results_markdown(records),
            OutputFormat::Json => self.results_json(records),
            OutputFormat::Csv => self.results_csv(records),
            OutputFormat::Terminal => self.results_terminal(records),
        }
    }

    /// One line per finished run: ✓ success, → skipped, ✗ failed
    pub fn progress_line(&self, record: &RunRecord) -> String {
        match &record.outcome {
            RunOutcome::Success(report) => {
                let problem_type = report
                    .response
                    .artifact::<ProblemAnalysis>()
                    .map(|a| a.problem_type)
                    .unwrap_or_default();
                let verified = report
                    .verification()
                    .map(|v| v.is_correct.to_string())
                    .unwrap_or_else(|| "n/a".to_string());
                let mut line = format!(
                    "  ✓ {} | {}ms | type: {} | answer: {} | verified: {}",
                    record.identity,
                    record.duration_ms,
                    problem_type,
                    preview(&report.answer().unwrap_or_default()),
                    verified
                );
                if !report.fallback_nodes.is_empty() {
                    line.push_str(&format!(" | fallback: {}", report.fallback_nodes.join(",")));
                }
                line
            }
            RunOutcome::Skipped { reason } => {
                format!("  → {} | skipped: {}", record.identity, reason)
            }
            RunOutcome::Failed { error } => {
                format!("  ✗ {} | error: {}", record.identity, error)
            }
        }
    }

    /// Write report to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W, content: &str) -> Result<()> {
        write!(writer, "{}", content)?;
        Ok(())
    }

    // === Markdown formatters ===

    fn summary_markdown(&self, summary: &BenchmarkSummary) -> String {
        let mut output = String::new();

        output.push_str("# Benchmark Summary\n\n");
        output.push_str(&format!(
            "**Date:** {}\n\n",
            summary.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        output.push_str("## Overall Results\n\n");
        output.push_str(&format!("- **Prompt Sets Tested:** {}\n", summary.total_prompts));
        output.push_str(&format!("- **Models Tested:** {}\n", summary.total_models));
        output.push_str(&format!("- **Successful:** {}\n", summary.successful));
        output.push_str(&format!("- **Skipped:** {}\n", summary.skipped));
        output.push_str(&format!("- **Failed:** {}\n", summary.failed));
        output.push_str(&format!("- **Verified Correct:** {}\n", summary.verified_correct));
        output.push_str(&format!("- **Used Fallback:** {}\n", summary.fallback_runs));
        output.push_str(&format!("- **Success Rate:** {:.1}%\n", summary.success_rate));
        output.push_str(&format!("- **Accuracy Rate:** {:.1}%\n\n", summary.accuracy_rate));

        output.push_str("## Results by Provider\n\n");
        output.push_str("| Provider | Runs | Successful | Skipped | Failed | Correct | Success Rate | Accuracy |\n");
        output.push_str("|----------|------|------------|---------|--------|---------|--------------|----------|\n");

        for provider in &summary.providers {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {:.1}% | {:.1}% |\n",
                provider.provider,
                provider.runs,
                provider.successful,
                provider.skipped,
                provider.failed,
                provider.verified_correct,
                provider.success_rate,
                provider.accuracy_rate
            ));
        }

        output
    }

    fn results_markdown(&self, records: &[RunRecord]) -> String {
        let mut output = String::new();

        output.push_str("# Detailed Benchmark Results\n\n");

        for record in records {
            let status = match record.outcome {
                RunOutcome::Success(_) => "✅ SUCCESS",
                RunOutcome::Skipped { .. } => "⏭️ SKIPPED",
                RunOutcome::Failed { .. } => "❌ FAILED",
            };
            output.push_str(&format!("## {} - {}\n\n", record.identity, status));
            output.push_str(&format!("- **Duration:** {}ms\n", record.duration_ms));

            match &record.outcome {
                RunOutcome::Success(report) => {
                    if let Some(answer) = report.answer() {
                        output.push_str(&format!("- **Answer:** {}\n", preview(&answer)));
                    }
                    if let Some(verification) = report.verification() {
                        output.push_str(&format!("- **Verified:** {}\n", verification.is_correct));
                        for issue in &verification.issues_found {
                            output.push_str(&format!("  - {}\n", issue));
                        }
                    }
                    if !report.fallback_nodes.is_empty() {
                        output.push_str(&format!(
                            "- **Fallback Nodes:** {}\n",
                            report.fallback_nodes.join(", ")
                        ));
                    }
                }
                RunOutcome::Skipped { reason } => {
                    output.push_str(&format!("- **Reason:** {}\n", reason));
                }
                RunOutcome::Failed { error } => {
                    output.push_str(&format!("\n**Error:** {}\n", error));
                }
            }

            output.push_str("\n---\n\n");
        }

        output
    }

    // === JSON formatters ===

    fn summary_json(&self, summary: &BenchmarkSummary) -> String {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
    }

    fn results_json(&self, records: &[RunRecord]) -> String {
        serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
    }

    // === CSV formatters ===

    fn summary_csv(&self, summary: &BenchmarkSummary) -> String {
        let mut output = String::new();
        output.push_str(
            "provider,runs,successful,skipped,failed,verified_correct,success_rate,accuracy_rate\n",
        );

        for provider in &summary.providers {
            output.push_str(&format!(
                "{},{},{},{},{},{},{:.2},{:.2}\n",
                provider.provider,
                provider.runs,
                provider.successful,
                provider.skipped,
                provider.failed,
                provider.verified_correct,
                provider.success_rate,
                provider.accuracy_rate
            ));
        }

        output
    }

    fn results_csv(&self, records: &[RunRecord]) -> String {
        let mut output = String::new();
        output.push_str("prompt,provider,model,status,duration_ms,is_correct,detail\n");

        for record in records {
            let (status, is_correct, detail) = match &record.outcome {
                RunOutcome::Success(report) => (
                    "success",
                    report
                        .verification()
                        .map(|v| v.is_correct.to_string())
                        .unwrap_or_default(),
                    report.answer().unwrap_or_default(),
                ),
                RunOutcome::Skipped { reason } => ("skipped", String::new(), reason.clone()),
                RunOutcome::Failed { error } => ("failed", String::new(), error.clone()),
            };
            output.push_str(&format!(
                "{},{},{},{},{},{},\"{}\"\n",
                record.identity.prompt,
                record.identity.provider,
                record.identity.model,
                status,
                record.duration_ms,
                is_correct,
                detail.replace('"', "\"\"")
            ));
        }

        output
    }

    // === Terminal formatters ===

    fn summary_terminal(&self, summary: &BenchmarkSummary) -> String {
        let mut output = String::new();

        let status = if summary.failed == 0 && summary.accuracy_rate >= 90.0 {
            "✅"
        } else if summary.success_rate >= 70.0 {
            "⚠️"
        } else {
            "❌"
        };

        output.push_str(&format!("\n{} Benchmark Summary\n", status));
        output.push_str(&format!(
            "   Prompt sets: {} | Models: {}\n",
            summary.total_prompts, summary.total_models
        ));
        output.push_str(&format!(
            "   Successful: {} | Failed: {}",
            summary.successful, summary.failed
        ));
        if summary.skipped > 0 {
            output.push_str(&format!(" | Skipped: {}", summary.skipped));
        }
        output.push('\n');
        output.push_str(&format!(
            "   Verified correct: {} | Used fallback: {}\n",
            summary.verified_correct, summary.fallback_runs
        ));
        output.push_str(&format!(
            "   Success rate: {:.1}% | Accuracy rate: {:.1}% | avg: {}ms\n\n",
            summary.success_rate, summary.accuracy_rate, summary.avg_duration_ms
        ));

        for provider in &summary.providers {
            output.push_str(&format!(
                "   {}: {}/{} successful, {} correct\n",
                provider.provider,
                provider.successful,
                provider.runs - provider.skipped,
                provider.verified_correct
            ));
        }

        output.push('\n');
        output
    }

    fn results_terminal(&self, records: &[RunRecord]) -> String {
        let mut output = String::new();

        for record in records {
            output.push_str(&self.progress_line(record));
            output.push('\n');
        }

        output
    }
}
