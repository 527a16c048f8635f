//! Scenario summary → human/json string formatting.

use docstore_engine::{Scenario, ScenarioReport};
use serde::Serialize;
use std::time::Duration;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Aggregate over every run of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub scenario: &'static str,
    pub experimental: bool,
    pub iterations: usize,
    pub passed: usize,
    pub violations: Vec<String>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl ScenarioSummary {
    pub fn new(scenario: Scenario) -> Self {
        ScenarioSummary {
            scenario: scenario.name(),
            experimental: scenario.is_experimental(),
            iterations: 0,
            passed: 0,
            violations: Vec::new(),
            errors: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Fold one run into the summary.
    pub fn record(&mut self, iteration: usize, report: &ScenarioReport) {
        self.iterations += 1;
        self.add_elapsed(report.elapsed);
        match report.check_exclusivity() {
            Ok(()) => self.passed += 1,
            Err(violation) => self
                .violations
                .push(format!("iteration {}: {}", iteration, violation)),
        }
    }

    /// Fold a run that failed before producing a report.
    pub fn record_error(&mut self, iteration: usize, error: impl std::fmt::Display) {
        self.iterations += 1;
        self.errors.push(format!("iteration {}: {}", iteration, error));
    }

    fn add_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms += elapsed.as_millis() as u64;
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.errors.is_empty()
    }
}

/// Format every scenario summary.
pub fn format_summaries(summaries: &[ScenarioSummary], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(summaries)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputMode::Human => summaries
            .iter()
            .map(format_human)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_human(summary: &ScenarioSummary) -> String {
    let status = if summary.is_clean() { "ok" } else { "FAILED" };
    let mut out = format!(
        "{:<36} {:>6}  {}/{} runs passed ({} ms){}",
        summary.scenario,
        status,
        summary.passed,
        summary.iterations,
        summary.elapsed_ms,
        if summary.experimental {
            "  [experimental]"
        } else {
            ""
        }
    );
    for line in summary.violations.iter().chain(summary.errors.iter()) {
        out.push_str("\n    ");
        out.push_str(line);
    }
    out
}
