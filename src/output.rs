// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: One summary line per image in normal, quiet (CI), and JSON output modes.

use crate::diagnostics::Warning;
use crate::upgrade::{Disposition, SessionReport, UpgradeOutcome};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only upgrades and failures)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print the result line for one image.
    pub fn outcome(&self, outcome: &UpgradeOutcome) {
        match self.mode {
            OutputMode::Normal => println!("{}", outcome_line(outcome)),
            OutputMode::Quiet => {
                if !matches!(outcome.disposition, Disposition::Skipped) {
                    println!("{}", outcome_line(outcome));
                }
            }
            OutputMode::Json => {
                let event = OutcomeEvent::from(outcome);
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    /// Print the end-of-run summary with optional timing.
    pub fn summary(&self, report: &SessionReport) {
        for warning in &report.warnings {
            self.warning(warning);
        }
        match self.mode {
            OutputMode::Normal => {
                for name in &report.stopped_containers {
                    println!("stopped {name}");
                }
                let message = summary_line(report);
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                if report.failures() > 0 {
                    println!("{}", summary_line(report));
                }
            }
            OutputMode::Json => {
                let event = SummaryEvent {
                    event: "summary",
                    upgraded: report.upgrades(),
                    failed: report.failures(),
                    total: report.outcomes.len(),
                    stopped_containers: &report.stopped_containers,
                    warnings: report.warnings.len(),
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    fn warning(&self, warning: &Warning) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {}", warning.message),
            OutputMode::Quiet => {}
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "warning",
                    message: &warning.message,
                    duration_secs: None,
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

/// `app:1: upgraded sha256:... -> sha256:... (debian)` and friends.
pub fn outcome_line(outcome: &UpgradeOutcome) -> String {
    let label = outcome.target.label();
    match &outcome.disposition {
        Disposition::Upgraded { new_image } => format!(
            "{label}: upgraded {} -> {} ({})",
            outcome.target.id.short(),
            new_image.short(),
            outcome.status_token
        ),
        Disposition::Skipped => format!("{label}: up to date ({})", outcome.status_token),
        Disposition::Failed(kind) => match outcome.exit_code {
            Some(code) if code != 0 => format!("{label}: FAILED {kind} (exit {code})"),
            _ => format!("{label}: FAILED {kind}"),
        },
    }
}

fn summary_line(report: &SessionReport) -> String {
    format!(
        "{} upgraded, {} failed, {} total",
        report.upgrades(),
        report.failures(),
        report.outcomes.len()
    )
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct OutcomeEvent<'a> {
    event: &'a str,
    image: &'a str,
    tags: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_image: Option<&'a str>,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a UpgradeOutcome> for OutcomeEvent<'a> {
    fn from(outcome: &'a UpgradeOutcome) -> Self {
        let (event, error) = match &outcome.disposition {
            Disposition::Upgraded { .. } => ("upgraded", None),
            Disposition::Skipped => ("skipped", None),
            Disposition::Failed(kind) => ("failed", Some(kind.to_string())),
        };
        OutcomeEvent {
            event,
            image: outcome.target.id.as_str(),
            tags: outcome.target.tags.iter().map(String::as_str).collect(),
            new_image: outcome.new_image_id().map(|id| id.as_str()),
            status: outcome.status_token.as_str(),
            exit_code: outcome.exit_code,
            error,
        }
    }
}

#[derive(Serialize)]
struct SummaryEvent<'a> {
    event: &'a str,
    upgraded: usize,
    failed: usize,
    total: usize,
    stopped_containers: &'a [String],
    warnings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
