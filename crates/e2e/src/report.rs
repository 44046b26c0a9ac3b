//! Issue aggregation and the run verdict
//!
//! The report is the single owner of accumulated issues and console events.
//! Flows receive it by reference and append; nothing else writes to it.
//! Rendering is deterministic (insertion order, then counts) because the
//! rendered text is the artifact humans and CI gates read.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HarnessResult;
use crate::events::ObservedEvent;
use crate::locator::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

/// Diagnostic context attached to an issue at record time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectors_tried: Option<String>,
}

impl IssueContext {
    fn is_empty(&self) -> bool {
        self.url.is_none() && self.selectors_tried.is_none()
    }
}

/// A detected deviation from expected behavior. Never mutated after being
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<IssueContext>,
}

impl Issue {
    pub fn new(severity: Severity, message: &str) -> Self {
        Self {
            severity,
            message: message.to_string(),
            context: None,
        }
    }

    pub fn blocking(message: &str) -> Self {
        Self::new(Severity::Blocking, message)
    }

    pub fn warning(message: &str) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.context
            .get_or_insert_with(IssueContext::default)
            .url = Some(url.to_string());
        self
    }

    pub fn with_target(mut self, target: &Target) -> Self {
        self.context
            .get_or_insert_with(IssueContext::default)
            .selectors_tried = Some(target.candidates_tried());
        self
    }
}

/// Counts derived from the accumulated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub blocking: usize,
    pub warnings: usize,
    pub console_errors: usize,
    pub exit_code: i32,
}

/// Structured record persisted next to the rendered report.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunArtifact {
    pub url: String,
    pub timestamp: String,
    pub issues: Vec<Issue>,
    pub console_events: Vec<ObservedEvent>,
    pub summary: RunSummary,
}

/// Append-only aggregator for one run.
#[derive(Debug, Default)]
pub struct RunReport {
    target_url: String,
    issues: Vec<Issue>,
    events: Vec<ObservedEvent>,
}

impl RunReport {
    pub fn new(target_url: &str) -> Self {
        Self {
            target_url: target_url.to_string(),
            issues: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn record_issue(&mut self, issue: Issue) {
        warn!("issue [{:?}] {}", issue.severity, issue.message);
        self.issues.push(issue);
    }

    /// Merge a session's error-class console events, in emission order.
    pub fn record_events(&mut self, events: Vec<ObservedEvent>) {
        self.events.extend(events);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Idempotent, side-effect-free summary of the accumulated state.
    pub fn summary(&self) -> RunSummary {
        let blocking = self
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Blocking)
            .count();
        let warnings = self.issues.len() - blocking;
        let console_errors = self.events.iter().filter(|e| e.kind.is_error()).count();
        let exit_code = if self.issues.is_empty() && console_errors == 0 {
            0
        } else {
            1
        };
        RunSummary {
            blocking,
            warnings,
            console_errors,
            exit_code,
        }
    }

    /// Deterministic textual report: issues in insertion order, then
    /// console-error counts, then the verdict.
    pub fn render(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();

        writeln!(out, "Acceptance report for {}", self.target_url).unwrap();
        writeln!(out, "{}", "=".repeat(60)).unwrap();

        if self.issues.is_empty() {
            writeln!(out, "No issues found.").unwrap();
        } else {
            writeln!(out, "Issues ({}):", self.issues.len()).unwrap();
            for (i, issue) in self.issues.iter().enumerate() {
                let tag = match issue.severity {
                    Severity::Blocking => "blocking",
                    Severity::Warning => "warning",
                };
                writeln!(out, "{:3}. [{}] {}", i + 1, tag, issue.message).unwrap();
                if let Some(context) = issue.context.as_ref().filter(|c| !c.is_empty()) {
                    if let Some(url) = &context.url {
                        writeln!(out, "       at: {}", url).unwrap();
                    }
                    if let Some(selectors) = &context.selectors_tried {
                        writeln!(out, "       selectors tried: {}", selectors).unwrap();
                    }
                }
            }
        }

        let errors: Vec<_> = self.events.iter().filter(|e| e.kind.is_error()).collect();
        if errors.is_empty() {
            writeln!(out, "No console errors captured.").unwrap();
        } else {
            writeln!(out, "Console errors ({}):", errors.len()).unwrap();
            for (i, event) in errors.iter().enumerate() {
                match &event.location {
                    Some(location) => {
                        writeln!(out, "{:3}. {} ({})", i + 1, event.text, location).unwrap()
                    }
                    None => writeln!(out, "{:3}. {}", i + 1, event.text).unwrap(),
                }
            }
        }

        writeln!(out, "{}", "-".repeat(60)).unwrap();
        writeln!(
            out,
            "{} blocking, {} warning(s), {} console error(s) -> {}",
            summary.blocking,
            summary.warnings,
            summary.console_errors,
            if summary.exit_code == 0 { "PASS" } else { "FAIL" }
        )
        .unwrap();

        out
    }

    /// Persist the structured record for post-run inspection.
    pub fn write_artifact(&self, dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let artifact = RunArtifact {
            url: self.target_url.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            issues: self.issues.clone(),
            console_events: self.events.clone(),
            summary: self.summary(),
        };
        let path = dir.join("acceptance-results.json");
        std::fs::write(&path, serde_json::to_string_pretty(&artifact)?)?;
        Ok(path)
    }
}
