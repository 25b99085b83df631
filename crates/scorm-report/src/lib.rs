//! SCORM Report Generation
//!
//! Types and generators for reports on ingested SCORM packages. A report
//! covers the validation outcome, the course outline and, optionally, one
//! learner's progress. Reports serialize to JSON or render to Markdown.
//!
//! The input types are local to this crate so it does not depend on the
//! engine; callers convert their structures into a [`ReportInput`].
//!
//! # Example
//!
//! ```rust
//! use scorm_report::{OutlineEntry, PackageStatus, ReportGenerator, ReportInput};
//! use scorm_report::json::JsonGenerator;
//!
//! let input = ReportInput {
//!     package_name: "intro-course".to_string(),
//!     manifest_identifier: "com.example.intro".to_string(),
//!     title: "Introduction".to_string(),
//!     schema_version: "SCORM 1.2".to_string(),
//!     outline: vec![OutlineEntry::new("sco1", "Welcome").launchable(true)],
//!     ..ReportInput::default()
//! };
//!
//! let report = ReportGenerator::new(input).generate();
//! assert_eq!(report.summary.status, PackageStatus::Valid);
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("intro-course"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Package Status
// ============================================================================

/// Outcome of ingesting a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    /// The package passed validation and can be delivered.
    #[default]
    Valid,
    /// The package was ingested but failed validation.
    Invalid,
    /// The manifest could not be parsed or resolved.
    Rejected,
}

impl PackageStatus {
    /// Returns `true` if the package can be delivered.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Valid => "Valid (ready for delivery)",
            Self::Invalid => "Invalid (blocked by validation errors)",
            Self::Rejected => "Rejected (manifest could not be read)",
        }
    }
}

impl std::fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Report
// ============================================================================

/// Complete package report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Name the package was ingested under.
    pub package_name: String,

    /// High-level summary.
    pub summary: ReportSummary,

    /// Flattened course outline in delivery order.
    pub outline: Vec<OutlineEntry>,

    /// Validation errors and warnings, errors first.
    pub issues: Vec<Issue>,

    /// Progress of one learner, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<LearnerProgress>,
}

impl Report {
    /// Returns the number of issues by severity.
    #[must_use]
    pub fn issue_counts(&self) -> IssueCounts {
        let mut counts = IssueCounts::default();
        for issue in &self.issues {
            match issue.severity {
                IssueSeverity::Error => counts.errors += 1,
                IssueSeverity::Warning => counts.warnings += 1,
            }
        }
        counts
    }

    /// Returns `true` if the report contains any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }
}

/// Issue counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueCounts {
    /// Number of errors.
    pub errors: usize,
    /// Number of warnings.
    pub warnings: usize,
}

impl IssueCounts {
    /// Returns the total number of issues.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.errors + self.warnings
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

/// High-level summary of a package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Ingestion outcome.
    pub status: PackageStatus,

    /// Identifier declared by the manifest.
    pub manifest_identifier: String,

    /// Course title.
    pub title: String,

    /// SCORM edition, as displayed.
    pub schema_version: String,

    /// Number of outline entries.
    pub item_count: usize,

    /// Number of launchable SCOs.
    pub launchable_count: usize,

    /// Why the manifest was rejected, for [`PackageStatus::Rejected`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,

    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Outline
// ============================================================================

/// One item of the flattened course outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Item identifier.
    pub identifier: String,
    /// Item title.
    pub title: String,
    /// Nesting depth, 0 for top-level items.
    pub depth: u32,
    /// Whether the item launches a SCO.
    pub launchable: bool,
    /// Launch URL, for items with content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_href: Option<String>,
    /// Prerequisite expression, unless always satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<String>,
    /// Mastery score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery_score: Option<f64>,
}

impl OutlineEntry {
    /// Creates a top-level, non-launchable entry.
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the depth.
    #[must_use]
    pub const fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Marks the entry launchable or not.
    #[must_use]
    pub const fn launchable(mut self, launchable: bool) -> Self {
        self.launchable = launchable;
        self
    }

    /// Sets the launch URL.
    #[must_use]
    pub fn launch_href(mut self, href: impl Into<String>) -> Self {
        self.launch_href = Some(href.into());
        self
    }

    /// Sets the prerequisite expression.
    #[must_use]
    pub fn prerequisites(mut self, expr: impl Into<String>) -> Self {
        self.prerequisites = Some(expr.into());
        self
    }

    /// Sets the mastery score.
    #[must_use]
    pub const fn mastery_score(mut self, score: f64) -> Self {
        self.mastery_score = Some(score);
        self
    }
}

// ============================================================================
// Issues
// ============================================================================

/// A validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// How serious the finding is.
    pub severity: IssueSeverity,
    /// Description of the finding.
    pub message: String,
}

impl Issue {
    /// Creates an error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    /// Creates a warning.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

/// Severity of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Blocks delivery of the package.
    Error,
    /// Tolerated, but worth fixing.
    Warning,
}

impl IssueSeverity {
    /// Returns the label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Learner Progress
// ============================================================================

/// One learner's standing in a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerProgress {
    /// The learner.
    pub learner_id: String,
    /// SCOs the learner may launch now.
    pub launchable: Vec<String>,
    /// Per-SCO records, in outline order.
    pub scos: Vec<ScoProgress>,
}

impl LearnerProgress {
    /// Number of SCOs whose completion is `completed`.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.scos
            .iter()
            .filter(|s| s.completion_status == "completed")
            .count()
    }
}

/// A learner's record for one SCO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoProgress {
    /// The SCO.
    pub sco_id: String,
    /// Completion status, as serialized by the engine.
    pub completion_status: String,
    /// Success status, as serialized by the engine.
    pub success_status: String,
    /// Last raw score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_raw: Option<f64>,
    /// Attempt number, starting at 1.
    pub attempt_number: u32,
    /// Sessions started in the current attempt.
    pub session_count: u32,
}

// ============================================================================
// Report Generation
// ============================================================================

/// Everything needed to produce a [`Report`].
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    /// Name the package was ingested under.
    pub package_name: String,
    /// Identifier declared by the manifest.
    pub manifest_identifier: String,
    /// Course title.
    pub title: String,
    /// SCORM edition, as displayed.
    pub schema_version: String,
    /// Why the manifest was rejected, if it was.
    pub rejection: Option<String>,
    /// Flattened outline.
    pub outline: Vec<OutlineEntry>,
    /// Validation errors.
    pub errors: Vec<String>,
    /// Validation warnings.
    pub warnings: Vec<String>,
    /// Learner progress, if requested.
    pub progress: Option<LearnerProgress>,
}

/// Turns a [`ReportInput`] into a [`Report`].
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    input: ReportInput,
}

impl ReportGenerator {
    /// Creates a generator for the given input.
    #[must_use]
    pub const fn new(input: ReportInput) -> Self {
        Self { input }
    }

    /// Generates the report, stamped with the current time.
    #[must_use]
    pub fn generate(self) -> Report {
        self.generate_at(Utc::now())
    }

    /// Generates the report with a fixed timestamp.
    #[must_use]
    pub fn generate_at(self, generated_at: DateTime<Utc>) -> Report {
        let input = self.input;

        let status = if input.rejection.is_some() {
            PackageStatus::Rejected
        } else if input.errors.is_empty() {
            PackageStatus::Valid
        } else {
            PackageStatus::Invalid
        };

        let issues = input
            .errors
            .into_iter()
            .map(Issue::error)
            .chain(input.warnings.into_iter().map(Issue::warning))
            .collect();

        let summary = ReportSummary {
            status,
            manifest_identifier: input.manifest_identifier,
            title: input.title,
            schema_version: input.schema_version,
            item_count: input.outline.len(),
            launchable_count: input.outline.iter().filter(|e| e.launchable).count(),
            rejection: input.rejection,
            generated_at,
        };

        Report {
            package_name: input.package_name,
            summary,
            outline: input.outline,
            issues,
            progress: input.progress,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
