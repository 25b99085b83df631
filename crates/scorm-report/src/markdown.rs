//! Markdown report rendering.
//!
//! [`MarkdownGenerator`] renders a [`Report`] for human review:
//!
//! - a summary table
//! - validation issues grouped by severity
//! - the course outline
//! - learner progress, when present
//!
//! # Example
//!
//! ```rust
//! use scorm_report::{MarkdownGenerator, ReportGenerator, ReportInput};
//!
//! let report = ReportGenerator::new(ReportInput {
//!     package_name: "intro".to_string(),
//!     ..ReportInput::default()
//! })
//! .generate();
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# SCORM Package Report: intro"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{Issue, IssueSeverity, LearnerProgress, OutlineEntry, Report};

/// Renders a [`Report`] as Markdown.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_issues(&mut output);
        self.write_outline(&mut output);
        if let Some(progress) = &self.report.progress {
            Self::write_progress(&mut output, progress);
        }
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# SCORM Package Report: {}\n",
            escape_markdown(&self.report.package_name)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let counts = self.report.issue_counts();

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", summary.status.description());
        if let Some(reason) = &summary.rejection {
            let _ = writeln!(output, "| Reason | {} |", escape_markdown(reason));
        }
        let _ = writeln!(
            output,
            "| Manifest | {} |",
            escape_markdown(&summary.manifest_identifier)
        );
        let _ = writeln!(output, "| Title | {} |", escape_markdown(&summary.title));
        let _ = writeln!(
            output,
            "| Schema | {} |",
            escape_markdown(&summary.schema_version)
        );
        let _ = writeln!(output, "| Items | {} |", summary.item_count);
        let _ = writeln!(output, "| Launchable SCOs | {} |", summary.launchable_count);
        let _ = writeln!(
            output,
            "| Issues | {} ({} errors, {} warnings) |",
            counts.total(),
            counts.errors,
            counts.warnings
        );
        let _ = writeln!(output);
    }

    /// Writes issues grouped by severity.
    fn write_issues(&self, output: &mut String) {
        let _ = writeln!(output, "## Validation\n");

        if self.report.issues.is_empty() {
            let _ = writeln!(output, "*No issues found.*\n");
            return;
        }

        for (severity, title) in [
            (IssueSeverity::Error, "Errors"),
            (IssueSeverity::Warning, "Warnings"),
        ] {
            let issues: Vec<&Issue> = self
                .report
                .issues
                .iter()
                .filter(|i| i.severity == severity)
                .collect();
            let _ = writeln!(output, "### {title}\n");
            if issues.is_empty() {
                let _ = writeln!(output, "*None*\n");
                continue;
            }
            for issue in issues {
                let _ = writeln!(output, "- {}", escape_markdown(&issue.message));
            }
            let _ = writeln!(output);
        }
    }

    fn write_outline(&self, output: &mut String) {
        let _ = writeln!(output, "## Course Outline\n");

        if self.report.outline.is_empty() {
            let _ = writeln!(output, "*No items.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Item | Launch | Prerequisites | Mastery |");
        let _ = writeln!(output, "|---|------|--------|---------------|---------|");
        for (index, entry) in self.report.outline.iter().enumerate() {
            Self::write_outline_row(output, index + 1, entry);
        }
        let _ = writeln!(output);
    }

    fn write_outline_row(output: &mut String, position: usize, entry: &OutlineEntry) {
        let indent = "&nbsp;&nbsp;".repeat(entry.depth as usize);
        let launch = if entry.launchable {
            entry
                .launch_href
                .as_deref()
                .map_or_else(|| "SCO".to_string(), |href| format!("`{}`", escape_inline_code(href)))
        } else {
            "-".to_string()
        };
        let prerequisites = entry
            .prerequisites
            .as_deref()
            .map_or_else(|| "-".to_string(), |p| format!("`{}`", escape_inline_code(p)));
        let mastery = entry
            .mastery_score
            .map_or_else(|| "-".to_string(), |m| format!("{m}"));

        let _ = writeln!(
            output,
            "| {position} | {indent}{} | {launch} | {prerequisites} | {mastery} |",
            escape_markdown(&entry.title)
        );
    }

    fn write_progress(output: &mut String, progress: &LearnerProgress) {
        let _ = writeln!(
            output,
            "## Progress: {}\n",
            escape_markdown(&progress.learner_id)
        );
        let _ = writeln!(
            output,
            "**Completed**: {} of {} tracked SCOs\n",
            progress.completed_count(),
            progress.scos.len()
        );

        if progress.launchable.is_empty() {
            let _ = writeln!(output, "**Launchable now**: *none*\n");
        } else {
            let launchable: Vec<String> = progress
                .launchable
                .iter()
                .map(|id| format!("`{}`", escape_inline_code(id)))
                .collect();
            let _ = writeln!(output, "**Launchable now**: {}\n", launchable.join(", "));
        }

        if progress.scos.is_empty() {
            let _ = writeln!(output, "*No attempts recorded.*\n");
            return;
        }

        let _ = writeln!(
            output,
            "| SCO | Completion | Success | Score | Attempt | Sessions |"
        );
        let _ = writeln!(
            output,
            "|-----|------------|---------|-------|---------|----------|"
        );
        for sco in &progress.scos {
            let score = sco
                .score_raw
                .map_or_else(|| "-".to_string(), |s| format!("{s}"));
            let _ = writeln!(
                output,
                "| {} | {} | {} | {score} | {} | {} |",
                escape_markdown(&sco.sco_id),
                sco.completion_status,
                sco.success_status,
                sco.attempt_number,
                sco.session_count
            );
        }
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.summary.generated_at);
        let _ = writeln!(output, "*Generated by scorm at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes special Markdown characters in text.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

fn escape_inline_code(text: &str) -> String {
    text.replace('`', "'").replace('|', "\\|")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{ReportGenerator, ReportInput, ScoProgress};

    fn sample_report() -> Report {
        ReportGenerator::new(ReportInput {
            package_name: "course".to_string(),
            manifest_identifier: "com.example.course".to_string(),
            title: "Course".to_string(),
            schema_version: "SCORM 1.2".to_string(),
            outline: vec![
                OutlineEntry::new("module", "Module 1"),
                OutlineEntry::new("sco1", "Lesson")
                    .depth(1)
                    .launchable(true)
                    .launch_href("lesson.html"),
                OutlineEntry::new("sco2", "Quiz")
                    .depth(1)
                    .launchable(true)
                    .launch_href("quiz.html")
                    .prerequisites("sco1")
                    .mastery_score(75.0),
            ],
            warnings: vec!["resource 'extra' is not referenced by any item".to_string()],
            progress: Some(LearnerProgress {
                learner_id: "alice".to_string(),
                launchable: vec!["sco1".to_string()],
                scos: vec![ScoProgress {
                    sco_id: "sco1".to_string(),
                    completion_status: "incomplete".to_string(),
                    success_status: "unknown".to_string(),
                    score_raw: None,
                    attempt_number: 1,
                    session_count: 1,
                }],
            }),
            ..ReportInput::default()
        })
        .generate_at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_generate_contains_title_and_summary() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();

        assert!(markdown.starts_with("# SCORM Package Report: course\n"));
        assert!(markdown.contains("| Status | Valid (ready for delivery) |"));
        assert!(markdown.contains("| Launchable SCOs | 2 |"));
        assert!(markdown.contains("| Issues | 1 (0 errors, 1 warnings) |"));
    }

    #[test]
    fn test_generate_groups_issues() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();

        assert!(markdown.contains("### Errors\n\n*None*\n"));
        assert!(markdown.contains("### Warnings\n\n- resource 'extra' is not referenced by any item\n"));
    }

    #[test]
    fn test_generate_outline_rows() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();

        assert!(markdown.contains("| 1 | Module 1 | - | - | - |"));
        assert!(markdown.contains("| 3 | &nbsp;&nbsp;Quiz | `quiz.html` | `sco1` | 75 |"));
    }

    #[test]
    fn test_generate_progress_and_footer() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();

        assert!(markdown.contains("## Progress: alice\n"));
        assert!(markdown.contains("**Completed**: 0 of 1 tracked SCOs"));
        assert!(markdown.contains("**Launchable now**: `sco1`"));
        assert!(markdown.contains("| sco1 | incomplete | unknown | - | 1 | 1 |"));
        assert!(markdown.ends_with("*Generated by scorm at 2026-03-01 12:00:00 UTC*\n"));
    }

    #[test]
    fn test_empty_report() {
        let markdown = MarkdownGenerator::new(&Report::default()).generate();

        assert!(markdown.contains("*No issues found.*"));
        assert!(markdown.contains("*No items.*"));
        assert!(!markdown.contains("## Progress"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("x|y"), "x\\|y");
        assert_eq!(escape_markdown("line\nbreak"), "line<br>break");
    }
}
