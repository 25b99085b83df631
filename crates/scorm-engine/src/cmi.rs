//! Mapping of CMI data model values onto completion reports.
//!
//! Content frames talk to the LMS through `SetValue("cmi.…", value)` and
//! `Commit()`. The buffered values of one commit arrive here as a map and
//! are reduced to a [`CompletionReport`]. Elements that do not affect
//! tracking are accepted and dropped.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attempt::{CompletionReport, CompletionStatus, SuccessStatus};
use crate::error::AttemptError;
use crate::manifest::SchemaVersion;

const SCORM12_ELEMENTS: &[&str] = &[
    "cmi.core.student_id",
    "cmi.core.student_name",
    "cmi.core.lesson_location",
    "cmi.core.lesson_status",
    "cmi.core.credit",
    "cmi.core.entry",
    "cmi.core.exit",
    "cmi.core.score.raw",
    "cmi.core.score.min",
    "cmi.core.score.max",
    "cmi.core.total_time",
    "cmi.core.session_time",
    "cmi.suspend_data",
    "cmi.launch_data",
    "cmi.comments",
    "cmi.comments_from_lms",
];

const SCORM2004_ELEMENTS: &[&str] = &[
    "cmi.learner_id",
    "cmi.learner_name",
    "cmi.location",
    "cmi.completion_status",
    "cmi.success_status",
    "cmi.credit",
    "cmi.entry",
    "cmi.exit",
    "cmi.mode",
    "cmi.score.scaled",
    "cmi.score.raw",
    "cmi.score.min",
    "cmi.score.max",
    "cmi.total_time",
    "cmi.session_time",
    "cmi.progress_measure",
    "cmi.max_time_allowed",
    "cmi.time_limit_action",
    "cmi.scaled_passing_score",
    "cmi.suspend_data",
    "cmi.launch_data",
];

static SCORM12_INDEXED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^cmi\.(objectives|interactions)\.(\d+\.|_count$)").ok());

static SCORM2004_INDEXED: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^cmi\.(objectives|interactions|comments_from_learner|comments_from_lms)\.(\d+\.|_count$)").ok()
});

/// Returns `true` if `element` belongs to the data model of `schema`.
#[must_use]
pub fn is_supported_element(schema: SchemaVersion, element: &str) -> bool {
    let known = match schema {
        SchemaVersion::Scorm12 => SCORM12_ELEMENTS,
        SchemaVersion::Scorm2004 => SCORM2004_ELEMENTS,
    };
    let indexed: &Option<Regex> = match schema {
        SchemaVersion::Scorm12 => &SCORM12_INDEXED,
        SchemaVersion::Scorm2004 => &SCORM2004_INDEXED,
    };
    known.contains(&element) || indexed.as_ref().is_some_and(|re| re.is_match(element))
}

impl CompletionReport {
    /// Builds a report from the CMI values of one commit.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnsupportedElement` for names outside the data
    /// model and `AttemptError::InvalidValue` for values outside an
    /// element's vocabulary or range.
    ///
    /// # Example
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use scorm_engine::{CompletionReport, CompletionStatus, SchemaVersion, SuccessStatus};
    ///
    /// let mut cmi = BTreeMap::new();
    /// cmi.insert("cmi.core.lesson_status".to_string(), "passed".to_string());
    /// cmi.insert("cmi.core.score.raw".to_string(), "92".to_string());
    ///
    /// let report = CompletionReport::from_cmi(SchemaVersion::Scorm12, &cmi).unwrap();
    /// assert_eq!(report.completion_status, Some(CompletionStatus::Completed));
    /// assert_eq!(report.success_status, Some(SuccessStatus::Passed));
    /// assert_eq!(report.score_raw, Some(92.0));
    /// ```
    pub fn from_cmi(
        schema: SchemaVersion,
        values: &BTreeMap<String, String>,
    ) -> Result<Self, AttemptError> {
        if let Some(element) = values.keys().find(|k| !is_supported_element(schema, k)) {
            return Err(AttemptError::UnsupportedElement(element.clone()));
        }

        let mut report = Self::new();
        report.suspend_data = values.get("cmi.suspend_data").cloned();

        match schema {
            SchemaVersion::Scorm12 => {
                if let Some(status) = values.get("cmi.core.lesson_status") {
                    let (completion, success) = lesson_status(status)?;
                    report.completion_status = Some(completion);
                    report.success_status = success;
                }
                report.score_raw = number(values, "cmi.core.score.raw")?;
            }
            SchemaVersion::Scorm2004 => {
                if let Some(status) = values.get("cmi.completion_status") {
                    report.completion_status = completion_status(status)?;
                }
                if let Some(status) = values.get("cmi.success_status") {
                    report.success_status = Some(success_status(status)?);
                }
                let scaled = ranged(values, "cmi.score.scaled", -1.0, 1.0)?;
                report.progress_measure = ranged(values, "cmi.progress_measure", 0.0, 1.0)?;
                report.score_raw = match number(values, "cmi.score.raw")? {
                    Some(raw) => Some(raw),
                    None => scaled.filter(|s| *s >= 0.0).map(|s| s * 100.0),
                };
            }
        }

        Ok(report)
    }
}

fn lesson_status(value: &str) -> Result<(CompletionStatus, Option<SuccessStatus>), AttemptError> {
    match value.trim() {
        "passed" => Ok((CompletionStatus::Completed, Some(SuccessStatus::Passed))),
        "failed" => Ok((CompletionStatus::Completed, Some(SuccessStatus::Failed))),
        "completed" => Ok((CompletionStatus::Completed, None)),
        "incomplete" | "browsed" => Ok((CompletionStatus::Incomplete, None)),
        "not attempted" => Ok((CompletionStatus::NotAttempted, None)),
        _ => Err(invalid(
            "cmi.core.lesson_status",
            value,
            "expected passed, failed, completed, incomplete, browsed or not attempted",
        )),
    }
}

fn completion_status(value: &str) -> Result<Option<CompletionStatus>, AttemptError> {
    match value.trim() {
        "completed" => Ok(Some(CompletionStatus::Completed)),
        "incomplete" => Ok(Some(CompletionStatus::Incomplete)),
        "not attempted" => Ok(Some(CompletionStatus::NotAttempted)),
        "unknown" => Ok(None),
        _ => Err(invalid(
            "cmi.completion_status",
            value,
            "expected completed, incomplete, not attempted or unknown",
        )),
    }
}

fn success_status(value: &str) -> Result<SuccessStatus, AttemptError> {
    match value.trim() {
        "passed" => Ok(SuccessStatus::Passed),
        "failed" => Ok(SuccessStatus::Failed),
        "unknown" => Ok(SuccessStatus::Unknown),
        _ => Err(invalid(
            "cmi.success_status",
            value,
            "expected passed, failed or unknown",
        )),
    }
}

/// Reads an optional decimal. An empty string counts as absent.
fn number(values: &BTreeMap<String, String>, element: &str) -> Result<Option<f64>, AttemptError> {
    let Some(raw) = values.get(element).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(invalid(element, raw, "expected a decimal number")),
    }
}

fn ranged(
    values: &BTreeMap<String, String>,
    element: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, AttemptError> {
    match number(values, element)? {
        Some(value) if !(min..=max).contains(&value) => Err(invalid(
            element,
            &value.to_string(),
            &format!("must be between {min} and {max}"),
        )),
        other => Ok(other),
    }
}

fn invalid(element: &str, value: &str, reason: &str) -> AttemptError {
    AttemptError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
