//! Learner attempt state and the tracker state machine.
//!
//! Each (learner, SCO) pair owns one [`AttemptState`]. Completion only moves
//! forward (`NotAttempted -> Incomplete -> Completed`); success status is
//! orthogonal (`Unknown -> Passed | Failed`). All transitions go through
//! [`AttemptTracker`], which validates a report against a copy of the record
//! and commits only when every check passes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AttemptError;
use crate::prerequisite::AttemptLookup;
use crate::tree::Sco;

/// Default and maximum size of stored suspend data (64 KiB).
pub const MAX_SUSPEND_DATA_BYTES: usize = 64 * 1024;

// ============================================================================
// Status enums
// ============================================================================

/// How far the learner got through a SCO.
///
/// Variants are ordered: a later variant is further along.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Never launched or nothing reported yet (initial state).
    #[default]
    NotAttempted,
    /// Launched but not finished.
    Incomplete,
    /// Finished.
    Completed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "not_attempted"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Whether the learner met the SCO's success criteria.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessStatus {
    /// No verdict yet (initial state).
    #[default]
    Unknown,
    /// Success criteria met.
    Passed,
    /// Success criteria not met.
    Failed,
}

impl SuccessStatus {
    /// Returns `true` for `Passed` or `Failed`.
    #[must_use]
    pub const fn is_verdict(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

impl fmt::Display for SuccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a SCO is entered when launched (`cmi.entry`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryMode {
    /// First launch, or nothing worth resuming.
    #[serde(rename = "ab-initio")]
    AbInitio,
    /// Continuing a suspended attempt.
    #[serde(rename = "resume")]
    Resume,
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbInitio => write!(f, "ab-initio"),
            Self::Resume => write!(f, "resume"),
        }
    }
}

// ============================================================================
// Attempt state
// ============================================================================

/// Runtime state of one learner on one SCO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptState {
    /// Progress through the SCO.
    pub completion_status: CompletionStatus,

    /// Verdict on the SCO's success criteria.
    pub success_status: SuccessStatus,

    /// Last reported raw score (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_raw: Option<f64>,

    /// Opaque resume state written by the SCO.
    #[serde(default)]
    pub suspend_data: String,

    /// Number of sessions started on this attempt.
    pub session_count: u32,

    /// Sequence number of this attempt, starting at 1.
    pub attempt_number: u32,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last touched by a session or report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptState {
    /// Creates a first attempt in `NotAttempted` / `Unknown`.
    #[must_use]
    pub fn new() -> Self {
        Self::numbered(1)
    }

    fn numbered(attempt_number: u32) -> Self {
        Self {
            completion_status: CompletionStatus::NotAttempted,
            success_status: SuccessStatus::Unknown,
            score_raw: None,
            suspend_data: String::new(),
            session_count: 0,
            attempt_number,
            created_at: Utc::now(),
            last_accessed_at: None,
        }
    }

    /// Returns `true` once the SCO is completed with a pass/fail verdict.
    ///
    /// # Example
    ///
    /// ```
    /// use scorm_engine::{AttemptState, CompletionStatus, SuccessStatus};
    ///
    /// let mut state = AttemptState::new();
    /// assert!(!state.is_terminal());
    ///
    /// state.completion_status = CompletionStatus::Completed;
    /// state.success_status = SuccessStatus::Failed;
    /// assert!(state.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.completion_status, CompletionStatus::Completed)
            && self.success_status.is_verdict()
    }

    /// Returns `true` if a later launch should resume rather than restart.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.session_count > 0
            && (!self.suspend_data.is_empty()
                || self.completion_status == CompletionStatus::Incomplete)
    }

    fn touch(&mut self) {
        self.last_accessed_at = Some(Utc::now());
    }
}

// ============================================================================
// Learner attempts
// ============================================================================

/// All attempt records of one learner in one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerAttempts {
    /// Current attempt per SCO identifier.
    #[serde(default)]
    pub attempts: BTreeMap<String, AttemptState>,

    /// Earlier attempts replaced by a re-take, oldest first.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub superseded: BTreeMap<String, Vec<AttemptState>>,
}

impl LearnerAttempts {
    /// Creates an empty set of attempts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current attempt on a SCO, if the learner ever launched it.
    #[must_use]
    pub fn get(&self, sco_id: &str) -> Option<&AttemptState> {
        self.attempts.get(sco_id)
    }

    /// Replaces this SCO's records with the ones held by `other`.
    pub fn merge_sco(&mut self, sco_id: &str, other: &Self) {
        if let Some(state) = other.attempts.get(sco_id) {
            self.attempts.insert(sco_id.to_string(), state.clone());
        }
        if let Some(history) = other.superseded.get(sco_id) {
            self.superseded.insert(sco_id.to_string(), history.clone());
        }
    }
}

impl AttemptLookup for BTreeMap<String, AttemptState> {
    fn completion_status(&self, sco_id: &str) -> CompletionStatus {
        self.get(sco_id)
            .map_or(CompletionStatus::NotAttempted, |s| s.completion_status)
    }

    fn success_status(&self, sco_id: &str) -> SuccessStatus {
        self.get(sco_id)
            .map_or(SuccessStatus::Unknown, |s| s.success_status)
    }

    fn attempted(&self, sco_id: &str) -> bool {
        self.get(sco_id).is_some_and(|s| {
            s.session_count > 0 || s.completion_status != CompletionStatus::NotAttempted
        })
    }
}

impl AttemptLookup for LearnerAttempts {
    fn completion_status(&self, sco_id: &str) -> CompletionStatus {
        self.attempts.completion_status(sco_id)
    }

    fn success_status(&self, sco_id: &str) -> SuccessStatus {
        self.attempts.success_status(sco_id)
    }

    fn attempted(&self, sco_id: &str) -> bool {
        self.attempts.attempted(sco_id)
    }
}

// ============================================================================
// Reports and outcomes
// ============================================================================

/// Values a SCO commits, the equivalent of `SetValue` + `Commit`.
///
/// Every field is optional; absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompletionReport {
    /// Reported completion status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<CompletionStatus>,

    /// Reported success status. `Unknown` never erases a verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_status: Option<SuccessStatus>,

    /// Reported raw score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_raw: Option<f64>,

    /// Reported suspend data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_data: Option<String>,

    /// Reported progress measure (0.0 - 1.0), judged against the SCO's
    /// completion threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_measure: Option<f64>,
}

impl CompletionReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the completion status.
    #[must_use]
    pub const fn completion(mut self, status: CompletionStatus) -> Self {
        self.completion_status = Some(status);
        self
    }

    /// Sets the success status.
    #[must_use]
    pub const fn success(mut self, status: SuccessStatus) -> Self {
        self.success_status = Some(status);
        self
    }

    /// Sets the raw score.
    #[must_use]
    pub const fn score(mut self, score: f64) -> Self {
        self.score_raw = Some(score);
        self
    }

    /// Sets the suspend data.
    #[must_use]
    pub fn suspend_data(mut self, data: impl Into<String>) -> Self {
        self.suspend_data = Some(data.into());
        self
    }

    /// Sets the progress measure.
    #[must_use]
    pub const fn progress(mut self, measure: f64) -> Self {
        self.progress_measure = Some(measure);
        self
    }

    /// Completion to apply once the SCO's completion threshold is taken
    /// into account.
    ///
    /// A progress measure at or above the threshold completes the SCO. Below
    /// it, an explicit status wins; without one a first report counts as
    /// incomplete.
    fn effective_completion(&self, sco: &Sco, current: CompletionStatus) -> Option<CompletionStatus> {
        match (sco.completion_threshold, self.progress_measure) {
            (Some(threshold), Some(measure)) if measure >= threshold => {
                Some(CompletionStatus::Completed)
            }
            (Some(_), Some(_)) => self.completion_status.or_else(|| {
                (current < CompletionStatus::Incomplete).then_some(CompletionStatus::Incomplete)
            }),
            _ => self.completion_status,
        }
    }

    fn explicit_verdict(&self) -> bool {
        self.success_status.is_some_and(|s| s.is_verdict())
    }
}

/// Result of [`AttemptTracker::start_session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    /// How the SCO should initialize itself.
    pub entry: EntryMode,
    /// The record after the session was counted.
    pub state: AttemptState,
}

/// Result of an accepted [`AttemptTracker::report_completion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    /// The record after the report was applied.
    pub state: AttemptState,
    /// Suspend data exceeded the limit and was cut.
    pub suspend_data_truncated: bool,
    /// The report regressed completion and started a new attempt.
    pub new_attempt: bool,
}

// ============================================================================
// Tracker
// ============================================================================

/// Rules the tracker enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerPolicy {
    /// Whether a completion regression starts a new attempt instead of failing.
    pub allow_reattempts: bool,
    /// Maximum stored suspend data in bytes.
    pub suspend_data_limit: usize,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            allow_reattempts: false,
            suspend_data_limit: MAX_SUSPEND_DATA_BYTES,
        }
    }
}

impl From<&Config> for TrackerPolicy {
    fn from(config: &Config) -> Self {
        Self {
            allow_reattempts: config.allow_reattempts,
            suspend_data_limit: config.suspend_data_limit.min(MAX_SUSPEND_DATA_BYTES),
        }
    }
}

/// Applies session starts and completion reports to a learner's attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptTracker {
    policy: TrackerPolicy,
}

impl AttemptTracker {
    /// Creates a tracker enforcing the given policy.
    #[must_use]
    pub const fn new(policy: TrackerPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> TrackerPolicy {
        self.policy
    }

    /// Counts a new session on `sco`, creating its record on first launch.
    ///
    /// Starting twice keeps a single record and counts two sessions.
    pub fn start_session(
        &self,
        attempts: &mut LearnerAttempts,
        sco: &Sco,
    ) -> Result<SessionStart, AttemptError> {
        if !sco.is_launchable {
            return Err(AttemptError::NotLaunchable(sco.identifier.clone()));
        }

        let state = attempts
            .attempts
            .entry(sco.identifier.clone())
            .or_insert_with(AttemptState::new);

        let entry = if state.is_resumable() {
            EntryMode::Resume
        } else {
            EntryMode::AbInitio
        };
        state.session_count += 1;
        state.touch();

        debug!(
            sco = %sco.identifier,
            sessions = state.session_count,
            entry = %entry,
            "Session started"
        );

        Ok(SessionStart {
            entry,
            state: state.clone(),
        })
    }

    /// Applies a committed report to the SCO's record.
    ///
    /// On any error the stored record is left exactly as it was.
    pub fn report_completion(
        &self,
        attempts: &mut LearnerAttempts,
        sco: &Sco,
        report: &CompletionReport,
    ) -> Result<CommitOutcome, AttemptError> {
        let current = attempts
            .get(&sco.identifier)
            .ok_or_else(|| AttemptError::NotStarted(sco.identifier.clone()))?;

        if let Some(score) = report.score_raw {
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(AttemptError::InvalidScore(score));
            }
        }
        if let Some(measure) = report.progress_measure {
            if !measure.is_finite() || !(0.0..=1.0).contains(&measure) {
                return Err(AttemptError::InvalidValue {
                    element: "progress_measure".to_string(),
                    value: measure.to_string(),
                    reason: "must be between 0 and 1".to_string(),
                });
            }
        }

        let mut next = current.clone();
        let mut retired = None;

        if let Some(reported) = report.effective_completion(sco, current.completion_status) {
            if reported < current.completion_status {
                if !self.policy.allow_reattempts {
                    return Err(AttemptError::IllegalRegression {
                        sco_id: sco.identifier.clone(),
                        from: current.completion_status,
                        to: reported,
                    });
                }
                retired = Some(current.clone());
                next = AttemptState::numbered(current.attempt_number + 1);
                next.session_count = 1;
            }
            next.completion_status = reported;
        }

        if report.explicit_verdict() {
            if let Some(verdict) = report.success_status {
                next.success_status = verdict;
            }
        }

        if let Some(score) = report.score_raw {
            next.score_raw = Some(score);
            if let Some(mastery) = sco.mastery_score {
                if score >= mastery && !report.explicit_verdict() {
                    next.success_status = SuccessStatus::Passed;
                }
            }
        }

        let mut suspend_data_truncated = false;
        if let Some(data) = &report.suspend_data {
            let kept = truncate_on_char_boundary(data, self.policy.suspend_data_limit);
            if kept.len() < data.len() {
                warn!(
                    sco = %sco.identifier,
                    reported_bytes = data.len(),
                    kept_bytes = kept.len(),
                    "Suspend data exceeds limit; truncating"
                );
                suspend_data_truncated = true;
            }
            next.suspend_data = kept.to_string();
        }

        next.touch();

        let new_attempt = retired.is_some();
        if let Some(old) = retired {
            attempts
                .superseded
                .entry(sco.identifier.clone())
                .or_default()
                .push(old);
        }
        attempts
            .attempts
            .insert(sco.identifier.clone(), next.clone());

        debug!(
            sco = %sco.identifier,
            completion = %next.completion_status,
            success = %next.success_status,
            score = ?next.score_raw,
            new_attempt,
            "Report applied"
        );

        Ok(CommitOutcome {
            state: next,
            suspend_data_truncated,
            new_attempt,
        })
    }
}

/// Longest prefix of `data` that fits in `limit` bytes without splitting a char.
fn truncate_on_char_boundary(data: &str, limit: usize) -> &str {
    if data.len() <= limit {
        return data;
    }
    let mut end = limit;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    &data[..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::manifest::ScormType;
    use crate::prerequisite::PrerequisiteExpr;

    fn sco(id: &str, mastery: Option<f64>) -> Sco {
        Sco {
            identifier: id.to_string(),
            title: id.to_uppercase(),
            untitled: false,
            organization_id: "org".to_string(),
            parent_id: None,
            depth: 0,
            resource_id: format!("res_{id}"),
            launch_href: format!("{id}/index.html"),
            scorm_type: ScormType::Sco,
            is_launchable: true,
            is_visible: true,
            mastery_score: mastery,
            completion_threshold: None,
            seq_order: 1,
            prerequisites: PrerequisiteExpr::Always,
            launch_data: None,
            max_time_allowed: None,
            time_limit_action: None,
        }
    }

    fn started(tracker: &AttemptTracker, sco: &Sco) -> LearnerAttempts {
        let mut attempts = LearnerAttempts::new();
        tracker.start_session(&mut attempts, sco).unwrap();
        attempts
    }

    // ------------------------------------------------------------------------
    // Status basics
    // ------------------------------------------------------------------------

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CompletionStatus::NotAttempted).unwrap(),
            "\"not_attempted\""
        );
        assert_eq!(
            serde_json::to_string(&SuccessStatus::Passed).unwrap(),
            "\"passed\""
        );
        assert_eq!(
            serde_json::to_string(&EntryMode::AbInitio).unwrap(),
            "\"ab-initio\""
        );
    }

    #[test]
    fn test_completion_ordering() {
        assert!(CompletionStatus::NotAttempted < CompletionStatus::Incomplete);
        assert!(CompletionStatus::Incomplete < CompletionStatus::Completed);
    }

    #[test]
    fn test_new_state_defaults() {
        let state = AttemptState::new();
        assert_eq!(state.completion_status, CompletionStatus::NotAttempted);
        assert_eq!(state.success_status, SuccessStatus::Unknown);
        assert_eq!(state.session_count, 0);
        assert_eq!(state.attempt_number, 1);
        assert!(state.last_accessed_at.is_none());
    }

    // ------------------------------------------------------------------------
    // start_session
    // ------------------------------------------------------------------------

    #[test]
    fn test_start_session_twice_keeps_one_record() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = LearnerAttempts::new();

        let first = tracker.start_session(&mut attempts, &a).unwrap();
        let second = tracker.start_session(&mut attempts, &a).unwrap();

        assert_eq!(attempts.attempts.len(), 1);
        assert_eq!(first.state.session_count, 1);
        assert_eq!(second.state.session_count, 2);
        assert!(second.state.last_accessed_at.is_some());
    }

    #[test]
    fn test_start_session_rejects_asset() {
        let tracker = AttemptTracker::default();
        let mut asset = sco("glossary", None);
        asset.scorm_type = ScormType::Asset;
        asset.is_launchable = false;

        let mut attempts = LearnerAttempts::new();
        let err = tracker.start_session(&mut attempts, &asset).unwrap_err();
        assert_eq!(err, AttemptError::NotLaunchable("glossary".to_string()));
        assert!(attempts.attempts.is_empty());
    }

    #[test]
    fn test_entry_mode_resume_after_suspend() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let report = CompletionReport::new()
            .completion(CompletionStatus::Incomplete)
            .suspend_data("page=3");
        tracker.report_completion(&mut attempts, &a, &report).unwrap();

        let again = tracker.start_session(&mut attempts, &a).unwrap();
        assert_eq!(again.entry, EntryMode::Resume);
    }

    #[test]
    fn test_entry_mode_ab_initio_on_first_launch() {
        let tracker = AttemptTracker::default();
        let mut attempts = LearnerAttempts::new();
        let start = tracker.start_session(&mut attempts, &sco("a", None)).unwrap();
        assert_eq!(start.entry, EntryMode::AbInitio);
    }

    // ------------------------------------------------------------------------
    // report_completion
    // ------------------------------------------------------------------------

    #[test]
    fn test_report_requires_session() {
        let tracker = AttemptTracker::default();
        let mut attempts = LearnerAttempts::new();
        let report = CompletionReport::new().completion(CompletionStatus::Completed);
        let err = tracker
            .report_completion(&mut attempts, &sco("a", None), &report)
            .unwrap_err();
        assert_eq!(err, AttemptError::NotStarted("a".to_string()));
    }

    #[test]
    fn test_score_out_of_range_rejected_and_state_kept() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);
        let before = attempts.clone();

        let report = CompletionReport::new()
            .completion(CompletionStatus::Completed)
            .score(150.0);
        let err = tracker.report_completion(&mut attempts, &a, &report).unwrap_err();

        assert_eq!(err, AttemptError::InvalidScore(150.0));
        assert_eq!(attempts, before);

        let nan = CompletionReport::new().score(f64::NAN);
        assert!(tracker.report_completion(&mut attempts, &a, &nan).is_err());
    }

    #[test]
    fn test_mastery_boundary_promotes_to_passed() {
        let tracker = AttemptTracker::default();
        let a = sco("a", Some(100.0));
        let mut attempts = started(&tracker, &a);

        let report = CompletionReport::new()
            .completion(CompletionStatus::Completed)
            .score(100.0);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();

        assert_eq!(outcome.state.success_status, SuccessStatus::Passed);
        assert_eq!(outcome.state.score_raw, Some(100.0));
    }

    #[test]
    fn test_explicit_verdict_overrides_mastery() {
        let tracker = AttemptTracker::default();
        let a = sco("a", Some(80.0));
        let mut attempts = started(&tracker, &a);

        let report = CompletionReport::new()
            .completion(CompletionStatus::Completed)
            .success(SuccessStatus::Failed)
            .score(95.0);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();
        assert_eq!(outcome.state.success_status, SuccessStatus::Failed);
    }

    #[test]
    fn test_score_below_mastery_leaves_status_unknown() {
        let tracker = AttemptTracker::default();
        let a = sco("a", Some(80.0));
        let mut attempts = started(&tracker, &a);

        let report = CompletionReport::new().score(79.5);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();
        assert_eq!(outcome.state.success_status, SuccessStatus::Unknown);
    }

    #[test]
    fn test_success_settable_while_incomplete() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let report = CompletionReport::new()
            .completion(CompletionStatus::Incomplete)
            .success(SuccessStatus::Failed);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();

        assert_eq!(outcome.state.completion_status, CompletionStatus::Incomplete);
        assert_eq!(outcome.state.success_status, SuccessStatus::Failed);
    }

    #[test]
    fn test_unknown_success_does_not_erase_verdict() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let pass = CompletionReport::new().success(SuccessStatus::Passed);
        tracker.report_completion(&mut attempts, &a, &pass).unwrap();

        let unknown = CompletionReport::new().success(SuccessStatus::Unknown);
        let outcome = tracker.report_completion(&mut attempts, &a, &unknown).unwrap();
        assert_eq!(outcome.state.success_status, SuccessStatus::Passed);
    }

    #[test]
    fn test_regression_rejected_without_reattempts() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let done = CompletionReport::new().completion(CompletionStatus::Completed);
        tracker.report_completion(&mut attempts, &a, &done).unwrap();
        let before = attempts.clone();

        let back = CompletionReport::new()
            .completion(CompletionStatus::Incomplete)
            .score(10.0);
        let err = tracker.report_completion(&mut attempts, &a, &back).unwrap_err();

        assert!(matches!(err, AttemptError::IllegalRegression { .. }));
        assert_eq!(attempts, before);
    }

    #[test]
    fn test_regression_starts_new_attempt_when_allowed() {
        let tracker = AttemptTracker::new(TrackerPolicy {
            allow_reattempts: true,
            ..TrackerPolicy::default()
        });
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let done = CompletionReport::new()
            .completion(CompletionStatus::Completed)
            .success(SuccessStatus::Failed)
            .score(40.0);
        tracker.report_completion(&mut attempts, &a, &done).unwrap();

        let retake = CompletionReport::new().completion(CompletionStatus::Incomplete);
        let outcome = tracker.report_completion(&mut attempts, &a, &retake).unwrap();

        assert!(outcome.new_attempt);
        assert_eq!(outcome.state.attempt_number, 2);
        assert_eq!(outcome.state.completion_status, CompletionStatus::Incomplete);
        assert_eq!(outcome.state.success_status, SuccessStatus::Unknown);
        assert_eq!(outcome.state.score_raw, None);

        let history = &attempts.superseded["a"];
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score_raw, Some(40.0));
    }

    #[test]
    fn test_terminal_state_accepts_score_updates() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let done = CompletionReport::new()
            .completion(CompletionStatus::Completed)
            .success(SuccessStatus::Passed)
            .score(70.0);
        let outcome = tracker.report_completion(&mut attempts, &a, &done).unwrap();
        assert!(outcome.state.is_terminal());

        let rescore = CompletionReport::new().score(85.0).suspend_data("review");
        let outcome = tracker.report_completion(&mut attempts, &a, &rescore).unwrap();

        assert_eq!(outcome.state.completion_status, CompletionStatus::Completed);
        assert_eq!(outcome.state.score_raw, Some(85.0));
        assert_eq!(outcome.state.suspend_data, "review");
    }

    #[test]
    fn test_suspend_data_truncated_to_limit() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let payload = "x".repeat(MAX_SUSPEND_DATA_BYTES + 100);
        let report = CompletionReport::new().suspend_data(payload);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();

        assert!(outcome.suspend_data_truncated);
        assert_eq!(outcome.state.suspend_data.len(), MAX_SUSPEND_DATA_BYTES);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let data = "aé";
        assert_eq!(truncate_on_char_boundary(data, 2), "a");
        assert_eq!(truncate_on_char_boundary(data, 3), "aé");
        assert_eq!(truncate_on_char_boundary(data, 0), "");
    }

    #[test]
    fn test_lookup_for_missing_record() {
        let attempts = LearnerAttempts::new();
        assert_eq!(attempts.completion_status("x"), CompletionStatus::NotAttempted);
        assert_eq!(attempts.success_status("x"), SuccessStatus::Unknown);
        assert!(!attempts.attempted("x"));
    }

    #[test]
    fn test_merge_sco_copies_one_sco() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let b = sco("b", None);
        let mut source = started(&tracker, &a);
        tracker.start_session(&mut source, &b).unwrap();

        let mut target = LearnerAttempts::new();
        target.merge_sco("a", &source);

        assert!(target.get("a").is_some());
        assert!(target.get("b").is_none());
    }

    #[test]
    fn test_progress_measure_meets_completion_threshold() {
        let tracker = AttemptTracker::default();
        let a = Sco {
            completion_threshold: Some(0.8),
            ..sco("a", None)
        };
        let mut attempts = started(&tracker, &a);

        let outcome = tracker
            .report_completion(&mut attempts, &a, &CompletionReport::new().progress(0.5))
            .unwrap();
        assert_eq!(outcome.state.completion_status, CompletionStatus::Incomplete);

        let report = CompletionReport::new()
            .completion(CompletionStatus::Incomplete)
            .progress(0.85);
        let outcome = tracker.report_completion(&mut attempts, &a, &report).unwrap();
        assert_eq!(outcome.state.completion_status, CompletionStatus::Completed);
    }

    #[test]
    fn test_progress_measure_ignored_without_threshold() {
        let tracker = AttemptTracker::default();
        let a = sco("a", None);
        let mut attempts = started(&tracker, &a);

        let outcome = tracker
            .report_completion(&mut attempts, &a, &CompletionReport::new().progress(1.0))
            .unwrap();
        assert_eq!(outcome.state.completion_status, CompletionStatus::NotAttempted);
    }

    #[test]
    fn test_progress_measure_out_of_range_rejected() {
        let tracker = AttemptTracker::default();
        let a = Sco {
            completion_threshold: Some(0.5),
            ..sco("a", None)
        };
        let mut attempts = started(&tracker, &a);
        let before = attempts.clone();

        let err = tracker
            .report_completion(&mut attempts, &a, &CompletionReport::new().progress(1.5))
            .unwrap_err();
        assert!(matches!(err, AttemptError::InvalidValue { .. }));
        assert_eq!(attempts, before);
    }

    #[test]
    fn test_report_rejects_unknown_fields() {
        let result = serde_json::from_str::<CompletionReport>(r#"{"cmi": {"cmi.core.score.raw": 75}}"#);
        assert!(result.is_err());
    }
}
