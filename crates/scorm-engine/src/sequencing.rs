//! Navigation over a course structure for one learner.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::prerequisite::AttemptLookup;
use crate::tree::{CourseStructure, Sco};

/// Result of asking for the SCO after the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "target", rename_all = "snake_case")]
pub enum NavigationOutcome {
    /// The next SCO the learner may launch.
    Target(String),
    /// Later SCOs exist but none is unlocked yet.
    Locked,
    /// Nothing launchable follows the current SCO.
    EndOfCourse,
}

impl NavigationOutcome {
    /// The target identifier, if navigation can proceed.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Target(id) => Some(id),
            Self::Locked | Self::EndOfCourse => None,
        }
    }
}

/// Read-only view of a course through one learner's attempts.
///
/// Prerequisites are evaluated on every call; nothing is cached.
pub struct Sequencer<'a, A: AttemptLookup + ?Sized> {
    course: &'a CourseStructure,
    attempts: &'a A,
}

impl<'a, A: AttemptLookup + ?Sized> Sequencer<'a, A> {
    /// Creates a sequencer over a course and a learner's attempts.
    pub const fn new(course: &'a CourseStructure, attempts: &'a A) -> Self {
        Self { course, attempts }
    }

    /// Returns `true` if the SCO is a SCO and its prerequisites hold.
    pub fn is_unlocked(&self, sco: &Sco) -> bool {
        sco.is_launchable && sco.prerequisites.evaluate(self.attempts)
    }

    /// Identifiers of every SCO the learner may launch now.
    pub fn launchable_scos(&self) -> BTreeSet<String> {
        self.course
            .scos
            .iter()
            .filter(|sco| self.is_unlocked(sco))
            .map(|sco| sco.identifier.clone())
            .collect()
    }

    /// First unlocked SCO after `current` in delivery order.
    ///
    /// `None` when `current` is last, unknown, or nothing later is unlocked.
    pub fn next(&self, current: &str) -> Option<&'a str> {
        let position = self.course.position(current)?;
        self.course.scos[position + 1..]
            .iter()
            .find(|sco| self.is_unlocked(sco))
            .map(|sco| sco.identifier.as_str())
    }

    /// Like [`Sequencer::next`], but tells a locked course from its end.
    pub fn next_outcome(&self, current: &str) -> NavigationOutcome {
        let Some(position) = self.course.position(current) else {
            return NavigationOutcome::EndOfCourse;
        };
        let mut later = self.course.scos[position + 1..]
            .iter()
            .filter(|sco| sco.is_launchable)
            .peekable();
        if later.peek().is_none() {
            return NavigationOutcome::EndOfCourse;
        }
        later
            .find(|sco| sco.prerequisites.evaluate(self.attempts))
            .map_or(NavigationOutcome::Locked, |sco| {
                NavigationOutcome::Target(sco.identifier.clone())
            })
    }

    /// Closest earlier launchable SCO, ignoring prerequisites.
    pub fn previous(&self, current: &str) -> Option<&'a str> {
        let position = self.course.position(current)?;
        self.course.scos[..position]
            .iter()
            .rev()
            .find(|sco| sco.is_launchable)
            .map(|sco| sco.identifier.as_str())
    }
}
