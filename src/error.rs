//! Contains the error kinds returned by the quiz core.

use chrono::{DateTime, Utc};
use thiserror::Error;
use ustr::Ustr;

/// An error returned by the quiz core. None of the five public operations panics on
/// caller-supplied data; every failure surfaces as one of these variants instead.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum QuizCoreError {
    /// Raised by graph construction when the given edges would introduce a cycle. Carries at
    /// least one offending cycle, listed as the sequence of concept ids that form it.
    #[error("dependency graph contains a cycle: {}", cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    CycleDetected {
        /// The sequence of concept ids that form the cycle, starting and ending on the same id.
        cycle: Vec<Ustr>,
    },

    /// Raised when a concept referenced by a scoring operation is not present in the graph. Unlike
    /// unknown concepts referenced by quiz items (which are filtered and logged), this indicates
    /// an inconsistency between the learner's answer and the current graph.
    #[error("concept {concept_id} is not present in the knowledge graph")]
    UnknownConcept {
        /// The id of the concept that could not be found.
        concept_id: Ustr,
    },

    /// Raised by `suggest_next_quiz` under the `raise` fallback strategy when no quiz can be
    /// produced for the learner.
    #[error("no quiz is available for this learner under the current policy")]
    NoQuizAvailable,

    /// Raised by `update_scores` when the caller's expectation of the profile's `last_updated`
    /// timestamp predates the profile's current value, indicating a stale writer.
    #[error("stale profile: expected last_updated {expected}, found {found}")]
    StaleProfile {
        /// The `last_updated` timestamp the caller expected to still be current.
        expected: DateTime<Utc>,
        /// The `last_updated` timestamp actually stored on the profile.
        found: DateTime<Utc>,
    },

    /// Raised at policy table construction when thresholds are outside their permissible
    /// ordering (e.g. `WEAK_THRESHOLD > MASTERY_THRESHOLD`).
    #[error("invalid policy: {reason}")]
    InvalidPolicy {
        /// A human-readable explanation of which constraint failed.
        reason: String,
    },
}
