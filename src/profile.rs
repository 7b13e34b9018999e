//! The learner profile: per-learner mutable state, authoritatively owned by the caller and
//! mutated only through the scoring system and the reset operation of the public facade.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ustr::{Ustr, UstrMap};

/// A single spaced-repetition schedule entry for one concept.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScheduleEntry {
    /// The last time this concept was attempted.
    pub last_seen_at: DateTime<Utc>,
    /// The next time this concept is due for review.
    pub next_due_at: DateTime<Utc>,
    /// An index into the policy's `review_intervals` ladder.
    pub interval_index: usize,
    /// The number of consecutive correct answers for this concept.
    pub success_streak: u32,
    /// The number of times this concept has lapsed (an incorrect answer after having been
    /// scheduled).
    pub lapses: u32,
    /// A rolling estimate of recent accuracy for this concept, in `[0, 1]`.
    pub rolling_accuracy: f64,
}

impl ScheduleEntry {
    /// Returns a fresh schedule entry as created the first time a concept is attempted.
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        ScheduleEntry {
            last_seen_at: now,
            next_due_at: now,
            interval_index: 0,
            success_streak: 0,
            lapses: 0,
            rolling_accuracy: 0.0,
        }
    }
}

/// A single recorded attempt at a quiz item.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// The id of the quiz that was attempted.
    pub quiz_id: Ustr,
    /// The concepts the quiz was linked to at the time of the attempt.
    pub linked_concepts: Vec<Ustr>,
    /// Whether the learner answered correctly.
    pub correct: bool,
    /// When the attempt was made.
    pub timestamp: DateTime<Utc>,
    /// The quiz's difficulty level at the time of the attempt.
    pub difficulty: u8,
}

impl AttemptRecord {
    /// Returns whether this attempt was linked to the given concept.
    #[must_use]
    pub fn links(&self, concept_id: Ustr) -> bool {
        self.linked_concepts.contains(&concept_id)
    }
}

/// Per-learner mutable state. Created on first use with all aggregates zero and empty maps;
/// mutated only by the scoring system and the reset operation of the public facade.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LearnerProfile {
    /// The learner's opaque identifier.
    pub learner_id: String,
    /// Mapping from concept id to mastery score. A missing key means score `0.0`.
    pub scores: UstrMap<f64>,
    /// Mapping from concept id to its spaced-repetition schedule entry.
    pub schedule: UstrMap<ScheduleEntry>,
    /// The most recent attempts, most-recent-last, capped at the policy's `history_cap`.
    pub history: VecDeque<AttemptRecord>,
    /// The total number of attempts recorded, monotonically non-decreasing.
    pub total_attempts: u64,
    /// The total number of correct attempts recorded, monotonically non-decreasing.
    pub total_correct: u64,
    /// When the profile was last mutated.
    pub last_updated: DateTime<Utc>,
}

impl LearnerProfile {
    /// Creates a new, empty profile for the given learner, as it exists on first use.
    #[must_use]
    pub fn new(learner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        LearnerProfile {
            learner_id: learner_id.into(),
            scores: UstrMap::default(),
            schedule: UstrMap::default(),
            history: VecDeque::new(),
            total_attempts: 0,
            total_correct: 0,
            last_updated: now,
        }
    }

    /// Returns the effective score of a concept: the stored score, or `0.0` if the concept has
    /// never been scored.
    #[must_use]
    pub fn score_of(&self, concept_id: Ustr) -> f64 {
        self.scores.get(&concept_id).copied().unwrap_or(0.0)
    }

    /// Returns the overall accuracy across all recorded attempts, or `0.0` if there have been
    /// none.
    #[must_use]
    pub fn overall_accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.total_correct as f64 / self.total_attempts as f64
        }
    }

    /// Returns up to `k` of the most recent attempts, most-recent-first, optionally filtered to
    /// those linked to `concept_id`.
    #[must_use]
    pub fn recent_attempts(&self, concept_id: Option<Ustr>, k: usize) -> Vec<AttemptRecord> {
        self.history
            .iter()
            .rev()
            .filter(|attempt| concept_id.is_none_or(|id| attempt.links(id)))
            .take(k)
            .cloned()
            .collect()
    }
}
