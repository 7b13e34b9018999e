//! Named constants and tunables consumed by the scoring system and selection engine.
//!
//! The policy table is a single frozen value, validated once at construction, threaded through
//! every call instead of read from process-wide globals.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::QuizCoreError;

/// The strategy used to pick a quiz when the primary queue and the review pool are both
/// exhausted.
#[derive(Clone, Copy, Debug, Deserialize, Display, EnumString, Eq, PartialEq, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum FallbackStrategy {
    /// Pick the mastered concept with the earliest due review, widened to difficulty band
    /// [1, 2].
    Easiest,
    /// Uniformly sample among all concepts that have at least one quiz.
    Random,
    /// Fail with [`QuizCoreError::NoQuizAvailable`] instead of guessing.
    Raise,
}

/// Named constants and tunables consumed by the scoring system (C4) and the selection engine
/// (C5). Any deviation from [`PolicyTable::default`] is a policy override and must be validated
/// with [`PolicyTable::validate`] before use.
#[derive(Builder, Clone, Debug, Deserialize, PartialEq, Serialize)]
#[builder(setter(into), default)]
pub struct PolicyTable {
    /// Lower clamp bound for mastery scores.
    pub score_min: f64,
    /// Upper clamp bound for mastery scores.
    pub score_max: f64,
    /// At or above this score, a concept is considered mastered.
    pub mastery_threshold: f64,
    /// At or below this score, a concept is considered weak.
    pub weak_threshold: f64,
    /// The lower bound of the in-progress range: a concept is in-progress when its score lies in
    /// `(in_progress_lower, mastery_threshold)`, and is part of the review pool once due when its
    /// score lies in `[in_progress_lower, mastery_threshold)`.
    pub in_progress_lower: f64,
    /// Score delta applied to every linked concept on a correct answer.
    pub correct_delta: f64,
    /// Score delta applied to every linked concept on an incorrect answer.
    pub incorrect_delta: f64,
    /// Bonus applied to each unique direct prerequisite of the linked concepts, once per
    /// attempt, on correct answers only.
    pub prereq_bonus: f64,
    /// Spaced-repetition ladder of intervals, indexed by `interval_index`. Values are in days.
    pub review_intervals: Vec<i64>,
    /// Number of attempts inspected for difficulty adaptation and variety.
    pub recent_window: usize,
    /// Maximum number of attempt records retained per learner.
    pub history_cap: usize,
    /// Cap on overdue items surfaced in a single `suggest_next_quiz` call.
    pub max_due_reviews_per_suggestion: usize,
    /// Strategy used when no quiz matches primary or review criteria.
    pub fallback_strategy: FallbackStrategy,
    /// If set, all tie-breaking in the selection engine is deterministic and reproducible.
    pub rng_seed: Option<u64>,
}

impl PolicyTable {
    /// Verifies that the policy table's thresholds and tables are internally consistent. Called
    /// once at [`crate::QuizCore`] construction.
    pub fn validate(&self) -> Result<(), QuizCoreError> {
        let invalid = |reason: &str| QuizCoreError::InvalidPolicy {
            reason: reason.to_string(),
        };

        if self.score_min >= self.score_max {
            return Err(invalid("score_min must be strictly less than score_max"));
        }
        if self.weak_threshold > self.mastery_threshold {
            return Err(invalid(
                "weak_threshold must not be greater than mastery_threshold",
            ));
        }
        if self.mastery_threshold > self.score_max || self.weak_threshold < self.score_min {
            return Err(invalid(
                "weak_threshold and mastery_threshold must lie within [score_min, score_max]",
            ));
        }
        if self.in_progress_lower < self.score_min || self.in_progress_lower >= self.mastery_threshold
        {
            return Err(invalid(
                "in_progress_lower must lie within [score_min, mastery_threshold)",
            ));
        }
        if self.review_intervals.is_empty() {
            return Err(invalid("review_intervals must not be empty"));
        }
        if self.review_intervals.iter().any(|days| *days <= 0) {
            return Err(invalid("review_intervals entries must be positive"));
        }
        if self
            .review_intervals
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(invalid("review_intervals must be strictly increasing"));
        }
        if self.history_cap == 0 {
            return Err(invalid("history_cap must be greater than 0"));
        }
        if self.max_due_reviews_per_suggestion == 0 {
            return Err(invalid(
                "max_due_reviews_per_suggestion must be greater than 0",
            ));
        }

        Ok(())
    }

    /// The maximum valid `interval_index`, i.e. `len(review_intervals) - 1`.
    #[must_use]
    pub fn max_interval_index(&self) -> usize {
        self.review_intervals.len() - 1
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        PolicyTable {
            score_min: -5.0,
            score_max: 10.0,
            mastery_threshold: 3.0,
            weak_threshold: 0.0,
            in_progress_lower: 0.0,
            correct_delta: 1.0,
            incorrect_delta: -1.0,
            prereq_bonus: 0.1,
            review_intervals: vec![1, 3, 7, 14, 30, 60, 120],
            recent_window: 10,
            history_cap: 15,
            max_due_reviews_per_suggestion: 1,
            fallback_strategy: FallbackStrategy::Easiest,
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(PolicyTable::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let policy = PolicyTable {
            weak_threshold: 5.0,
            mastery_threshold: 3.0,
            ..PolicyTable::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(QuizCoreError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn rejects_empty_review_intervals() {
        let policy = PolicyTable {
            review_intervals: vec![],
            ..PolicyTable::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_non_increasing_review_intervals() {
        let policy = PolicyTable {
            review_intervals: vec![1, 3, 3, 14],
            ..PolicyTable::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_zero_history_cap() {
        let policy = PolicyTable {
            history_cap: 0,
            ..PolicyTable::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn builder_overrides_defaults() {
        let policy = PolicyTableBuilder::default()
            .mastery_threshold(4.0)
            .build()
            .unwrap();
        assert_eq!(policy.mastery_threshold, 4.0);
        assert_eq!(policy.score_min, -5.0);
        assert!(policy.validate().is_ok());
    }
}
