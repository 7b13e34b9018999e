//! An adaptive quiz selection and scoring core for hierarchical, prerequisite-gated skills.
//!
//! Given a per-learner profile of mastery scores, a directed acyclic knowledge graph of concept
//! prerequisites, and a bank of quiz items linked to concepts, [`QuizCore`] decides the single best
//! next quiz to present to a learner and, once the learner answers, updates their mastery state and
//! review schedule.
//!
//! The crate is organized around a single facade type: [`graph`] holds the prerequisite graph
//! (C2), [`profile`] the per-learner state (C3),
//! [`scoring`] the pure score/schedule transition (C4), [`selection`] the next-quiz engine (C5), and
//! [`policy`] the tunables both of the latter two consume (C1). [`QuizCore`] (C6) is the only type
//! callers need to construct.

pub mod error;
pub mod graph;
pub mod policy;
pub mod profile;
pub mod quiz;
pub mod scoring;
pub mod selection;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ustr::Ustr;

pub use error::QuizCoreError;
pub use graph::{Concept, KnowledgeGraph};
pub use policy::{FallbackStrategy, PolicyTable, PolicyTableBuilder};
pub use profile::{AttemptRecord, LearnerProfile, ScheduleEntry};
pub use quiz::QuizItem;

/// A read-only snapshot of a learner's progress, as returned by
/// [`QuizCore::get_learning_progress`].
///
/// The fields mirror the progress breakdown described in §4.5.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LearningProgress {
    /// Concepts in the graph whose score is at or above `mastery_threshold`.
    pub mastered_concepts: Vec<Ustr>,
    /// Concepts in the graph whose score lies in `(0.0, mastery_threshold)`.
    pub in_progress_concepts: Vec<Ustr>,
    /// Concepts in the graph whose score is at or below `weak_threshold`.
    pub weak_concepts: Vec<Ustr>,
    /// The fraction of concepts in the graph that have a nonzero score, in `[0, 1]`.
    pub coverage_percentage: f64,
    /// The total number of attempts recorded for this learner.
    pub total_attempts: u64,
    /// Overall accuracy across all recorded attempts, or `0.0` when there have been none.
    pub overall_accuracy: f64,
    /// The number of scheduled reviews currently due (`next_due_at <= now`).
    pub reviews_due: usize,
    /// The count of overdue reviews broken down by the band of the concept under review.
    pub overdue_by_band: OverdueByBand,
}

/// Counts of overdue reviews (`next_due_at <= now`), broken down by the band the concept
/// currently falls in.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct OverdueByBand {
    /// Overdue reviews for concepts currently weak.
    pub weak: usize,
    /// Overdue reviews for concepts currently in progress.
    pub in_progress: usize,
    /// Overdue reviews for concepts currently mastered.
    pub mastered: usize,
}

/// The adaptive quiz selection and scoring core.
///
/// Bundles the long-lived, shareable-by-reference collaborators a learner session needs — the
/// knowledge graph and the policy table — behind the five operations of the public facade (C6).
/// Per-learner state ([`LearnerProfile`]) and the quiz bank are passed in per call rather than
/// owned here, since they are caller-owned values with single-writer semantics enforced by the
/// caller (§5).
#[derive(Clone, Debug)]
pub struct QuizCore {
    graph: KnowledgeGraph,
    policy: PolicyTable,
}

impl QuizCore {
    /// Builds a new core from a knowledge graph and a policy table, validating the policy table
    /// once up front (§9).
    ///
    /// Fails with [`QuizCoreError::InvalidPolicy`] if the policy table's thresholds or tables are
    /// not internally consistent.
    pub fn new(graph: KnowledgeGraph, policy: PolicyTable) -> Result<Self, QuizCoreError> {
        policy.validate()?;
        Ok(QuizCore { graph, policy })
    }

    /// Builds a new core from a knowledge graph using the default policy table.
    pub fn with_default_policy(graph: KnowledgeGraph) -> Result<Self, QuizCoreError> {
        Self::new(graph, PolicyTable::default())
    }

    /// Returns the core's knowledge graph.
    #[must_use]
    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// Returns the core's policy table.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Chooses the single best next quiz to present to the learner (§4.4).
    ///
    /// Composes weakness-first targeting, prerequisite gating, difficulty adaptation,
    /// spaced-repetition review scheduling, and the configured fallback strategy. Deterministic
    /// for fixed inputs and policy; the only source of nondeterminism, sampling among perfectly
    /// tied candidates with no `rng_seed` configured, is disabled whenever
    /// [`PolicyTable::rng_seed`] is set.
    pub fn suggest_next_quiz(
        &self,
        profile: &LearnerProfile,
        quizzes: &[QuizItem],
        now: DateTime<Utc>,
    ) -> Result<QuizItem, QuizCoreError> {
        selection::suggest_next_quiz(profile, &self.graph, quizzes, &self.policy, now)
    }

    /// Applies the score deltas, prerequisite bonus, schedule transition, history append, and
    /// aggregate update that follow from a single quiz attempt (§4.3).
    ///
    /// Returns a new profile value; the caller should treat `profile` as logically superseded. No
    /// partial mutation occurs if the quiz references a concept absent from the graph: the error is
    /// returned and no new profile is produced.
    pub fn update_scores(
        &self,
        profile: &LearnerProfile,
        quiz: &QuizItem,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<LearnerProfile, QuizCoreError> {
        scoring::update_scores(profile, quiz, correct, &self.graph, &self.policy, now)
    }

    /// As [`QuizCore::update_scores`], but first checks `profile.last_updated` against
    /// `base_last_updated`, the value the caller last observed. Fails with
    /// [`QuizCoreError::StaleProfile`] if the profile has been mutated by another writer since,
    /// implementing the optional single-writer guard described in §5 and §7.
    pub fn update_scores_checked(
        &self,
        profile: &LearnerProfile,
        base_last_updated: DateTime<Utc>,
        quiz: &QuizItem,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<LearnerProfile, QuizCoreError> {
        if profile.last_updated != base_last_updated {
            return Err(QuizCoreError::StaleProfile {
                expected: base_last_updated,
                found: profile.last_updated,
            });
        }
        self.update_scores(profile, quiz, correct, now)
    }

    /// Returns a read-only snapshot of the learner's progress (§4.5); never mutates `profile`.
    #[must_use]
    pub fn get_learning_progress(&self, profile: &LearnerProfile, now: DateTime<Utc>) -> LearningProgress {
        let mut mastered_concepts = Vec::new();
        let mut in_progress_concepts = Vec::new();
        let mut weak_concepts = Vec::new();
        let mut scored_concepts = 0usize;
        let mut overdue_by_band = OverdueByBand::default();

        for concept_id in self.graph.concept_ids() {
            let score = profile.score_of(concept_id);
            if score != 0.0 {
                scored_concepts += 1;
            }

            let overdue = profile
                .schedule
                .get(&concept_id)
                .is_some_and(|entry| entry.next_due_at <= now);

            if score >= self.policy.mastery_threshold {
                mastered_concepts.push(concept_id);
                if overdue {
                    overdue_by_band.mastered += 1;
                }
            } else if score <= self.policy.weak_threshold {
                weak_concepts.push(concept_id);
                if overdue {
                    overdue_by_band.weak += 1;
                }
            } else {
                in_progress_concepts.push(concept_id);
                if overdue {
                    overdue_by_band.in_progress += 1;
                }
            }
        }

        mastered_concepts.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        in_progress_concepts.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        weak_concepts.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let coverage_percentage = if self.graph.is_empty() {
            0.0
        } else {
            scored_concepts as f64 / self.graph.len() as f64
        };

        let reviews_due = profile
            .schedule
            .values()
            .filter(|entry| entry.next_due_at <= now)
            .count();

        LearningProgress {
            mastered_concepts,
            in_progress_concepts,
            weak_concepts,
            coverage_percentage,
            total_attempts: profile.total_attempts,
            overall_accuracy: profile.overall_accuracy(),
            reviews_due,
            overdue_by_band,
        }
    }

    /// Resets a learner's progress (§4.5).
    ///
    /// If `concept_ids` is `None`, zeroes all scores and clears all schedule entries and history,
    /// but preserves the learner id. If `concept_ids` is `Some`, removes only those concepts from
    /// `scores`/`schedule` while preserving history and aggregate counters; an empty slice is a
    /// no-op.
    #[must_use]
    pub fn reset_user_progress(
        &self,
        profile: &LearnerProfile,
        concept_ids: Option<&[Ustr]>,
        now: DateTime<Utc>,
    ) -> LearnerProfile {
        let mut next = profile.clone();

        match concept_ids {
            None => {
                next.scores.clear();
                next.schedule.clear();
                next.history.clear();
                next.total_attempts = 0;
                next.total_correct = 0;
            }
            Some(ids) => {
                if ids.is_empty() {
                    return next;
                }
                for id in ids {
                    next.scores.remove(id);
                    next.schedule.remove(id);
                }
            }
        }

        next.last_updated = now;
        tracing::info!(
            learner_id = %next.learner_id,
            selective = concept_ids.is_some(),
            "reset_user_progress applied",
        );
        next
    }

    /// Returns up to `k` of the most recent attempts, most-recent-first, optionally filtered to
    /// those linked to `concept_id`.
    #[must_use]
    pub fn recent_attempts(
        &self,
        profile: &LearnerProfile,
        concept_id: Option<Ustr>,
        k: usize,
    ) -> Vec<AttemptRecord> {
        profile.recent_attempts(concept_id, k)
    }
}
