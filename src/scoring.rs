//! The scoring system (C4): a deterministic, pure transformation
//! `(profile, quiz, correct?, graph, now) -> profile'`.

use chrono::{DateTime, Duration, Utc};
use ustr::UstrSet;

use crate::{
    error::QuizCoreError,
    graph::KnowledgeGraph,
    policy::PolicyTable,
    profile::{AttemptRecord, LearnerProfile, ScheduleEntry},
    quiz::QuizItem,
};

/// Clamps `x` to `[policy.score_min, policy.score_max]`.
fn clamp(x: f64, policy: &PolicyTable) -> f64 {
    x.min(policy.score_max).max(policy.score_min)
}

/// Applies the score deltas, prerequisite bonus, schedule transition, history append, and
/// aggregate update that follow from a single quiz attempt.
///
/// Returns a new profile value; the input is left untouched, including on failure (no partial
/// mutation occurs when validation fails).
pub fn update_scores(
    profile: &LearnerProfile,
    quiz: &QuizItem,
    correct: bool,
    graph: &KnowledgeGraph,
    policy: &PolicyTable,
    now: DateTime<Utc>,
) -> Result<LearnerProfile, QuizCoreError> {
    // Step 1: validate every linked concept is present in the graph before touching anything.
    for concept_id in &quiz.linked_concepts {
        if !graph.contains(*concept_id) {
            tracing::warn!(
                concept_id = %concept_id,
                quiz_id = %quiz.id,
                "update_scores: quiz references a concept absent from the knowledge graph",
            );
            return Err(QuizCoreError::UnknownConcept {
                concept_id: *concept_id,
            });
        }
    }

    let mut next = profile.clone();
    let linked: UstrSet = quiz.linked_concepts.iter().copied().collect();

    // Step 2: score deltas.
    let delta = if correct {
        policy.correct_delta
    } else {
        policy.incorrect_delta
    };
    for concept_id in &linked {
        let score = next.scores.entry(*concept_id).or_insert(0.0);
        *score = clamp(*score + delta, policy);
    }

    if correct {
        // The prerequisite bonus applies once per unique direct prerequisite of the linked
        // concepts, excluding prerequisites that are themselves linked by this quiz.
        let mut bonus_targets = UstrSet::default();
        for concept_id in &linked {
            for prereq in graph.direct_prerequisites(*concept_id)? {
                if !linked.contains(&prereq) {
                    bonus_targets.insert(prereq);
                }
            }
        }
        for prereq in &bonus_targets {
            let score = next.scores.entry(*prereq).or_insert(0.0);
            *score = clamp(*score + policy.prereq_bonus, policy);
        }
    }

    // Step 3: schedule update, once per unique linked concept.
    let window = policy.recent_window.max(1);
    for concept_id in &linked {
        let prior_attempts = next
            .history
            .iter()
            .filter(|attempt| attempt.links(*concept_id))
            .count();
        let n = (prior_attempts + 1).min(window) as f64;

        let mut entry = next
            .schedule
            .remove(concept_id)
            .unwrap_or_else(|| ScheduleEntry::fresh(now));

        let correct_indicator = if correct { 1.0 } else { 0.0 };
        entry.rolling_accuracy = (entry.rolling_accuracy * (n - 1.0) + correct_indicator) / n;

        if correct {
            entry.success_streak += 1;
            entry.interval_index = (entry.interval_index + 1).min(policy.max_interval_index());
        } else {
            entry.lapses += 1;
            entry.success_streak = 0;
            entry.interval_index = 0;
        }

        // Safety regression: a correct answer backed by poor recent accuracy should not advance
        // the review schedule as far as an ordinary correct answer would.
        if correct && entry.rolling_accuracy < 0.5 && entry.interval_index > 0 {
            entry.interval_index -= 1;
        }

        entry.last_seen_at = now;
        entry.next_due_at = now + Duration::days(policy.review_intervals[entry.interval_index]);

        tracing::debug!(
            concept_id = %concept_id,
            correct,
            interval_index = entry.interval_index,
            rolling_accuracy = entry.rolling_accuracy,
            "schedule transition",
        );

        next.schedule.insert(*concept_id, entry);
    }

    // Step 4: history, bounded to `history_cap`, oldest discarded first.
    next.history.push_back(AttemptRecord {
        quiz_id: quiz.id,
        linked_concepts: quiz.linked_concepts.clone(),
        correct,
        timestamp: now,
        difficulty: quiz.difficulty_level,
    });
    while next.history.len() > policy.history_cap {
        next.history.pop_front();
    }

    // Step 5: aggregates.
    next.total_attempts += 1;
    if correct {
        next.total_correct += 1;
    }

    // Step 6.
    next.last_updated = now;

    tracing::info!(
        quiz_id = %quiz.id,
        correct,
        concept_count = linked.len(),
        "update_scores applied",
    );

    Ok(next)
}
