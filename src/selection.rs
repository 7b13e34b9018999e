//! The selection engine (C5): chooses the next quiz given `(profile, graph, quiz bank, now)`.
//!
//! Composes weakness-first targeting (§4.4.1), prerequisite gating (§4.4.2), item selection with
//! difficulty adaptation (§4.4.3), spaced-repetition review (§4.4.4), and deterministic fallbacks
//! (§4.4.5) into one final pick.

use std::{
    collections::{hash_map::DefaultHasher, VecDeque},
    hash::{Hash, Hasher},
};

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};
use ustr::{Ustr, UstrSet};

use crate::{
    error::QuizCoreError,
    graph::KnowledgeGraph,
    policy::{FallbackStrategy, PolicyTable},
    profile::LearnerProfile,
    quiz::QuizItem,
};

/// Chooses the single best next quiz to present to the learner.
pub fn suggest_next_quiz(
    profile: &LearnerProfile,
    graph: &KnowledgeGraph,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    now: DateTime<Utc>,
) -> Result<QuizItem, QuizCoreError> {
    let universe = concept_universe(graph, quizzes);

    let (weak, in_progress, _mastered) = partition(profile, policy, &universe);
    let weak_set: UstrSet = weak.iter().copied().collect();

    let mut primary_queue: Vec<Ustr> = weak.iter().chain(in_progress.iter()).copied().collect();
    primary_queue.sort_by(|a, b| sort_key(profile, *a).partial_cmp(&sort_key(profile, *b)).unwrap());

    if let Some(quiz) = walk_primary_queue(
        primary_queue,
        profile,
        graph,
        quizzes,
        policy,
        &weak_set,
        now,
    )? {
        tracing::info!(quiz_id = %quiz.id, "suggest_next_quiz: resolved via primary queue");
        return Ok(quiz);
    }

    if let Some(quiz) = review_pool(profile, &universe, policy, now)
        .into_iter()
        .find_map(|target| {
            select_item_for_target(target, profile, quizzes, policy, &weak_set, now, None)
        })
    {
        tracing::info!(quiz_id = %quiz.id, "suggest_next_quiz: resolved via review pool");
        return Ok(quiz);
    }

    match policy.fallback_strategy {
        FallbackStrategy::Raise => {
            tracing::warn!("suggest_next_quiz: no quiz available under raise fallback");
            Err(QuizCoreError::NoQuizAvailable)
        }
        FallbackStrategy::Easiest => easiest_fallback(profile, &universe, quizzes, policy, &weak_set, now)
            .or_else(|| topological_fallback(profile, graph, &universe, quizzes, policy, &weak_set, now))
            .ok_or(QuizCoreError::NoQuizAvailable),
        FallbackStrategy::Random => random_fallback(profile, &universe, quizzes, policy, &weak_set, now)
            .or_else(|| topological_fallback(profile, graph, &universe, quizzes, policy, &weak_set, now))
            .ok_or(QuizCoreError::NoQuizAvailable),
    }
}

/// The set of concepts referenced by any quiz in the bank that are also present in the graph.
/// Concepts referenced by a quiz but absent from the graph are filtered out and logged.
fn concept_universe(graph: &KnowledgeGraph, quizzes: &[QuizItem]) -> UstrSet {
    let mut universe = UstrSet::default();
    let mut warned = UstrSet::default();
    for quiz in quizzes {
        for concept_id in &quiz.linked_concepts {
            if graph.contains(*concept_id) {
                universe.insert(*concept_id);
            } else if warned.insert(*concept_id) {
                tracing::warn!(
                    concept_id = %concept_id,
                    "suggest_next_quiz: quiz item references a concept absent from the graph",
                );
            }
        }
    }
    universe
}

/// Returns `(weak, in_progress, mastered)` concept id lists over the given universe.
fn partition(
    profile: &LearnerProfile,
    policy: &PolicyTable,
    universe: &UstrSet,
) -> (Vec<Ustr>, Vec<Ustr>, Vec<Ustr>) {
    let mut weak = Vec::new();
    let mut in_progress = Vec::new();
    let mut mastered = Vec::new();

    for concept_id in universe {
        let score = profile.score_of(*concept_id);
        if score <= policy.weak_threshold {
            weak.push(*concept_id);
        } else if score < policy.mastery_threshold {
            in_progress.push(*concept_id);
        } else {
            mastered.push(*concept_id);
        }
    }

    (weak, in_progress, mastered)
}

/// Sort key for the weakness ordering: effective score ascending, then concept id ascending.
fn sort_key(profile: &LearnerProfile, concept_id: Ustr) -> (f64, String) {
    (profile.score_of(concept_id), concept_id.as_str().to_string())
}

/// Walks the primary queue, applying prerequisite gating (§4.4.2) at each step and attempting
/// item selection (§4.4.3) for every unlocked candidate, until a quiz is produced or the queue is
/// exhausted.
fn walk_primary_queue(
    initial: Vec<Ustr>,
    profile: &LearnerProfile,
    graph: &KnowledgeGraph,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
) -> Result<Option<QuizItem>, QuizCoreError> {
    let mut queue: VecDeque<Ustr> = initial.into_iter().collect();
    let mut tried = UstrSet::default();

    while let Some(candidate) = queue.pop_front() {
        if !tried.insert(candidate) {
            continue;
        }

        let direct_prereqs = graph.direct_prerequisites(candidate)?;
        let mut unmet: Vec<Ustr> = direct_prereqs
            .into_iter()
            .filter(|p| profile.score_of(*p) < 0.0)
            .collect();

        if unmet.is_empty() {
            if let Some(quiz) =
                select_item_for_target(candidate, profile, quizzes, policy, weak_set, now, None)
            {
                return Ok(Some(quiz));
            }
            // Q(candidate) was empty even at the full [1, 5] band; skip to the next candidate.
            continue;
        }

        unmet.sort_by(|a, b| sort_key(profile, *a).partial_cmp(&sort_key(profile, *b)).unwrap());
        for prereq in unmet.into_iter().rev() {
            queue.push_front(prereq);
        }
        // The original, locked candidate is deferred: it is not re-queued.
    }

    Ok(None)
}

/// Computes the review pool (§4.4.4): in-progress concepts whose review is currently due, ordered
/// by `(next_due_at ascending, score ascending)`, capped at `max_due_reviews_per_suggestion`.
fn review_pool(
    profile: &LearnerProfile,
    universe: &UstrSet,
    policy: &PolicyTable,
    now: DateTime<Utc>,
) -> Vec<Ustr> {
    let mut due: Vec<(Ustr, DateTime<Utc>, f64)> = universe
        .iter()
        .filter_map(|concept_id| {
            let score = profile.score_of(*concept_id);
            if score < policy.in_progress_lower || score >= policy.mastery_threshold {
                return None;
            }
            let entry = profile.schedule.get(concept_id)?;
            if entry.next_due_at > now {
                return None;
            }
            Some((*concept_id, entry.next_due_at, score))
        })
        .collect();

    due.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.partial_cmp(&b.2).unwrap()));
    due.into_iter()
        .take(policy.max_due_reviews_per_suggestion)
        .map(|(id, _, _)| id)
        .collect()
}

/// `FALLBACK_STRATEGY = "easiest"`: the mastered concept with the earliest `next_due_at` (or any
/// mastered concept if none is scheduled), forced to band `[1, 2]`.
fn easiest_fallback(
    profile: &LearnerProfile,
    universe: &UstrSet,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
) -> Option<QuizItem> {
    let mastered: Vec<Ustr> = universe
        .iter()
        .filter(|c| profile.score_of(**c) >= policy.mastery_threshold)
        .copied()
        .collect();

    let mut scheduled: Vec<(Ustr, DateTime<Utc>)> = mastered
        .iter()
        .filter_map(|c| profile.schedule.get(c).map(|e| (*c, e.next_due_at)))
        .collect();
    scheduled.sort_by_key(|(_, due)| *due);

    let target = scheduled
        .first()
        .map(|(id, _)| *id)
        .or_else(|| mastered.iter().min_by_key(|id| id.as_str()).copied())?;

    select_item_for_target_with_band(target, profile, quizzes, policy, weak_set, now, (1, 2))
}

/// `FALLBACK_STRATEGY = "random"`: uniformly sample from all concepts with at least one quiz.
fn random_fallback(
    profile: &LearnerProfile,
    universe: &UstrSet,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
) -> Option<QuizItem> {
    let mut candidates: Vec<Ustr> = universe.iter().copied().collect();
    candidates.sort_by_key(|id| id.as_str().to_string());
    if candidates.is_empty() {
        return None;
    }

    let mut rng = seeded_rng(policy, "random_fallback", &candidates);
    let target = match rng.as_mut() {
        Some(rng) => *candidates.choose(rng)?,
        None => *candidates.choose(&mut rand::rng())?,
    };

    select_item_for_target(target, profile, quizzes, policy, weak_set, now, None)
}

/// Final fallback: the topologically earliest unmastered concept with at least one quiz.
fn topological_fallback(
    profile: &LearnerProfile,
    graph: &KnowledgeGraph,
    universe: &UstrSet,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
) -> Option<QuizItem> {
    graph
        .topological_order()
        .iter()
        .filter(|id| universe.contains(*id) && profile.score_of(**id) < policy.mastery_threshold)
        .find_map(|id| select_item_for_target(*id, profile, quizzes, policy, weak_set, now, None))
}

/// Computes the difficulty band for a target concept per the table in §4.4.3: whichever row
/// matches yields a candidate band, and when multiple rows match, the higher band wins.
fn difficulty_band(score: f64, accuracy: f64, mastery_threshold: f64) -> (u8, u8) {
    let mut bands: Vec<(u8, u8)> = Vec::new();
    if score <= -1.0 || accuracy < 0.50 {
        bands.push((1, 2));
    }
    if (0.0..=1.0).contains(&score) || (0.50..0.70).contains(&accuracy) {
        bands.push((2, 3));
    }
    if (score - 2.0).abs() < 1e-9 || (0.70..0.85).contains(&accuracy) {
        bands.push((3, 4));
    }
    if score > 2.0 && score < mastery_threshold {
        bands.push((4, 5));
    }
    bands.into_iter().max_by_key(|(_, hi)| *hi).unwrap_or((2, 3))
}

/// Selects a single quiz item for `target`, computing the difficulty band from the target's score
/// and recent accuracy per §4.4.3.
fn select_item_for_target(
    target: Ustr,
    profile: &LearnerProfile,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
    forced_band: Option<(u8, u8)>,
) -> Option<QuizItem> {
    let recent = profile.recent_attempts(Some(target), policy.recent_window);
    let accuracy = if recent.is_empty() {
        0.5
    } else {
        recent.iter().filter(|a| a.correct).count() as f64 / recent.len() as f64
    };
    let score = profile.score_of(target);
    let band = forced_band.unwrap_or_else(|| difficulty_band(score, accuracy, policy.mastery_threshold));

    tracing::debug!(concept_id = %target, band_low = band.0, band_high = band.1, "selection target");

    select_item_for_target_with_band(target, profile, quizzes, policy, weak_set, now, band)
}

/// As [`select_item_for_target`], but with the difficulty band fixed rather than computed, as
/// used by the `"easiest"` fallback (§4.4.5).
fn select_item_for_target_with_band(
    target: Ustr,
    profile: &LearnerProfile,
    quizzes: &[QuizItem],
    policy: &PolicyTable,
    weak_set: &UstrSet,
    now: DateTime<Utc>,
    band: (u8, u8),
) -> Option<QuizItem> {
    let candidates: Vec<&QuizItem> = quizzes.iter().filter(|q| q.links(target)).collect();
    if candidates.is_empty() {
        return None;
    }

    let widened = (band.0.saturating_sub(1).max(1), (band.1 + 1).min(5));
    for (lo, hi) in [band, widened, (1, 5)] {
        let filtered: Vec<&QuizItem> = candidates.iter().copied().filter(|q| q.in_band(lo, hi)).collect();
        if !filtered.is_empty() {
            let chosen = tie_break(filtered, profile, quizzes, weak_set, target, policy);
            return Some(chosen.clone());
        }
    }

    None
}

/// Applies the strict left-to-right tie-breaking order of §4.4.3 step 5.
fn tie_break<'a>(
    mut candidates: Vec<&'a QuizItem>,
    profile: &LearnerProfile,
    quizzes: &[QuizItem],
    weak_set: &UstrSet,
    target: Ustr,
    policy: &PolicyTable,
) -> &'a QuizItem {
    let recent = profile.recent_attempts(None, policy.recent_window);
    let recent_styles: UstrSet = recent
        .iter()
        .filter_map(|a| quizzes.iter().find(|q| q.id == a.quiz_id))
        .map(|q| Ustr::from(q.style.as_str()))
        .collect();
    let recent_ids: UstrSet = recent.iter().map(|a| a.quiz_id).collect();

    // (a) variety: style absent from the last RECENT_WINDOW attempt records.
    let variety: Vec<&QuizItem> = candidates
        .iter()
        .copied()
        .filter(|q| !recent_styles.contains(&Ustr::from(q.style.as_str())))
        .collect();
    if !variety.is_empty() {
        candidates = variety;
    }

    // (b) novelty: item itself absent from the last RECENT_WINDOW attempt records.
    let novel: Vec<&QuizItem> = candidates
        .iter()
        .copied()
        .filter(|q| !recent_ids.contains(&q.id))
        .collect();
    if !novel.is_empty() {
        candidates = novel;
    }

    // (c) multi-target bonus: greatest number of additional weak concepts covered.
    let max_weak_coverage = candidates
        .iter()
        .map(|q| weak_coverage(q, weak_set, target))
        .max()
        .unwrap_or(0);
    candidates.retain(|q| weak_coverage(q, weak_set, target) == max_weak_coverage);

    // (d) prefer lower difficulty.
    let min_difficulty = candidates.iter().map(|q| q.difficulty_level).min().unwrap();
    candidates.retain(|q| q.difficulty_level == min_difficulty);

    if candidates.len() == 1 {
        return candidates[0];
    }

    // (e) lexicographic on quiz id, unless a seeded RNG is configured to break the tie instead.
    candidates.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    if let Some(mut rng) = seeded_rng(policy, "tie_break", &candidates.iter().map(|q| q.id).collect::<Vec<_>>()) {
        return *candidates.choose(&mut rng).unwrap();
    }
    candidates[0]
}

/// The number of weak concepts (other than `target`) that `quiz` also links.
fn weak_coverage(quiz: &QuizItem, weak_set: &UstrSet, target: Ustr) -> usize {
    quiz.linked_concepts
        .iter()
        .filter(|c| **c != target && weak_set.contains(*c))
        .count()
}

/// Builds a seeded, reproducible RNG from `(policy.rng_seed, salt, a stable hash of the candidate
/// set)`, or `None` if no seed is configured (in which case callers fall back to a thread RNG and
/// accept non-deterministic tie-breaking).
fn seeded_rng(policy: &PolicyTable, salt: &str, candidates: &[Ustr]) -> Option<StdRng> {
    let seed = policy.rng_seed?;
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    salt.hash(&mut hasher);
    for id in candidates {
        id.hash(&mut hasher);
    }
    Some(StdRng::seed_from_u64(hasher.finish()))
}
