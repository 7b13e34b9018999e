//! End-to-end tests exercising the public facade against the scenarios in §8.
//!
//! Each test builds a small graph and quiz bank by hand and drives only [`QuizCore`]'s public
//! operations rather than reaching into internal modules.

use chrono::{DateTime, Duration, TimeZone, Utc};
use quizcore::{Concept, FallbackStrategy, KnowledgeGraph, LearnerProfile, PolicyTable, QuizCore, QuizItem};
use ustr::Ustr;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn concept(id: &str) -> Concept {
    Concept::new(Ustr::from(id), id)
}

fn quiz(id: &str, concepts: &[&str], difficulty: u8) -> QuizItem {
    QuizItem {
        id: Ustr::from(id),
        linked_concepts: concepts.iter().map(|c| Ustr::from(*c)).collect(),
        difficulty_level: difficulty,
        style: "multiple-choice".to_string(),
        content: String::new(),
    }
}

/// A correct answer on a fresh concept advances its score and schedule.
#[test]
fn basic_correct_answer_advances_score_and_schedule() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let profile = LearnerProfile::new("learner", t0());
    let q1 = quiz("Q1", &["A"], 3);

    let updated = core.update_scores(&profile, &q1, true, t0()).unwrap();

    assert_eq!(updated.score_of(Ustr::from("A")), 1.0);
    assert_eq!(updated.schedule[&Ustr::from("A")].interval_index, 1);
    assert_eq!(updated.schedule[&Ustr::from("A")].next_due_at, t0() + Duration::days(3));
    assert_eq!(updated.total_attempts, 1);
    assert_eq!(updated.total_correct, 1);
    assert_eq!(updated.history.len(), 1);
}

/// A correct answer also nudges the answered concept's direct prerequisites.
#[test]
fn prerequisite_bonus_applied_on_correct_answer() {
    let graph = KnowledgeGraph::new(
        vec![concept("A"), concept("B")],
        vec![(Ustr::from("A"), Ustr::from("B"))],
    )
    .unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let profile = LearnerProfile::new("learner", t0());
    let q2 = quiz("Q2", &["B"], 3);

    let updated = core.update_scores(&profile, &q2, true, t0()).unwrap();

    assert_eq!(updated.score_of(Ustr::from("B")), 1.0);
    assert_eq!(updated.score_of(Ustr::from("A")), 0.1);
    assert!(!updated.schedule.contains_key(&Ustr::from("A")));
}

/// Prerequisite gating: the engine walks up to the unmet prerequisite rather than
/// surfacing the locked dependent.
#[test]
fn prerequisite_gating_walks_up_to_unmet_prerequisite() {
    let graph = KnowledgeGraph::new(
        vec![concept("A"), concept("B")],
        vec![(Ustr::from("A"), Ustr::from("B"))],
    )
    .unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    profile.scores.insert(Ustr::from("A"), -1.0);

    let quizzes = vec![quiz("Q_A", &["A"], 1), quiz("Q_B", &["B"], 3)];
    let chosen = core.suggest_next_quiz(&profile, &quizzes, t0()).unwrap();
    assert_eq!(chosen.id, Ustr::from("Q_A"));
}

/// Weakness-first ordering: the weakest concept is targeted first.
#[test]
fn weakness_first_ordering_targets_lowest_score() {
    let graph = KnowledgeGraph::new(vec![concept("A"), concept("B"), concept("C")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    profile.scores.insert(Ustr::from("A"), 2.0);
    profile.scores.insert(Ustr::from("B"), -1.0);
    profile.scores.insert(Ustr::from("C"), 0.0);

    let quizzes = vec![quiz("QA", &["A"], 2), quiz("QB", &["B"], 2), quiz("QC", &["C"], 2)];
    let chosen = core.suggest_next_quiz(&profile, &quizzes, t0()).unwrap();
    assert_eq!(chosen.id, Ustr::from("QB"));
}

/// A review-due, in-progress concept produces a quiz rather than `NoQuizAvailable`.
#[test]
fn review_due_concept_produces_a_quiz() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    profile.scores.insert(Ustr::from("A"), 2.0);
    profile.schedule.insert(
        Ustr::from("A"),
        quizcore::ScheduleEntry {
            next_due_at: t0() - Duration::hours(1),
            ..quizcore::ScheduleEntry::fresh(t0())
        },
    );

    let quizzes = vec![quiz("QA", &["A"], 2)];
    let chosen = core.suggest_next_quiz(&profile, &quizzes, t0()).unwrap();
    assert_eq!(chosen.id, Ustr::from("QA"));
}

/// Repeated correct answers clamp at the score ceiling rather than overshooting.
#[test]
fn clamp_on_repeated_correct_answers() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    profile.scores.insert(Ustr::from("A"), 9.5);
    let q1 = quiz("Q1", &["A"], 3);

    profile = core.update_scores(&profile, &q1, true, t0()).unwrap();
    profile = core.update_scores(&profile, &q1, true, t0()).unwrap();

    assert_eq!(profile.score_of(Ustr::from("A")), 10.0);
    assert_eq!(profile.total_correct, 2);
}

/// The "raise" fallback fails with `NoQuizAvailable` on an empty quiz bank.
#[test]
fn raise_fallback_on_empty_bank() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let policy = PolicyTable {
        fallback_strategy: FallbackStrategy::Raise,
        ..PolicyTable::default()
    };
    let core = QuizCore::new(graph, policy).unwrap();
    let profile = LearnerProfile::new("learner", t0());

    let result = core.suggest_next_quiz(&profile, &[], t0());
    assert!(matches!(result, Err(quizcore::QuizCoreError::NoQuizAvailable)));
}

/// A full suggest -> answer -> suggest round trip: answering correctly should move the learner
/// off the weakest concept and onto the next one.
#[test]
fn suggest_then_update_then_suggest_progresses() {
    let graph = KnowledgeGraph::new(vec![concept("A"), concept("B")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    profile.scores.insert(Ustr::from("A"), -2.0);
    profile.scores.insert(Ustr::from("B"), -1.0);

    let quizzes = vec![quiz("QA", &["A"], 2), quiz("QB", &["B"], 2)];

    let first = core.suggest_next_quiz(&profile, &quizzes, t0()).unwrap();
    assert_eq!(first.id, Ustr::from("QA"));

    // Answer A correctly enough times that B becomes the weaker concept.
    for _ in 0..3 {
        profile = core.update_scores(&profile, &first, true, t0()).unwrap();
    }
    assert!(profile.score_of(Ustr::from("A")) > profile.score_of(Ustr::from("B")));

    let second = core.suggest_next_quiz(&profile, &quizzes, t0()).unwrap();
    assert_eq!(second.id, Ustr::from("QB"));
}

/// `get_learning_progress` partitions concepts and reports aggregates without mutating the
/// profile.
#[test]
fn progress_reports_accuracy_and_does_not_mutate() {
    let graph = KnowledgeGraph::new(vec![concept("A"), concept("B")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    let quizzes = vec![quiz("QA", &["A"], 2), quiz("QB", &["B"], 2)];

    profile = core.update_scores(&profile, &quizzes[0], true, t0()).unwrap();
    profile = core.update_scores(&profile, &quizzes[1], false, t0()).unwrap();
    let before = profile.clone();

    let progress = core.get_learning_progress(&profile, t0());
    assert_eq!(progress.total_attempts, 2);
    assert_eq!(progress.overall_accuracy, 0.5);
    assert_eq!(profile, before);
}

/// `reset_user_progress` with no concept filter clears scores, schedule, and history but keeps
/// the learner id and is idempotent under a second reset.
#[test]
fn reset_clears_state_and_is_stable_on_repeat() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    let q1 = quiz("Q1", &["A"], 3);
    profile = core.update_scores(&profile, &q1, true, t0()).unwrap();

    let reset_once = core.reset_user_progress(&profile, None, t0());
    let reset_twice = core.reset_user_progress(&reset_once, None, t0());
    assert_eq!(reset_once.scores, reset_twice.scores);
    assert!(reset_twice.scores.is_empty());
    assert_eq!(reset_twice.learner_id, "learner");
}

/// `recent_attempts` returns at most `k` entries, most-recent-first.
#[test]
fn recent_attempts_caps_and_orders_most_recent_first() {
    let graph = KnowledgeGraph::new(vec![concept("A")], vec![]).unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner", t0());
    let q1 = quiz("Q1", &["A"], 3);

    for i in 0..5 {
        let correct = i % 2 == 0;
        profile = core.update_scores(&profile, &q1, correct, t0() + Duration::minutes(i)).unwrap();
    }

    let last_two = core.recent_attempts(&profile, None, 2);
    assert_eq!(last_two.len(), 2);
    assert_eq!(last_two[0].timestamp, t0() + Duration::minutes(4));
    assert_eq!(last_two[1].timestamp, t0() + Duration::minutes(3));
}

/// A profile round-tripped through `serde_json` preserves every field and invariant,
/// within 1 ULP for floating-point scores.
#[test]
fn profile_round_trips_through_json() {
    let graph = KnowledgeGraph::new(
        vec![concept("A"), concept("B")],
        vec![(Ustr::from("A"), Ustr::from("B"))],
    )
    .unwrap();
    let core = QuizCore::with_default_policy(graph).unwrap();
    let mut profile = LearnerProfile::new("learner-42", t0());
    let q1 = quiz("Q1", &["A"], 3);
    let q2 = quiz("Q2", &["B"], 4);
    profile = core.update_scores(&profile, &q1, true, t0()).unwrap();
    profile = core.update_scores(&profile, &q2, false, t0() + Duration::days(1)).unwrap();

    let json = serde_json::to_string(&profile).unwrap();
    let round_tripped: LearnerProfile = serde_json::from_str(&json).unwrap();

    assert_eq!(round_tripped, profile);
    for (concept_id, score) in &profile.scores {
        assert_eq!(round_tripped.scores[concept_id], *score);
    }
}
