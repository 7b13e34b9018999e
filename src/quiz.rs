//! Quiz items: the fixed, caller-supplied bank the selection engine chooses from.

use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// A single quiz item. Identity is by [`QuizItem::id`]; two items with the same id are considered
/// the same item.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QuizItem {
    /// The item's stable identifier.
    pub id: Ustr,
    /// The non-empty, ordered list of concepts this item exercises.
    pub linked_concepts: Vec<Ustr>,
    /// The item's difficulty level, in the integer range `[1, 5]`.
    pub difficulty_level: u8,
    /// A free-form category such as `"fill-in-blank"` or `"multiple-choice"`.
    pub style: String,
    /// Opaque presentation content shown to the learner.
    pub content: String,
}

impl PartialEq for QuizItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QuizItem {}

impl QuizItem {
    /// Returns whether this item's difficulty falls within the inclusive `[low, high]` band.
    #[must_use]
    pub fn in_band(&self, low: u8, high: u8) -> bool {
        self.difficulty_level >= low && self.difficulty_level <= high
    }

    /// Returns whether this item exercises the given concept.
    #[must_use]
    pub fn links(&self, concept_id: Ustr) -> bool {
        self.linked_concepts.contains(&concept_id)
    }
}
