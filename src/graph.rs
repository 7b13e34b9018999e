//! The knowledge graph: concept nodes and prerequisite-of edges, with acyclicity guaranteed at
//! construction and pure, memoized traversal queries.
//!
//! The graph is a plain immutable value: cycle checking happens once, at construction, rather
//! than being a separate fallible call threaded through every mutation.


use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ustr::{Ustr, UstrMap, UstrSet};

use crate::error::QuizCoreError;

/// A unit of knowledge identified by a stable string id. Two concepts are equal iff their ids
/// match; name and metadata are not considered.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Concept {
    /// The concept's stable, case-sensitive, opaque identifier.
    pub id: Ustr,
    /// A human-readable name.
    pub name: String,
    /// An opaque, free-form description shown to the caller alongside the concept.
    pub description: Option<String>,
    /// Opaque free-form examples associated with the concept.
    pub examples: Vec<String>,
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Concept {}

impl Concept {
    /// Creates a new concept with the given id and name and no further metadata.
    #[must_use]
    pub fn new(id: impl Into<Ustr>, name: impl Into<String>) -> Self {
        Concept {
            id: id.into(),
            name: name.into(),
            description: None,
            examples: Vec::new(),
        }
    }
}

/// A directed acyclic graph over concepts, with edges representing the "prerequisite-of"
/// relation: an edge `(p, c)` means `p` is a direct prerequisite of `c`.
///
/// The graph is immutable after construction; any update must be modeled as constructing a
/// replacement graph, which re-verifies acyclicity (§4.2).
#[derive(Clone, Debug)]
pub struct KnowledgeGraph {
    concepts: UstrMap<Concept>,
    /// concept id -> set of its direct prerequisites.
    prerequisites_of: UstrMap<UstrSet>,
    /// concept id -> set of concepts that directly depend on it.
    dependents_of: UstrMap<UstrSet>,
    /// A valid topological linearization of the graph, computed once at construction, with ties
    /// broken by concept id ascending.
    topological_order: Vec<Ustr>,
}

impl KnowledgeGraph {
    /// Builds a new knowledge graph from a collection of concepts and a collection of directed
    /// `(prerequisite, dependent)` edges.
    ///
    /// Fails with [`QuizCoreError::UnknownConcept`] if an edge references a concept not present in
    /// `concepts`, and with [`QuizCoreError::CycleDetected`] if the resulting graph contains any
    /// directed cycle, naming the offending cycle.
    pub fn new(
        concepts: Vec<Concept>,
        edges: Vec<(Ustr, Ustr)>,
    ) -> Result<Self, QuizCoreError> {
        let concepts: UstrMap<Concept> = concepts.into_iter().map(|c| (c.id, c)).collect();

        let mut prerequisites_of: UstrMap<UstrSet> = UstrMap::default();
        let mut dependents_of: UstrMap<UstrSet> = UstrMap::default();
        for id in concepts.keys() {
            prerequisites_of.entry(*id).or_default();
            dependents_of.entry(*id).or_default();
        }

        for (prereq, dependent) in &edges {
            if !concepts.contains_key(prereq) {
                return Err(QuizCoreError::UnknownConcept {
                    concept_id: *prereq,
                });
            }
            if !concepts.contains_key(dependent) {
                return Err(QuizCoreError::UnknownConcept {
                    concept_id: *dependent,
                });
            }
            prerequisites_of.entry(*dependent).or_default().insert(*prereq);
            dependents_of.entry(*prereq).or_default().insert(*dependent);
        }

        let topological_order = Self::topological_sort(&concepts, &prerequisites_of)?;

        Ok(KnowledgeGraph {
            concepts,
            prerequisites_of,
            dependents_of,
            topological_order,
        })
    }

    /// Computes a topological linearization via Kahn's algorithm, always expanding the
    /// lexicographically smallest ready id first so the result is deterministic across calls.
    /// Returns [`QuizCoreError::CycleDetected`] naming one offending cycle if the graph is not a
    /// DAG.
    fn topological_sort(
        concepts: &UstrMap<Concept>,
        prerequisites_of: &UstrMap<UstrSet>,
    ) -> Result<Vec<Ustr>, QuizCoreError> {
        let mut in_degree: HashMap<Ustr, usize> = concepts
            .keys()
            .map(|id| (*id, prerequisites_of.get(id).map_or(0, HashSet::len)))
            .collect();

        let mut ready: Vec<Ustr> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let mut order = Vec::with_capacity(concepts.len());
        let mut dependents_of: UstrMap<UstrSet> = UstrMap::default();
        for (dependent, prereqs) in prerequisites_of {
            for prereq in prereqs {
                dependents_of.entry(*prereq).or_default().insert(*dependent);
            }
        }

        while let Some(id) = ready.first().copied() {
            ready.remove(0);
            order.push(id);

            if let Some(dependents) = dependents_of.get(&id) {
                let mut newly_ready = Vec::new();
                for dependent in dependents {
                    let deg = in_degree.get_mut(dependent).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(*dependent);
                    }
                }
                ready.extend(newly_ready);
                ready.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                ready.dedup();
            }
        }

        if order.len() != concepts.len() {
            let remaining: Vec<Ustr> = concepts
                .keys()
                .filter(|id| !order.contains(id))
                .copied()
                .collect();
            let cycle = Self::find_cycle(&remaining, prerequisites_of);
            return Err(QuizCoreError::CycleDetected { cycle });
        }

        Ok(order)
    }

    /// Walks upward from an arbitrary node still lacking zero in-degree to recover one concrete
    /// cycle, for use in [`QuizCoreError::CycleDetected`]'s diagnostic payload.
    fn find_cycle(remaining: &[Ustr], prerequisites_of: &UstrMap<UstrSet>) -> Vec<Ustr> {
        let remaining_set: UstrSet = remaining.iter().copied().collect();
        let mut start = *remaining.iter().min_by_key(|id| id.as_str()).unwrap();
        let mut path = vec![start];
        let mut seen_at: HashMap<Ustr, usize> = HashMap::from([(start, 0)]);

        loop {
            let mut prereqs: Vec<Ustr> = prerequisites_of
                .get(&start)
                .into_iter()
                .flatten()
                .filter(|id| remaining_set.contains(*id))
                .copied()
                .collect();
            prereqs.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            let next = prereqs[0];

            if let Some(cycle_start) = seen_at.get(&next) {
                let mut cycle = path[*cycle_start..].to_vec();
                cycle.push(next);
                return cycle;
            }

            seen_at.insert(next, path.len());
            path.push(next);
            start = next;
        }
    }

    /// Returns the concept with the given id, if present.
    #[must_use]
    pub fn concept(&self, id: Ustr) -> Option<&Concept> {
        self.concepts.get(&id)
    }

    /// Returns whether the given concept id is present in the graph.
    #[must_use]
    pub fn contains(&self, id: Ustr) -> bool {
        self.concepts.contains_key(&id)
    }

    /// Returns the subset of `ids` that are *not* present in the graph.
    #[must_use]
    pub fn validate_nodes_exist(&self, ids: &[Ustr]) -> Vec<Ustr> {
        ids.iter().filter(|id| !self.contains(**id)).copied().collect()
    }

    /// Returns the set of immediate upstream concepts of `id` (its direct prerequisites).
    pub fn direct_prerequisites(&self, id: Ustr) -> Result<UstrSet, QuizCoreError> {
        self.prerequisites_of
            .get(&id)
            .cloned()
            .ok_or(QuizCoreError::UnknownConcept { concept_id: id })
    }

    /// Returns the reflexive-transitive upstream closure of `id`, excluding `id` itself.
    pub fn transitive_prerequisites(&self, id: Ustr) -> Result<UstrSet, QuizCoreError> {
        if !self.contains(id) {
            return Err(QuizCoreError::UnknownConcept { concept_id: id });
        }

        let mut visited = UstrSet::default();
        let mut stack: Vec<Ustr> = self.prerequisites_of[&id].iter().copied().collect();
        while let Some(current) = stack.pop() {
            if visited.insert(current) {
                stack.extend(self.prerequisites_of[&current].iter().copied());
            }
        }
        Ok(visited)
    }

    /// Returns the symmetric downward closure of `id`: every concept reachable by following
    /// prerequisite edges downward, excluding `id` itself.
    pub fn dependents(&self, id: Ustr) -> Result<UstrSet, QuizCoreError> {
        if !self.contains(id) {
            return Err(QuizCoreError::UnknownConcept { concept_id: id });
        }

        let mut visited = UstrSet::default();
        let mut stack: Vec<Ustr> = self.dependents_of[&id].iter().copied().collect();
        while let Some(current) = stack.pop() {
            if visited.insert(current) {
                stack.extend(self.dependents_of[&current].iter().copied());
            }
        }
        Ok(visited)
    }

    /// Returns a valid topological linearization of the graph, ties broken by concept id
    /// ascending. Stable across calls for an unchanged graph (computed once at construction).
    #[must_use]
    pub fn topological_order(&self) -> &[Ustr] {
        &self.topological_order
    }

    /// Returns an iterator over every concept id in the graph.
    pub fn concept_ids(&self) -> impl Iterator<Item = Ustr> + '_ {
        self.concepts.keys().copied()
    }

    /// The number of concepts in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Whether the graph contains no concepts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}
