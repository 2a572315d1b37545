//! Graph Query Engine
//!
//! Breadth-first traversals over `ParentChild` edges. Results are ordered by
//! generation (closest first), ties broken by relationship insertion order.
//! Visited ids are tracked so a malformed graph with a cycle still terminates.

use super::{FamilyGraph, Person, RelationshipKind};
use std::collections::{HashMap, HashSet, VecDeque};

/// Traversal bounds shared by all queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Maximum number of generations to walk. `None` walks all of them.
    pub max_depth: Option<usize>,
    /// Put the starting person first in the result.
    pub include_self: bool,
}

impl TraversalOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn including_self(mut self) -> Self {
        self.include_self = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    /// child -> parent
    Up,
    /// parent -> child
    Down,
}

/// All ancestors of `person_id`, closest generation first.
pub fn find_ancestors<'g>(
    graph: &'g FamilyGraph,
    person_id: &str,
    options: &TraversalOptions,
) -> Vec<&'g Person> {
    traverse(graph, person_id, options, Direction::Up)
}

/// All descendants of `person_id`, closest generation first.
pub fn find_descendants<'g>(
    graph: &'g FamilyGraph,
    person_id: &str,
    options: &TraversalOptions,
) -> Vec<&'g Person> {
    traverse(graph, person_id, options, Direction::Down)
}

/// Ancestors shared by `first` and `second`, in `first`'s ancestor order.
///
/// Both sides are walked with the same `options`, so a depth bound applies
/// symmetrically.
pub fn find_common_ancestors<'g>(
    graph: &'g FamilyGraph,
    first: &str,
    second: &str,
    options: &TraversalOptions,
) -> Vec<&'g Person> {
    let theirs: HashSet<&str> = find_ancestors(graph, second, options)
        .into_iter()
        .map(|p| p.id.as_str())
        .collect();
    if theirs.is_empty() {
        return Vec::new();
    }
    find_ancestors(graph, first, options)
        .into_iter()
        .filter(|p| theirs.contains(p.id.as_str()))
        .collect()
}

/// Per-query lookup tables: people by id and `ParentChild` neighbours in one direction.
struct Index<'g> {
    people: HashMap<&'g str, &'g Person>,
    neighbours: HashMap<&'g str, Vec<&'g str>>,
}

impl<'g> Index<'g> {
    fn build(graph: &'g FamilyGraph, direction: Direction) -> Self {
        let mut people = HashMap::with_capacity(graph.people.len());
        for person in &graph.people {
            people.entry(person.id.as_str()).or_insert(person);
        }
        // Neighbour lists keep relationship insertion order.
        let mut neighbours: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in graph
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::ParentChild)
        {
            let (from, to) = match direction {
                Direction::Up => (edge.target.as_str(), edge.source.as_str()),
                Direction::Down => (edge.source.as_str(), edge.target.as_str()),
            };
            neighbours.entry(from).or_default().push(to);
        }
        Self { people, neighbours }
    }
}

fn traverse<'g>(
    graph: &'g FamilyGraph,
    start: &str,
    options: &TraversalOptions,
    direction: Direction,
) -> Vec<&'g Person> {
    let index = Index::build(graph, direction);
    let Some(&origin) = index.people.get(start) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    if options.include_self {
        result.push(origin);
    }

    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(origin.id.as_str());
    let mut frontier: VecDeque<(&str, usize)> = VecDeque::new();
    frontier.push_back((origin.id.as_str(), 0));

    while let Some((current, depth)) = frontier.pop_front() {
        if options.max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        let Some(next_ids) = index.neighbours.get(current) else {
            continue;
        };
        for &next in next_ids {
            if !visited.insert(next) {
                continue;
            }
            // Edges may point at people that are not loaded; skip them but keep
            // them visited so they are not re-examined.
            let Some(&person) = index.people.get(next) else {
                continue;
            };
            result.push(person);
            frontier.push_back((person.id.as_str(), depth + 1));
        }
    }

    result
}
