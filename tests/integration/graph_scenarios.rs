//! Multi-generation family scenarios through the public graph API.

use tempfile::TempDir;
use vaya::graph::persistence::{GraphRepository, SledGraphRepository};
use vaya::graph::{
    find_ancestors, find_common_ancestors, find_descendants, FamilyGraph, PersonData,
    RelationshipKind, TraversalOptions,
};

struct Family {
    graph: FamilyGraph,
    grandma: String,
    grandpa: String,
    mother: String,
    uncle: String,
    aunt_in_law: String,
    me: String,
    cousin: String,
}

fn names(people: &[&vaya::Person]) -> Vec<String> {
    people.iter().map(|p| p.data.full_name.clone()).collect()
}

/// grandma + grandpa -> mother, uncle; mother -> me; uncle + aunt_in_law -> cousin
fn three_generations() -> Family {
    let mut graph = FamilyGraph::new("asante");
    let mut add = |name: &str| graph.add_person(PersonData::new(name)).unwrap().id;
    let grandma = add("Grandma Efua");
    let grandpa = add("Grandpa Kwame");
    let mother = add("Mother Ama");
    let uncle = add("Uncle Yaw");
    let aunt_in_law = add("Aunt Akosua");
    let me = add("Me");
    let cousin = add("Cousin Kojo");

    for (parent, child) in [
        (&grandma, &mother),
        (&grandpa, &mother),
        (&grandma, &uncle),
        (&grandpa, &uncle),
        (&mother, &me),
        (&uncle, &cousin),
        (&aunt_in_law, &cousin),
    ] {
        graph.add_relationship(parent, child, RelationshipKind::ParentChild, None);
    }
    graph.add_relationship(&grandma, &grandpa, RelationshipKind::Spouse, None);
    graph.add_relationship(&uncle, &aunt_in_law, RelationshipKind::Spouse, None);

    Family {
        graph,
        grandma,
        grandpa,
        mother,
        uncle,
        aunt_in_law,
        me,
        cousin,
    }
}

#[test]
fn ancestors_come_back_generation_by_generation() {
    let family = three_generations();
    let ancestors = find_ancestors(&family.graph, &family.me, &TraversalOptions::default());
    assert_eq!(
        names(&ancestors),
        vec!["Mother Ama", "Grandma Efua", "Grandpa Kwame"]
    );

    let parents_only = find_ancestors(
        &family.graph,
        &family.me,
        &TraversalOptions::default().with_max_depth(1).including_self(),
    );
    assert_eq!(names(&parents_only), vec!["Me", "Mother Ama"]);
}

#[test]
fn descendants_ignore_spouse_edges() {
    let family = three_generations();
    let descendants = find_descendants(&family.graph, &family.grandma, &TraversalOptions::default());
    assert_eq!(
        names(&descendants),
        vec!["Mother Ama", "Uncle Yaw", "Me", "Cousin Kojo"]
    );

    let in_law = find_descendants(&family.graph, &family.aunt_in_law, &TraversalOptions::default());
    assert_eq!(names(&in_law), vec!["Cousin Kojo"]);
    let uncle = find_descendants(&family.graph, &family.uncle, &TraversalOptions::default());
    assert_eq!(names(&uncle), names(&in_law));
}

#[test]
fn cousins_share_grandparents() {
    let family = three_generations();
    let common = find_common_ancestors(
        &family.graph,
        &family.me,
        &family.cousin,
        &TraversalOptions::default(),
    );
    assert_eq!(names(&common), vec!["Grandma Efua", "Grandpa Kwame"]);

    let reversed = find_common_ancestors(
        &family.graph,
        &family.cousin,
        &family.me,
        &TraversalOptions::default(),
    );
    assert_eq!(reversed.len(), 2);

    // depth 1 on both sides: parents never overlap
    let shallow = find_common_ancestors(
        &family.graph,
        &family.me,
        &family.cousin,
        &TraversalOptions::default().with_max_depth(1),
    );
    assert!(shallow.is_empty());
}

#[test]
fn removing_a_generation_cuts_the_line() {
    let mut family = three_generations();
    let removal = family.graph.delete_person(&family.mother).unwrap();
    // two parent edges in, one child edge out
    assert_eq!(removal.relationships.len(), 3);
    assert!(family.graph.dangling_relationships().is_empty());

    assert!(find_ancestors(&family.graph, &family.me, &TraversalOptions::default()).is_empty());
    let descendants = find_descendants(&family.graph, &family.grandpa, &TraversalOptions::default());
    assert_eq!(names(&descendants), vec!["Uncle Yaw", "Cousin Kojo"]);

    assert!(family.graph.delete_person(&family.mother).is_none());
}

#[test]
fn stored_graph_answers_the_same_queries() {
    let dir = TempDir::new().unwrap();
    let family = three_generations();
    let db = sled::open(dir.path()).unwrap();
    let repo = SledGraphRepository::from_db(&db).unwrap();
    repo.save(&family.graph).unwrap();

    let loaded = repo.load("asante").unwrap().unwrap();
    assert_eq!(loaded, family.graph);
    assert_eq!(
        names(&find_ancestors(&loaded, &family.cousin, &TraversalOptions::default())),
        vec!["Uncle Yaw", "Aunt Akosua", "Grandma Efua", "Grandpa Kwame"]
    );
    assert_eq!(repo.list().unwrap(), vec!["asante".to_string()]);
    assert!(repo.delete("asante").unwrap());
    assert!(repo.load("asante").unwrap().is_none());
}
