mod common;

use common::*;
use scoreboard::{Event, Graph, GraphError, Interest, Source, Value};

#[test]
fn defaults_are_visible_before_any_set() {
    let mut g = Graph::new();
    let r = root(&mut g);
    assert_eq!(g.get(r, &INT), Value::Int(0));
    assert_eq!(g.get(r, &TEXT), Value::Null);
    assert_eq!(g.get(r, &RECALCULATED), Value::Int(0));
    assert!(g.children(r, &CHILD).is_empty());
}

#[test]
fn set_reports_whether_the_value_changed() {
    let mut g = Graph::new();
    let r = root(&mut g);
    assert!(g.set(r, &INT, 4, Source::External).expect("set"));
    assert!(!g.set(r, &INT, 4, Source::External).expect("same value"));
    assert_eq!(g.get(r, &INT), Value::Int(4));
}

#[test]
fn values_must_fit_the_declared_type() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let result = g.set(r, &INT, "four", Source::External);
    assert!(matches!(result, Err(GraphError::TypeMismatch { .. })), "got {:?}", result);
    assert_eq!(g.get(r, &INT), Value::Int(0));
}

#[test]
fn undeclared_properties_are_rejected() {
    let mut g = Graph::new();
    let bare = g.create_root("Bare", &[]);
    let result = g.set(bare, &INT, 1, Source::External);
    assert!(matches!(result, Err(GraphError::UndeclaredProperty { .. })), "got {:?}", result);
}

#[test]
fn write_protection_allows_exactly_one_value() {
    let mut g = Graph::new();
    let r = root(&mut g);
    g.mark_write_protected(r, &TEXT).expect("protect");
    assert!(g.set(r, &TEXT, "first", Source::External).expect("first set"));
    let second = g.set(r, &TEXT, "second", Source::External);
    assert!(matches!(second, Err(GraphError::WriteProtected { .. })), "got {:?}", second);
    assert_eq!(g.get(r, &TEXT), Value::from("first"));
    assert!(g.is_write_protected(r, &TEXT));
}

#[test]
fn write_protected_collections_reject_changes() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let only = g.create(KIND, "", &[]);
    g.add(r, &SINGLETON, only, Source::External).expect("add singleton");
    g.mark_write_protected(r, &SINGLETON).expect("protect");
    let other = g.create(KIND, "other", &[]);
    let added = g.add(r, &SINGLETON, other, Source::External);
    assert!(matches!(added, Err(GraphError::WriteProtected { .. })), "got {:?}", added);
    let removed = g.remove(r, &SINGLETON, only, Source::External);
    assert!(matches!(removed, Err(GraphError::WriteProtected { .. })), "got {:?}", removed);
    assert_eq!(g.children(r, &SINGLETON), &[only]);
}

#[test]
fn children_are_keyed_by_id() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let a = child(&mut g, r, "a");
    let b = child(&mut g, r, "b");
    assert_eq!(g.children(r, &CHILD), &[a, b]);
    assert_eq!(g.child(r, &CHILD, "b"), Some(b));
    assert_eq!(g.child(r, &CHILD, "c"), None);
    assert_eq!(g.parent(a), Some(r));

    let twin = g.create(KIND, "a", &[]);
    let result = g.add(r, &CHILD, twin, Source::External);
    assert!(matches!(result, Err(GraphError::DuplicateId { .. })), "got {:?}", result);
    assert_eq!(g.children(r, &CHILD).len(), 2);
}

#[test]
fn a_node_has_at_most_one_parent() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let a = child(&mut g, r, "a");
    let b = child(&mut g, r, "b");
    let moved = g.add(b, &CHILD, a, Source::External);
    assert!(matches!(moved, Err(GraphError::Containment(_))), "got {:?}", moved);
    let cycle = g.add(a, &CHILD, r, Source::External);
    assert!(matches!(cycle, Err(GraphError::Containment(_))), "got {:?}", cycle);
}

#[test]
fn removing_twice_is_harmless() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let a = child(&mut g, r, "a");
    assert!(g.remove(r, &CHILD, a, Source::External).expect("first remove"));
    assert!(!g.remove(r, &CHILD, a, Source::External).expect("second remove"));
    assert!(!g.remove_id(r, &CHILD, "a", Source::External).expect("by id"));
    assert!(!g.contains(a), "removed subtree should be deleted");
}

#[test]
fn removing_a_child_deletes_its_subtree() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let a = child(&mut g, r, "a");
    let nested = child(&mut g, a, "nested");
    let before = g.len();
    assert!(g.remove_id(r, &CHILD, "a", Source::External).expect("remove"));
    assert!(!g.contains(a));
    assert!(!g.contains(nested));
    assert_eq!(g.len(), before - 2);
}

#[test]
fn commands_run_their_handler_before_announcing() {
    let mut g = Graph::new();
    let r = root(&mut g);
    g.declare_command(r, &TEST_COMMAND, |g, node, source| g.set(node, &INT, 42, source).map(|_| ()))
        .expect("declare command");
    let recorded = record(&mut g, Interest::Node(r));
    g.execute(r, &TEST_COMMAND, Source::External).expect("execute");
    let events = take(&recorded);
    assert_eq!(g.get(r, &INT), Value::Int(42));
    assert!(matches!(events.last(), Some(Event::Executed { .. })), "got {:?}", events);
    assert_eq!(changes(&events).first().map(|c| c.1), Some("Int"));
}

#[test]
fn nodes_created_by_a_failed_operation_are_discarded() {
    let mut g = Graph::new();
    let r = root(&mut g);
    g.declare_command(r, &TEST_COMMAND, |g, node, source| {
        let entry = g.create(KIND, "entry", &[&*INT]);
        g.add(node, &CHILD, entry, source)?;
        g.set(entry, &INT, "not a number", source).map(|_| ())
    })
    .expect("declare command");
    let before = g.len();
    let result = g.execute(r, &TEST_COMMAND, Source::External);
    assert!(matches!(result, Err(GraphError::TypeMismatch { .. })), "got {:?}", result);
    assert_eq!(g.len(), before);
    assert!(g.children(r, &CHILD).is_empty());
}

#[test]
fn detached_nodes_are_silent_until_attached() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let recorded = record(&mut g, Interest::All);
    let pending = g.create(KIND, "pending", &[]);
    setup(&mut g, pending);
    g.set(pending, &INT, 9, Source::External).expect("set detached");
    assert!(take(&recorded).is_empty());

    g.add(r, &CHILD, pending, Source::External).expect("attach");
    let events = take(&recorded);
    assert_eq!(events.len(), 1, "got {:?}", events);
    match &events[0] {
        Event::Added { child, id, path, .. } => {
            assert_eq!(*child, pending);
            assert_eq!(id, "pending");
            assert_eq!(path, "Test");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(g.path(pending), "Test.Child(pending)");
}

#[test]
fn listeners_only_see_what_they_subscribed_to() {
    let mut g = Graph::new();
    let r = root(&mut g);
    let a = child(&mut g, r, "a");
    let only_a = record(&mut g, Interest::Node(a));
    let by_kind = record(&mut g, Interest::Kind(KIND));
    let everything = record(&mut g, Interest::All);
    g.set(r, &TEXT, "root", Source::External).expect("set root");
    g.set(a, &TEXT, "child", Source::External).expect("set child");
    assert_eq!(take(&only_a).len(), 1);
    assert_eq!(take(&by_kind).len(), 2);
    let all = take(&everything);
    assert_eq!(all.len(), 2);

    let listener = g.subscribe(Interest::All, |_| {});
    assert!(g.unsubscribe(listener));
    assert!(!g.unsubscribe(listener));
}
