#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use scoreboard::{CopySource, Event, Graph, Interest, NodeId, Property, Source, Value, ValueType};

pub const KIND: &str = "Test";

lazy_static! {
    pub static ref INT: Property = Property::permanent("Int", ValueType::Int, 0);
    pub static ref TEXT: Property = Property::permanent("Text", ValueType::Text, Value::Null);
    pub static ref REFERENCE: Property = Property::permanent("Reference", ValueType::Entity, Value::Null);
    pub static ref MULTIPLE: Property = Property::references("Multiple");
    pub static ref RO_INDIRECT_COPY: Property = Property::permanent("RoIndirectCopy", ValueType::Int, 0);
    pub static ref RW_INDIRECT_COPY: Property = Property::permanent("RwIndirectCopy", ValueType::Int, 0);
    pub static ref RECALCULATED: Property = Property::permanent("Recalculated", ValueType::Int, 0);
    pub static ref CHILD: Property = Property::children("Child");
    pub static ref SINGLETON: Property = Property::children("Singleton");
    pub static ref TEST_COMMAND: Property = Property::command("TestCommand");
}

pub fn properties() -> Vec<&'static Property> {
    vec![
        &*INT,
        &*TEXT,
        &*REFERENCE,
        &*MULTIPLE,
        &*RO_INDIRECT_COPY,
        &*RW_INDIRECT_COPY,
        &*RECALCULATED,
        &*CHILD,
        &*SINGLETON,
        &*TEST_COMMAND,
    ]
}

/// Reference and Multiple are two ends of one relationship, the copies read
/// Int through Reference, and Recalculated is minus the sum of the own Int and
/// the referenced one.
pub fn setup(g: &mut Graph, node: NodeId) {
    g.declare_properties(node, &properties()).expect("declare");
    g.bind_inverse(node, &MULTIPLE, &REFERENCE).expect("inverse");
    g.bind_inverse(node, &REFERENCE, &MULTIPLE).expect("inverse");
    g.bind_copy(node, &RO_INDIRECT_COPY, CopySource::Via(&REFERENCE), &INT, true).expect("ro copy");
    g.bind_copy(node, &RW_INDIRECT_COPY, CopySource::Via(&REFERENCE), &INT, false).expect("rw copy");
    g.declare_computed(node, &RECALCULATED, |d| {
        let own = d.get(&INT).as_int().unwrap_or(0);
        let referenced = d.via(&REFERENCE, &INT).and_then(|v| v.as_int()).unwrap_or(0);
        Value::Int(-(own + referenced))
    })
    .expect("recalculated");
    g.add_direct_source(node, &RECALCULATED, &INT).expect("direct source");
    g.add_indirect_source(node, &RECALCULATED, &REFERENCE, &INT).expect("indirect source");
}

pub fn root(g: &mut Graph) -> NodeId {
    let node = g.create_root(KIND, &[]);
    setup(g, node);
    node
}

/// A fixture node attached under `parent.Child`.
pub fn child(g: &mut Graph, parent: NodeId, id: &str) -> NodeId {
    let node = g.create(KIND, id, &[]);
    setup(g, node);
    g.add(parent, &CHILD, node, Source::External).expect("add child");
    node
}

pub type Recorded = Arc<Mutex<Vec<Event>>>;

pub fn record(g: &mut Graph, interest: Interest) -> Recorded {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    g.subscribe(interest, move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub fn take(recorded: &Recorded) -> Vec<Event> {
    std::mem::take(&mut *recorded.lock().unwrap())
}

/// `(node, property, value, last)` of every value change.
pub fn changes(events: &[Event]) -> Vec<(NodeId, &'static str, Value, Value)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Changed { node, property, value, last, .. } => {
                Some((*node, property.name(), value.clone(), last.clone()))
            }
            _ => None,
        })
        .collect()
}
