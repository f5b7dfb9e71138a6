//! Notifications and their delivery.
//!
//! Mutations never call listeners directly. They push an [`Event`] onto the
//! graph-wide [`EventQueue`]; when the outermost batch closes the queue is
//! collapsed and handed to the registered listeners in mutation order.

use std::collections::HashMap;

use serde::Serialize;
use tracing::trace;

use crate::node::{NodeHasher, NodeId};
use crate::property::Property;
use crate::value::Value;

/// Who caused a mutation. Listeners use it to tell a direct request from a
/// side effect so they can avoid feeding changes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    /// A caller of the public API.
    External,
    /// A background collaborator such as the media watcher.
    Watcher,
    /// The other half of an inverse binding.
    Inverse,
    /// A copy binding mirroring its source.
    Copy,
    /// A computed property being rederived.
    Recalculate,
    /// Bindings severed because a node left the graph.
    Unlink,
}
impl Source {
    pub fn is_propagated(&self) -> bool {
        !matches!(self, Source::External | Source::Watcher)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    Changed {
        node: NodeId,
        kind: &'static str,
        path: String,
        property: &'static Property,
        value: Value,
        last: Value,
        source: Source,
    },
    Added {
        node: NodeId,
        kind: &'static str,
        path: String,
        property: &'static Property,
        child: NodeId,
        id: String,
        source: Source,
    },
    Removed {
        node: NodeId,
        kind: &'static str,
        path: String,
        property: &'static Property,
        child: NodeId,
        id: String,
        source: Source,
    },
    Executed {
        node: NodeId,
        kind: &'static str,
        path: String,
        property: &'static Property,
        source: Source,
    },
}

impl Event {
    pub fn node(&self) -> NodeId {
        match self {
            Event::Changed { node, .. }
            | Event::Added { node, .. }
            | Event::Removed { node, .. }
            | Event::Executed { node, .. } => *node,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Changed { kind, .. }
            | Event::Added { kind, .. }
            | Event::Removed { kind, .. }
            | Event::Executed { kind, .. } => kind,
        }
    }
    pub fn path(&self) -> &str {
        match self {
            Event::Changed { path, .. }
            | Event::Added { path, .. }
            | Event::Removed { path, .. }
            | Event::Executed { path, .. } => path,
        }
    }
    pub fn property(&self) -> &'static Property {
        match self {
            Event::Changed { property, .. }
            | Event::Added { property, .. }
            | Event::Removed { property, .. }
            | Event::Executed { property, .. } => property,
        }
    }
    pub fn source(&self) -> Source {
        match self {
            Event::Changed { source, .. }
            | Event::Added { source, .. }
            | Event::Removed { source, .. }
            | Event::Executed { source, .. } => *source,
        }
    }
}

// ------------- Queue -------------
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    depth: usize,
    pending: Vec<Event>,
}

impl EventQueue {
    pub fn begin(&mut self) {
        self.depth += 1;
    }
    /// Closes one level; true when that was the outermost one.
    pub fn end(&mut self) -> bool {
        match self.depth {
            0 => false,
            _ => {
                self.depth -= 1;
                self.depth == 0
            }
        }
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn push(&mut self, event: Event) {
        self.pending.push(event);
    }
    pub fn len(&self) -> usize {
        self.pending.len()
    }
    pub fn truncate(&mut self, len: usize) {
        self.pending.truncate(len);
    }
    /// Takes everything queued so far, with repeated value changes folded.
    pub fn drain(&mut self) -> Vec<Event> {
        collapse(std::mem::take(&mut self.pending))
    }
}

/// Folds value changes of the same (node, property) into the first one, which
/// keeps its position and `last` but takes the final value and source. Changes
/// that end where they started are dropped.
fn collapse(events: Vec<Event>) -> Vec<Event> {
    let mut folded: Vec<Event> = Vec::with_capacity(events.len());
    let mut first: HashMap<(NodeId, &'static str), usize, NodeHasher> = HashMap::default();
    for event in events {
        if let Event::Changed { node, property, value, source, .. } = &event {
            if let Some(&index) = first.get(&(*node, property.name())) {
                if let Event::Changed { value: kept, source: kept_source, .. } = &mut folded[index] {
                    *kept = value.clone();
                    *kept_source = *source;
                }
                continue;
            }
            first.insert((*node, property.name()), folded.len());
        }
        folded.push(event);
    }
    folded.retain(|event| !matches!(event, Event::Changed { value, last, .. } if value == last));
    folded
}

// ------------- Listeners -------------
/// Which events a listener wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    All,
    /// Every node of one entity kind.
    Kind(&'static str),
    Node(NodeId),
}
impl Interest {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Interest::All => true,
            Interest::Kind(kind) => event.kind() == *kind,
            Interest::Node(node) => event.node() == *node,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Callback = Box<dyn FnMut(&Event) + Send>;

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    registered: Vec<(ListenerId, Interest, Callback)>,
}

impl Listeners {
    pub fn add(&mut self, interest: Interest, callback: Callback) -> ListenerId {
        self.next += 1;
        let id = ListenerId(self.next);
        self.registered.push((id, interest, callback));
        id
    }
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.registered.len();
        self.registered.retain(|(registered, _, _)| *registered != id);
        self.registered.len() != before
    }
    pub fn dispatch(&mut self, event: &Event) {
        trace!(path = event.path(), property = event.property().name(), "deliver");
        for (_, interest, callback) in self.registered.iter_mut() {
            if interest.matches(event) {
                callback(event);
            }
        }
    }
}
