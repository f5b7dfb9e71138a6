//! The arena holding every node, and the mutation paths through it.
//!
//! All structure is expressed as [`NodeId`] lookups: parent links, owned and
//! referenced collections, inverse and copy bindings. Each public mutation is
//! an atomic operation: it journals what it overwrites and, when any step of
//! its propagation fails, restores the journal and drops the events it queued.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::event::{Callback, Event, EventQueue, Interest, ListenerId, Listeners, Source};
use crate::node::{CommandHandler, CopyBinding, CopySource, Node, NodeHasher, NodeId, NodeIdGenerator, Parent};
use crate::property::{Membership, Property};
use crate::tracker::{Key, Tracker};
use crate::value::Value;

pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 64;

pub(crate) enum Undo {
    Value { node: NodeId, property: &'static str, old: Option<Value> },
    Attached { parent: NodeId, property: &'static Property, child: NodeId },
    Detached { parent: NodeId, property: &'static Property, child: NodeId, index: usize },
    Sources { derived: Key, old: BTreeSet<Key> },
    Created { node: NodeId },
    Severed { node: NodeId, binding: CopyBinding },
}

#[derive(Debug, Clone, Copy)]
struct Marks {
    journal: usize,
    queue: usize,
    doomed: usize,
}

pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, Node, NodeHasher>,
    pub(crate) generator: NodeIdGenerator,
    pub(crate) tracker: Tracker,
    pub(crate) max_depth: usize,
    pub(crate) deriving: Vec<Key>,
    // derived keys waiting in an enclosing propagation
    pub(crate) scheduled: BTreeSet<Key>,
    // scheduled keys whose sources changed underneath a nested propagation
    pub(crate) dirty: BTreeSet<Key>,
    queue: EventQueue,
    listeners: Listeners,
    journal: Vec<Undo>,
    // detached subtrees, deleted once the outermost operation commits
    doomed: Vec<NodeId>,
    operations: usize,
    pub(crate) depth: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_PROPAGATION_DEPTH)
    }
    pub fn with_config(config: &EngineConfig) -> Self {
        Self::with_max_depth(config.max_propagation_depth)
    }
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            nodes: HashMap::default(),
            generator: NodeIdGenerator::new(),
            tracker: Tracker::default(),
            max_depth,
            deriving: Vec::new(),
            scheduled: BTreeSet::new(),
            dirty: BTreeSet::new(),
            queue: EventQueue::default(),
            listeners: Listeners::default(),
            journal: Vec::new(),
            doomed: Vec::new(),
            operations: 0,
            depth: 0,
        }
    }

    // ------------- construction -------------
    /// A detached node; it becomes part of the live graph once added to a
    /// collection of a live node.
    pub fn create(&mut self, kind: &'static str, id: impl Into<String>, properties: &[&'static Property]) -> NodeId {
        self.insert_node(kind, id.into(), false, properties)
    }
    /// A node anchoring a live tree of its own.
    pub fn create_root(&mut self, kind: &'static str, properties: &[&'static Property]) -> NodeId {
        self.insert_node(kind, String::new(), true, properties)
    }
    fn insert_node(&mut self, kind: &'static str, id: String, root: bool, properties: &[&'static Property]) -> NodeId {
        let handle = self.generator.generate();
        let mut node = Node::new(kind, id, root);
        node.declare(properties);
        self.nodes.insert(handle, node);
        if self.operations > 0 {
            self.journal.push(Undo::Created { node: handle });
        }
        handle
    }
    /// Registers more properties on a node. Already declared ones are skipped.
    pub fn declare_properties(&mut self, node: NodeId, properties: &[&'static Property]) -> Result<()> {
        self.require_mut(node)?.declare(properties);
        Ok(())
    }

    // ------------- reading -------------
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }
    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(&node)
    }
    pub(crate) fn require(&self, node: NodeId) -> Result<&Node> {
        self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))
    }
    pub(crate) fn require_mut(&mut self, node: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(Node::id)
    }
    pub fn kind(&self, node: NodeId) -> Option<&'static str> {
        self.node(node).map(Node::kind)
    }
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent).map(|p| p.node)
    }
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self.nodes.iter().filter(|(_, n)| n.root).map(|(id, _)| *id).collect();
        roots.sort();
        roots
    }
    /// Current value, or the descriptor default when never set. Unknown nodes
    /// read as `Null`.
    pub fn get(&self, node: NodeId, property: &Property) -> Value {
        match self.node(node) {
            Some(n) => n.value(property),
            None => Value::Null,
        }
    }
    pub fn child(&self, node: NodeId, property: &Property, id: &str) -> Option<NodeId> {
        self.children(node, property)
            .iter()
            .copied()
            .find(|member| self.id(*member) == Some(id))
    }
    pub fn children(&self, node: NodeId, property: &Property) -> &[NodeId] {
        self.node(node).map(|n| n.members(property)).unwrap_or(&[])
    }
    pub fn is_write_protected(&self, node: NodeId, property: &Property) -> bool {
        self.node(node).is_some_and(|n| n.is_protected(property))
    }
    /// Every node of the subtree below (and including) `root`, parents first.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut pending = vec![root];
        while let Some(current) = pending.pop() {
            let Some(n) = self.node(current) else {
                continue;
            };
            order.push(current);
            for property in n.properties.iter().rev() {
                if property.membership() == Some(Membership::Owned) {
                    pending.extend(n.members(property).iter().rev());
                }
            }
        }
        order
    }
    /// Attached, directly or through its ancestors, to a root.
    pub fn is_live(&self, node: NodeId) -> bool {
        let mut current = self.node(node);
        while let Some(n) = current {
            if n.root {
                return true;
            }
            current = n.parent.and_then(|p| self.node(p.node));
        }
        false
    }

    // ------------- mutation -------------
    /// Stores `value`, returning whether anything changed.
    pub fn set(&mut self, node: NodeId, property: &'static Property, value: impl Into<Value>, source: Source) -> Result<bool> {
        let value = value.into();
        self.atomically(|g| g.assign(node, property, value, source))
    }

    pub fn add(&mut self, node: NodeId, property: &'static Property, child: NodeId, source: Source) -> Result<()> {
        self.atomically(|g| g.attach(node, property, child, source).map(|_| ()))
    }

    /// Removes `child`; an absent child is not an error and yields `false`.
    pub fn remove(&mut self, node: NodeId, property: &'static Property, child: NodeId, source: Source) -> Result<bool> {
        self.atomically(|g| g.detach(node, property, child, source))
    }

    pub fn remove_id(&mut self, node: NodeId, property: &'static Property, id: &str, source: Source) -> Result<bool> {
        match self.child(node, property, id) {
            Some(child) => self.remove(node, property, child, source),
            None => Ok(false),
        }
    }

    /// One-way: a protected permanent property accepts its first value only,
    /// a protected collection no further adds or removes.
    pub fn mark_write_protected(&mut self, node: NodeId, property: &'static Property) -> Result<()> {
        let n = self.require_mut(node)?;
        let declared = n.property(property.name()).ok_or_else(|| GraphError::UndeclaredProperty {
            kind: n.kind.to_string(),
            property: property.name().to_string(),
        })?;
        n.protected.insert(declared.name());
        Ok(())
    }

    pub fn declare_command(
        &mut self,
        node: NodeId,
        property: &'static Property,
        handler: impl Fn(&mut Graph, NodeId, Source) -> Result<()> + Send + Sync + 'static,
    ) -> Result<()> {
        let n = self.require_mut(node)?;
        let property = n.command(property)?;
        let handler: CommandHandler = std::sync::Arc::new(handler);
        n.commands.insert(property.name(), handler);
        Ok(())
    }

    pub fn execute(&mut self, node: NodeId, property: &'static Property, source: Source) -> Result<()> {
        self.atomically(|g| {
            let n = g.require(node)?;
            let property = n.command(property)?;
            let handler = n.commands.get(property.name()).cloned();
            if let Some(handler) = handler {
                handler(g, node, source)?;
            }
            g.enqueue(node, |kind, path| Event::Executed {
                node,
                kind,
                path,
                property,
                source,
            });
            Ok(())
        })
    }

    // ------------- batches and listeners -------------
    pub fn begin_batch(&mut self) {
        self.queue.begin();
    }
    pub fn end_batch(&mut self) {
        if self.queue.depth() == 0 {
            warn!("end_batch without matching begin_batch");
            return;
        }
        self.close();
    }
    pub fn in_batch(&self) -> bool {
        self.queue.depth() > 0
    }
    pub fn subscribe(&mut self, interest: Interest, callback: impl FnMut(&Event) + Send + 'static) -> ListenerId {
        let callback: Callback = Box::new(callback);
        self.listeners.add(interest, callback)
    }
    pub fn unsubscribe(&mut self, listener: ListenerId) -> bool {
        self.listeners.remove(listener)
    }

    fn close(&mut self) {
        if self.queue.end() {
            let events = self.queue.drain();
            if !events.is_empty() {
                debug!(count = events.len(), "delivering batch");
            }
            for event in &events {
                self.listeners.dispatch(event);
            }
        }
    }

    // ------------- atomic operations -------------
    /// Runs `op` as one all-or-nothing step inside an implicit batch.
    pub(crate) fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let marks = Marks {
            journal: self.journal.len(),
            queue: self.queue.len(),
            doomed: self.doomed.len(),
        };
        self.operations += 1;
        self.queue.begin();
        let result = op(self);
        self.operations -= 1;
        if let Err(e) = &result {
            warn!(error = %e, "operation rolled back");
            self.rollback(marks);
        }
        if self.operations == 0 {
            self.journal.clear();
            self.purge();
        }
        self.close();
        result
    }

    fn rollback(&mut self, marks: Marks) {
        while self.journal.len() > marks.journal {
            let Some(undo) = self.journal.pop() else {
                break;
            };
            match undo {
                Undo::Value { node, property, old } => {
                    if let Some(n) = self.nodes.get_mut(&node) {
                        match old {
                            Some(value) => n.values.insert(property, value),
                            None => n.values.remove(property),
                        };
                    }
                }
                Undo::Attached { parent, property, child } => {
                    if let Some(p) = self.nodes.get_mut(&parent) {
                        if let Some(members) = p.collections.get_mut(property.name()) {
                            members.retain(|member| *member != child);
                        }
                    }
                    if property.membership() == Some(Membership::Owned) {
                        if let Some(c) = self.nodes.get_mut(&child) {
                            c.parent = None;
                        }
                    }
                }
                Undo::Detached { parent, property, child, index } => {
                    if let Some(p) = self.nodes.get_mut(&parent) {
                        let members = p.collections.entry(property.name()).or_default();
                        members.insert(index.min(members.len()), child);
                    }
                    if property.membership() == Some(Membership::Owned) {
                        if let Some(c) = self.nodes.get_mut(&child) {
                            c.parent = Some(Parent { node: parent, property });
                        }
                    }
                }
                Undo::Sources { derived, old } => {
                    self.tracker.replace(derived, old);
                }
                Undo::Created { node } => {
                    self.nodes.remove(&node);
                }
                Undo::Severed { node, binding } => {
                    if let Some(n) = self.nodes.get_mut(&node) {
                        n.copies.insert(binding.target.name(), binding);
                    }
                }
            }
        }
        self.queue.truncate(marks.queue);
        self.doomed.truncate(marks.doomed);
    }

    fn purge(&mut self) {
        let doomed = std::mem::take(&mut self.doomed);
        // a subtree moved under another live parent in the same operation stays
        let dead: Vec<NodeId> = doomed.into_iter().filter(|node| !self.is_live(*node)).collect();
        for node in dead {
            self.nodes.remove(&node);
            self.tracker.forget(node);
        }
    }

    // ------------- internal mutation paths -------------
    fn nested<T>(&mut self, property: &Property, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.max_depth {
            return Err(GraphError::DependencyCycle {
                property: property.name().to_string(),
            });
        }
        self.depth += 1;
        let result = op(self);
        self.depth -= 1;
        result
    }

    fn enqueue(&mut self, node: NodeId, event: impl FnOnce(&'static str, String) -> Event) {
        if !self.is_live(node) {
            return;
        }
        let Some(kind) = self.kind(node) else {
            return;
        };
        let path = self.path(node);
        self.queue.push(event(kind, path));
    }

    pub(crate) fn track(&mut self, derived: Key, sources: BTreeSet<Key>) {
        let old = self.tracker.replace(derived, sources);
        self.journal.push(Undo::Sources { derived, old });
    }

    pub(crate) fn assign(&mut self, node: NodeId, property: &'static Property, value: Value, source: Source) -> Result<bool> {
        let n = self.require(node)?;
        let property = n.permanent(property)?;
        let name = property.name();
        if !source.is_propagated() {
            if let Some(copy) = n.copies.get(name).cloned() {
                return self.forward(node, &copy, value, source);
            }
            if n.computed.contains_key(name) {
                debug!(property = name, "ignoring write to recalculated property");
                return Ok(false);
            }
        }
        if n.is_protected(property) && n.is_initialized(property) && source != Source::Unlink {
            return Err(GraphError::WriteProtected {
                property: name.to_string(),
            });
        }
        if let Some(value_type) = property.value_type() {
            if !value_type.admits(&value) {
                return Err(GraphError::TypeMismatch {
                    property: name.to_string(),
                    expected: value_type.to_string(),
                    found: value.value_type().map(|t| t.to_string()).unwrap_or_default(),
                });
            }
        }
        if let Some(target) = value.as_entity() {
            if !self.contains(target) {
                return Err(GraphError::UnknownNode(target));
            }
        }
        let last = n.value(property);
        let initialized = n.is_initialized(property);
        if last == value && initialized {
            return Ok(false);
        }
        let inverse = n.inverses.get(name).copied();
        self.nested(property, |g| {
            let old = g.require_mut(node)?.values.insert(name, value.clone());
            g.journal.push(Undo::Value { node, property: name, old });
            if last == value {
                // first explicit write of the default: nothing to announce
                return Ok(false);
            }
            g.enqueue(node, |kind, path| Event::Changed {
                node,
                kind,
                path,
                property,
                value: value.clone(),
                last: last.clone(),
                source,
            });
            if let Some(inverse) = inverse {
                g.retarget(node, inverse, &last, &value)?;
            }
            g.propagate(node, property)?;
            Ok(true)
        })
    }

    pub(crate) fn attach(&mut self, node: NodeId, property: &'static Property, child: NodeId, source: Source) -> Result<bool> {
        let n = self.require(node)?;
        let property = n.add_remove(property)?;
        if n.is_protected(property) {
            return Err(GraphError::WriteProtected {
                property: property.name().to_string(),
            });
        }
        let c = self.require(child)?;
        let membership = property.membership().unwrap_or(Membership::Owned);
        match membership {
            Membership::Owned => {
                if c.root || c.parent.is_some() || child == node || self.is_ancestor(child, node) {
                    return Err(GraphError::Containment(child));
                }
                if n.members(property).iter().any(|m| self.id(*m) == Some(c.id())) {
                    return Err(GraphError::DuplicateId {
                        property: property.name().to_string(),
                        id: c.id().to_string(),
                    });
                }
            }
            Membership::Reference => {
                if n.members(property).contains(&child) {
                    return Err(GraphError::DuplicateId {
                        property: property.name().to_string(),
                        id: c.id().to_string(),
                    });
                }
            }
        }
        let id = c.id().to_string();
        let inverse = n.inverses.get(property.name()).copied();
        self.nested(property, |g| {
            g.require_mut(node)?
                .collections
                .entry(property.name())
                .or_default()
                .push(child);
            if membership == Membership::Owned {
                g.require_mut(child)?.parent = Some(Parent { node, property });
            }
            g.journal.push(Undo::Attached { parent: node, property, child });
            g.enqueue(node, |kind, path| Event::Added {
                node,
                kind,
                path,
                property,
                child,
                id,
                source,
            });
            if let Some(inverse) = inverse {
                g.extend(child, inverse, node)?;
            }
            g.propagate(node, property)?;
            Ok(true)
        })
    }

    pub(crate) fn detach(&mut self, node: NodeId, property: &'static Property, child: NodeId, source: Source) -> Result<bool> {
        let n = self.require(node)?;
        let property = n.add_remove(property)?;
        if n.is_protected(property) && source != Source::Unlink {
            return Err(GraphError::WriteProtected {
                property: property.name().to_string(),
            });
        }
        let Some(index) = n.members(property).iter().position(|m| *m == child) else {
            return Ok(false);
        };
        let membership = property.membership().unwrap_or(Membership::Owned);
        let id = self.id(child).unwrap_or_default().to_string();
        let inverse = n.inverses.get(property.name()).copied();
        self.nested(property, |g| {
            g.enqueue(node, |kind, path| Event::Removed {
                node,
                kind,
                path,
                property,
                child,
                id,
                source,
            });
            if let Some(members) = g.require_mut(node)?.collections.get_mut(property.name()) {
                members.remove(index);
            }
            if membership == Membership::Owned {
                if let Some(c) = g.nodes.get_mut(&child) {
                    c.parent = None;
                }
            }
            g.journal.push(Undo::Detached { parent: node, property, child, index });
            if let Some(inverse) = inverse {
                g.retract(child, inverse, node)?;
            }
            if membership == Membership::Owned {
                g.unlink(child)?;
            }
            g.propagate(node, property)?;
            Ok(true)
        })
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Severs every binding that reaches into the subtree below `root` and
    /// schedules the subtree for deletion.
    fn unlink(&mut self, root: NodeId) -> Result<()> {
        let doomed = self.subtree(root);
        let members: HashSet<NodeId> = doomed.iter().copied().collect();
        // the subtree's own halves of inverse bindings
        for &node in &doomed {
            let Some(n) = self.node(node) else {
                continue;
            };
            let bound: Vec<&'static Property> = n
                .inverses
                .keys()
                .filter_map(|name| n.property(name))
                .filter(|p| p.is_permanent() || p.membership() == Some(Membership::Reference))
                .collect();
            for property in bound {
                if property.is_permanent() {
                    self.assign(node, property, Value::Null, Source::Unlink)?;
                } else {
                    for member in self.children(node, property).to_vec() {
                        self.detach(node, property, member, Source::Unlink)?;
                    }
                }
            }
        }
        // plain references from the rest of the graph
        let mut dangling: Vec<(NodeId, &'static Property, Option<NodeId>)> = Vec::new();
        for (id, n) in &self.nodes {
            if members.contains(id) {
                continue;
            }
            for property in n.properties.iter().copied() {
                if property.is_permanent() {
                    let points_in = n.values.get(property.name()).and_then(Value::as_entity).is_some_and(|t| members.contains(&t));
                    if points_in && !n.is_derived(property) {
                        dangling.push((*id, property, None));
                    }
                } else if property.membership() == Some(Membership::Reference) {
                    for member in n.members(property) {
                        if members.contains(member) {
                            dangling.push((*id, property, Some(*member)));
                        }
                    }
                }
            }
        }
        dangling.sort_by_key(|(id, property, member)| (*id, property.name(), *member));
        for (node, property, member) in dangling {
            match member {
                None => self.assign(node, property, Value::Null, Source::Unlink)?,
                Some(member) => self.detach(node, property, member, Source::Unlink)?,
            };
        }
        // copies fixed to a node of the subtree fall back to their default
        let mut fixed: Vec<(NodeId, &'static str)> = Vec::new();
        for (id, n) in &self.nodes {
            if members.contains(id) {
                continue;
            }
            for (name, copy) in &n.copies {
                if matches!(copy.from, CopySource::Node(source) if members.contains(&source)) {
                    fixed.push((*id, *name));
                }
            }
        }
        fixed.sort();
        for (node, name) in fixed {
            self.sever(node, name)?;
        }
        self.doomed.extend(doomed);
        Ok(())
    }

    fn sever(&mut self, node: NodeId, name: &'static str) -> Result<()> {
        let Some(binding) = self.require_mut(node)?.copies.remove(name) else {
            return Ok(());
        };
        let target = binding.target;
        self.journal.push(Undo::Severed { node, binding });
        self.track((node, name), BTreeSet::new());
        debug!(property = name, "copy source removed, binding severed");
        self.assign(node, target, target.default_value(), Source::Unlink)?;
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
