//! Dependency tracking for recalculated and copied properties.
//!
//! Every derived `(node, property)` remembers the exact set of
//! `(node, property)` pairs it was last derived from. The reverse index lets a
//! mutation find what to rederive without scanning the arena. Edges are
//! replaced on every derivation, so when a reference is repointed the old
//! target stops being observed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::event::Source;
use crate::graph::Graph;
use crate::node::{Computed, NodeHasher, NodeId};
use crate::property::Property;
use crate::value::{Value, ValueType};

pub(crate) type Key = (NodeId, &'static str);

// ------------- Lookups -------------
/// One-to-many index. Values are ordered so that rederivation runs in a
/// stable order from one run to the next.
#[derive(Debug)]
pub struct Lookup<K, V> {
    index: HashMap<K, BTreeSet<V>, NodeHasher>,
}
impl<K: Eq + Hash, V: Ord + Clone> Lookup<K, V> {
    pub fn new() -> Self {
        Self {
            index: HashMap::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        self.index.entry(key).or_default().insert(value);
    }
    pub fn remove(&mut self, key: &K, value: &V) {
        if let Some(set) = self.index.get_mut(key) {
            set.remove(value);
            if set.is_empty() {
                self.index.remove(key);
            }
        }
    }
    pub fn lookup(&self, key: &K) -> Option<&BTreeSet<V>> {
        self.index.get(key)
    }
    pub fn take(&mut self, key: &K) -> BTreeSet<V> {
        self.index.remove(key).unwrap_or_default()
    }
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.index.retain(|key, set| {
            set.retain(|value| keep(key, value));
            !set.is_empty()
        });
    }
}
impl<K: Eq + Hash, V: Ord + Clone> Default for Lookup<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tracker {
    // derived -> what it was derived from
    sources: Lookup<Key, Key>,
    // source -> derived properties reading it
    dependents: Lookup<Key, Key>,
}

impl Tracker {
    pub fn sources(&self, derived: &Key) -> Option<&BTreeSet<Key>> {
        self.sources.lookup(derived)
    }
    pub fn dependents(&self, source: &Key) -> Vec<Key> {
        self.dependents
            .lookup(source)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
    /// Installs a new edge set for `derived` and hands back the previous one.
    pub fn replace(&mut self, derived: Key, sources: BTreeSet<Key>) -> BTreeSet<Key> {
        let old = self.sources.take(&derived);
        for source in &old {
            self.dependents.remove(source, &derived);
        }
        for source in &sources {
            self.sources.insert(derived, *source);
            self.dependents.insert(*source, derived);
        }
        old
    }
    pub fn forget(&mut self, node: NodeId) {
        self.sources.retain(|derived, source| derived.0 != node && source.0 != node);
        self.dependents.retain(|source, derived| derived.0 != node && source.0 != node);
    }
}

// ------------- Derivation -------------
/// Read-only view handed to a recompute function.
pub struct Derivation<'g> {
    pub(crate) graph: &'g Graph,
    pub(crate) node: NodeId,
    pub(crate) property: &'static Property,
    pub(crate) trigger: Option<Key>,
}

impl<'g> Derivation<'g> {
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }
    pub fn node(&self) -> NodeId {
        self.node
    }
    pub fn get(&self, property: &Property) -> Value {
        self.graph.get(self.node, property)
    }
    /// The value of `property` on whatever `reference` currently points at.
    pub fn via(&self, reference: &Property, property: &Property) -> Option<Value> {
        self.graph
            .get(self.node, reference)
            .as_entity()
            .filter(|target| self.graph.contains(*target))
            .map(|target| self.graph.get(target, property))
    }
    /// The value being replaced.
    pub fn current(&self) -> Value {
        self.graph.get(self.node, self.property)
    }
    /// The (node, property name) whose change caused this recomputation, if any.
    pub fn trigger(&self) -> Option<(NodeId, &'static str)> {
        self.trigger
    }
}

// ------------- Graph operations -------------
impl Graph {
    /// Declares `property` as recalculated by `recompute` and derives it once.
    pub fn declare_computed(
        &mut self,
        node: NodeId,
        property: &'static Property,
        recompute: impl Fn(&Derivation<'_>) -> Value + Send + Sync + 'static,
    ) -> Result<()> {
        self.atomically(|g| {
            let n = g.require_mut(node)?;
            let property = n.permanent(property)?;
            n.computed.insert(
                property.name(),
                Computed {
                    property,
                    recompute: Arc::new(recompute),
                    direct: Vec::new(),
                    indirect: Vec::new(),
                },
            );
            debug!(kind = n.kind, property = property.name(), "declared recalculated property");
            g.rederive((node, property.name()), None).map(|_| ()).inspect_err(|_| {
                if let Some(n) = g.nodes.get_mut(&node) {
                    n.computed.remove(property.name());
                }
            })
        })
    }

    pub fn add_direct_source(&mut self, node: NodeId, computed: &'static Property, source: &'static Property) -> Result<()> {
        self.atomically(|g| {
            let n = g.require(node)?;
            let source = n.property(source.name()).ok_or_else(|| GraphError::UndeclaredProperty {
                kind: n.kind.to_string(),
                property: source.name().to_string(),
            })?;
            if g.reaches(node, source.name(), computed.name()) {
                return Err(GraphError::DependencyCycle {
                    property: computed.name().to_string(),
                });
            }
            g.computed_mut(node, computed)?.direct.push(source);
            g.rederive((node, computed.name()), None).map(|_| ()).inspect_err(|_| {
                if let Ok(computed) = g.computed_mut(node, computed) {
                    computed.direct.pop();
                }
            })
        })
    }

    pub fn add_indirect_source(
        &mut self,
        node: NodeId,
        computed: &'static Property,
        reference: &'static Property,
        target: &'static Property,
    ) -> Result<()> {
        self.atomically(|g| {
            let reference = g.require(node)?.permanent(reference)?;
            if !matches!(reference.value_type(), Some(ValueType::Entity | ValueType::Any)) {
                return Err(GraphError::TypeMismatch {
                    property: reference.name().to_string(),
                    expected: ValueType::Entity.to_string(),
                    found: format!("{:?}", reference.value_type()),
                });
            }
            g.computed_mut(node, computed)?.indirect.push((reference, target));
            g.rederive((node, computed.name()), None).map(|_| ()).inspect_err(|_| {
                if let Ok(computed) = g.computed_mut(node, computed) {
                    computed.indirect.pop();
                }
            })
        })
    }

    fn computed_mut(&mut self, node: NodeId, property: &Property) -> Result<&mut Computed> {
        let n = self.require_mut(node)?;
        let kind = n.kind;
        n.computed.get_mut(property.name()).ok_or_else(|| GraphError::UndeclaredProperty {
            kind: kind.to_string(),
            property: format!("{} (recalculated)", property.name()),
        })
    }

    /// Whether `from` already depends on `to` through direct sources on the
    /// same node. Used to refuse a declaration that would close a loop.
    fn reaches(&self, node: NodeId, from: &'static str, to: &'static str) -> bool {
        let Some(n) = self.node(node) else {
            return false;
        };
        let mut pending = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(computed) = n.computed.get(current) {
                pending.extend(computed.direct.iter().map(|p| p.name()));
                pending.extend(computed.indirect.iter().map(|(reference, _)| reference.name()));
            }
        }
        false
    }

    /// Rederives everything downstream of `(node, property)`. The affected
    /// keys are gathered first and then settled in dependency order, so no
    /// recompute reads a source that is still due for rederivation. Keys
    /// already scheduled by an enclosing propagation are left to it.
    pub(crate) fn propagate(&mut self, node: NodeId, property: &'static Property) -> Result<()> {
        let source = (node, property.name());
        let (affected, deferred) = self.affected(source);
        self.dirty.extend(deferred);
        if affected.is_empty() {
            return Ok(());
        }
        self.scheduled.extend(affected.iter().copied());
        let result = self.settle(Some(source), affected.clone());
        for key in &affected {
            self.scheduled.remove(key);
            self.dirty.remove(key);
        }
        result
    }

    /// Everything downstream of `source`, plus the scheduled keys it reached
    /// that an enclosing propagation still has to rederive.
    fn affected(&self, source: Key) -> (BTreeSet<Key>, Vec<Key>) {
        let mut affected = BTreeSet::new();
        let mut deferred = Vec::new();
        let mut pending = self.tracker.dependents(&source);
        while let Some(key) = pending.pop() {
            if !self.contains(key.0) {
                continue;
            }
            if self.scheduled.contains(&key) {
                deferred.push(key);
                continue;
            }
            if affected.insert(key) {
                pending.extend(self.tracker.dependents(&key));
            }
        }
        (affected, deferred)
    }

    /// Rederives `remaining`, always picking a key none of whose sources is
    /// still waiting. With a `source`, a key is only rederived when one of its
    /// sources actually changed or a nested propagation marked it dirty. Each
    /// key runs at the propagation depth of the longest changed chain leading
    /// to it.
    pub(crate) fn settle(&mut self, source: Option<Key>, mut remaining: BTreeSet<Key>) -> Result<()> {
        let base = self.depth;
        let mut changed: BTreeMap<Key, usize> = BTreeMap::new();
        if let Some(source) = source {
            changed.insert(source, 0);
        }
        while let Some(&first) = remaining.first() {
            // on a cycle fall back to key order; the re-entrance and depth guards stop a runaway
            let next = remaining
                .iter()
                .copied()
                .find(|key| self.tracker.sources(key).is_none_or(|sources| sources.is_disjoint(&remaining)))
                .unwrap_or(first);
            remaining.remove(&next);
            self.scheduled.remove(&next);
            let triggers: Vec<(Key, usize)> = self
                .tracker
                .sources(&next)
                .into_iter()
                .flatten()
                .filter_map(|key| changed.get(key).map(|level| (*key, *level)))
                .collect();
            let dirty = self.dirty.remove(&next);
            if source.is_some() && triggers.is_empty() && !dirty {
                continue;
            }
            let level = triggers.iter().map(|(_, level)| *level).max().unwrap_or(0) + 1;
            let trigger = triggers.first().map(|(key, _)| *key);
            let outer = self.depth;
            self.depth = base + level - 1;
            let result = self.rederive(next, trigger);
            self.depth = outer;
            if result? {
                changed.insert(next, level);
            }
        }
        Ok(())
    }

    /// Recomputes one derived property and stores the result through the
    /// normal assignment path. Fails fast when the property is already being
    /// derived further up the stack.
    pub(crate) fn rederive(&mut self, derived: Key, trigger: Option<Key>) -> Result<bool> {
        if self.deriving.contains(&derived) {
            return Err(GraphError::DependencyCycle {
                property: derived.1.to_string(),
            });
        }
        self.deriving.push(derived);
        let result = self.recalculate(derived, trigger);
        self.deriving.pop();
        result
    }

    fn recalculate(&mut self, (node, name): Key, trigger: Option<Key>) -> Result<bool> {
        let n = self.require(node)?;
        let computed = n.computed.get(name).cloned();
        let copy = n.copies.get(name).cloned();
        let (property, value, sources, source) = if let Some(computed) = computed {
            let derivation = Derivation {
                graph: self,
                node,
                property: computed.property,
                trigger,
            };
            let value = (computed.recompute)(&derivation);
            (computed.property, value, self.computed_sources(node, &computed), Source::Recalculate)
        } else if let Some(copy) = copy {
            let (value, sources) = self.copied(node, &copy);
            (copy.target, value, sources, Source::Copy)
        } else {
            return Ok(false);
        };
        self.track((node, name), sources);
        self.assign(node, property, value, source)
    }

    pub(crate) fn computed_sources(&self, node: NodeId, computed: &Computed) -> BTreeSet<Key> {
        let mut sources = BTreeSet::new();
        for direct in &computed.direct {
            sources.insert((node, direct.name()));
        }
        for (reference, target) in &computed.indirect {
            sources.insert((node, reference.name()));
            if let Some(referenced) = self.get(node, reference).as_entity() {
                if self.contains(referenced) {
                    sources.insert((referenced, target.name()));
                }
            }
        }
        sources
    }
}
