//! Inverse references and property copies.
//!
//! An inverse binding is declared by each side for its own half: a node whose
//! `property` points at (or holds) another node keeps that node's `inverse`
//! pointing back. Propagation stops on its own because assigning an equal
//! value, or adding a member that is already present, is a no-op.
//!
//! A copy binding mirrors a property of another node, either a fixed one or
//! the one currently referenced through a property of the copying node.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use crate::event::Source;
use crate::graph::Graph;
use crate::node::{CopyBinding, CopySource, NodeId};
use crate::property::{Membership, Property};
use crate::tracker::Key;
use crate::value::Value;

impl Graph {
    /// Keeps `inverse` on whatever `property` refers to pointing back at `node`.
    /// `property` is either a permanent reference or a reference collection.
    pub fn bind_inverse(&mut self, node: NodeId, property: &'static Property, inverse: &'static Property) -> Result<()> {
        let n = self.require_mut(node)?;
        let declared = n
            .property(property.name())
            .ok_or_else(|| GraphError::UndeclaredProperty {
                kind: n.kind.to_string(),
                property: property.name().to_string(),
            })?;
        if declared.is_command() {
            return Err(GraphError::WrongKind {
                property: property.name().to_string(),
                expected: "reference",
            });
        }
        // the far side never owns what points at it
        if inverse.is_command() || inverse.membership() == Some(Membership::Owned) {
            return Err(GraphError::WrongKind {
                property: inverse.name().to_string(),
                expected: "reference",
            });
        }
        n.inverses.insert(declared.name(), inverse);
        debug!(kind = n.kind, property = property.name(), inverse = inverse.name(), "bound inverse");
        Ok(())
    }

    /// Mirrors `source` of the node resolved through `from` into `target`.
    /// Read-only copies ignore direct writes; writable ones forward them.
    pub fn bind_copy(
        &mut self,
        node: NodeId,
        target: &'static Property,
        from: CopySource,
        source: &'static Property,
        read_only: bool,
    ) -> Result<()> {
        self.atomically(|g| {
            let n = g.require(node)?;
            let target = n.permanent(target)?;
            if let CopySource::Via(reference) = from {
                n.permanent(reference)?;
            }
            let binding = CopyBinding {
                target,
                from,
                source,
                read_only,
            };
            g.require_mut(node)?.copies.insert(target.name(), binding);
            g.rederive((node, target.name()), None).map(|_| ()).inspect_err(|_| {
                if let Some(n) = g.nodes.get_mut(&node) {
                    n.copies.remove(target.name());
                }
            })
        })
    }

    pub(crate) fn resolve(&self, node: NodeId, from: CopySource) -> Option<NodeId> {
        let resolved = match from {
            CopySource::Node(fixed) => fixed,
            CopySource::Via(reference) => self.get(node, reference).as_entity()?,
        };
        self.contains(resolved).then_some(resolved)
    }

    /// Current mirrored value plus the pairs it was read from.
    pub(crate) fn copied(&self, node: NodeId, copy: &CopyBinding) -> (Value, BTreeSet<Key>) {
        let mut sources = BTreeSet::new();
        if let CopySource::Via(reference) = copy.from {
            sources.insert((node, reference.name()));
        }
        match self.resolve(node, copy.from) {
            Some(resolved) => {
                sources.insert((resolved, copy.source.name()));
                (self.get(resolved, copy.source), sources)
            }
            None => (copy.target.default_value(), sources),
        }
    }

    /// A direct write to a copy target.
    pub(crate) fn forward(&mut self, node: NodeId, copy: &CopyBinding, value: Value, source: Source) -> Result<bool> {
        if copy.read_only {
            warn!(property = copy.target.name(), "ignoring write to read-only copy");
            return Ok(false);
        }
        match self.resolve(node, copy.from) {
            Some(resolved) => self.assign(resolved, copy.source, value, source),
            None => {
                debug!(property = copy.target.name(), "copy source unresolved, write dropped");
                Ok(false)
            }
        }
    }

    /// `node.property` moved from `last` to `value`; fix up the other ends.
    pub(crate) fn retarget(&mut self, node: NodeId, inverse: &'static Property, last: &Value, value: &Value) -> Result<()> {
        if let Some(old) = last.as_entity() {
            self.retract(old, inverse, node)?;
        }
        if let Some(new) = value.as_entity() {
            self.extend(new, inverse, node)?;
        }
        Ok(())
    }

    /// Drops `node` from `other.inverse`, if it is there.
    pub(crate) fn retract(&mut self, other: NodeId, inverse: &'static Property, node: NodeId) -> Result<()> {
        let Some(o) = self.node(other) else {
            return Ok(());
        };
        if inverse.is_add_remove() {
            if o.members(inverse).contains(&node) {
                self.detach(other, inverse, node, Source::Inverse)?;
            }
        } else if o.value(inverse).as_entity() == Some(node) {
            self.assign(other, inverse, Value::Null, Source::Inverse)?;
        }
        Ok(())
    }

    /// Makes `other.inverse` refer to `node`.
    pub(crate) fn extend(&mut self, other: NodeId, inverse: &'static Property, node: NodeId) -> Result<()> {
        let o = self.require(other)?;
        if inverse.is_add_remove() {
            if !o.members(inverse).contains(&node) {
                self.attach(other, inverse, node, Source::Inverse)?;
            }
        } else {
            self.assign(other, inverse, Value::Entity(node), Source::Inverse)?;
        }
        Ok(())
    }
}
