//! Deep copies of a subtree into a fresh, independent graph.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::Result;
use crate::graph::Graph;
use crate::node::{CopyBinding, CopySource, Node, NodeHasher, NodeId, Parent};
use crate::tracker::Key;
use crate::value::Value;

impl Graph {
    /// Copies the subtree below `root` into a new graph, returning the graph and
    /// the handle of the copied root. String ids, collection order, bindings and
    /// computed declarations carry over; references that leave the subtree
    /// become `Null`, and a copy fixed to a node outside freezes at its current
    /// value. Derived properties are rederived in the clone, sources first.
    pub fn clone_subtree(&self, root: NodeId) -> Result<(Graph, NodeId)> {
        self.require(root)?;
        let originals = self.subtree(root);
        let mut clone = Graph::with_max_depth(self.max_depth);
        let mut mapping: HashMap<NodeId, NodeId, NodeHasher> = HashMap::default();
        for original in &originals {
            mapping.insert(*original, clone.generator.generate());
        }
        let remap = |value: &Value| match value {
            Value::Entity(target) => mapping.get(target).map_or(Value::Null, |t| Value::Entity(*t)),
            other => other.clone(),
        };

        for original in &originals {
            let n = self.require(*original)?;
            let mut copy = Node::new(n.kind, n.id.clone(), *original == root);
            copy.properties = n.properties.clone();
            copy.protected = n.protected.clone();
            copy.inverses = n.inverses.clone();
            copy.computed = n.computed.clone();
            copy.commands = n.commands.clone();
            if *original != root {
                copy.parent = n.parent.and_then(|p| {
                    mapping.get(&p.node).map(|node| Parent { node: *node, property: p.property })
                });
            }
            for (name, value) in &n.values {
                copy.values.insert(*name, remap(value));
            }
            for (name, members) in &n.collections {
                // owned members are all inside the subtree, references may not be
                let kept: Vec<NodeId> = members.iter().filter_map(|m| mapping.get(m).copied()).collect();
                copy.collections.insert(*name, kept);
            }
            for (name, binding) in &n.copies {
                let from = match binding.from {
                    CopySource::Node(fixed) => match mapping.get(&fixed) {
                        Some(mapped) => CopySource::Node(*mapped),
                        None => {
                            debug!(property = *name, "copy source outside cloned subtree, value frozen");
                            continue;
                        }
                    },
                    via => via,
                };
                copy.copies.insert(
                    *name,
                    CopyBinding {
                        target: binding.target,
                        from,
                        source: binding.source,
                        read_only: binding.read_only,
                    },
                );
            }
            // edges inside the subtree carry over so the clone settles in dependency order
            for name in copy.computed.keys().chain(copy.copies.keys()) {
                let sources: BTreeSet<Key> = self
                    .tracker
                    .sources(&(*original, *name))
                    .into_iter()
                    .flatten()
                    .filter_map(|(node, property)| mapping.get(node).map(|mapped| (*mapped, *property)))
                    .collect();
                clone.tracker.replace((mapping[original], *name), sources);
            }
            clone.nodes.insert(mapping[original], copy);
        }

        let mut derived: BTreeSet<Key> = BTreeSet::new();
        for (id, node) in &clone.nodes {
            derived.extend(node.computed.keys().map(|name| (*id, *name)));
            derived.extend(node.copies.keys().map(|name| (*id, *name)));
        }
        clone.atomically(|g| g.settle(None, derived))?;
        let cloned_root = mapping[&root];
        debug!(nodes = originals.len(), "cloned subtree");
        Ok((clone, cloned_root))
    }
}
