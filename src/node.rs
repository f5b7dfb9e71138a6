// node maps and sets are keyed with seahash
use core::hash::BuildHasherDefault;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use seahash::SeaHasher;

// paths and debug output
use std::fmt;

use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::event::Source;
use crate::graph::Graph;
use crate::property::Property;
use crate::tracker::Derivation;
use crate::value::Value;

// ------------- NodeId -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}
impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type NodeHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: u64 = 0;

/// Hands out arena handles. Handles are never recycled, so a stale handle held
/// by a listener can at worst miss, never alias a newer node.
#[derive(Debug)]
pub struct NodeIdGenerator {
    lower_bound: u64,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
        }
    }
    pub fn generate(&mut self) -> NodeId {
        self.lower_bound += 1;
        NodeId(self.lower_bound)
    }
}
impl Default for NodeIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Binding records -------------
pub type Recompute = Arc<dyn Fn(&Derivation<'_>) -> Value + Send + Sync>;
pub type CommandHandler = Arc<dyn Fn(&mut Graph, NodeId, Source) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopySource {
    /// A fixed node, possibly the copying node itself.
    Node(NodeId),
    /// Whatever node the given reference property currently points at.
    Via(&'static Property),
}

#[derive(Debug, Clone)]
pub struct CopyBinding {
    pub(crate) target: &'static Property,
    pub(crate) from: CopySource,
    pub(crate) source: &'static Property,
    pub(crate) read_only: bool,
}

#[derive(Clone)]
pub struct Computed {
    pub(crate) property: &'static Property,
    pub(crate) recompute: Recompute,
    pub(crate) direct: Vec<&'static Property>,
    pub(crate) indirect: Vec<(&'static Property, &'static Property)>,
}
impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Computed")
            .field("property", &self.property.name())
            .field("direct", &self.direct)
            .field("indirect", &self.indirect)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Parent {
    pub node: NodeId,
    pub property: &'static Property,
}

// ------------- Node -------------
pub struct Node {
    pub(crate) id: String,
    pub(crate) kind: &'static str,
    pub(crate) root: bool,
    pub(crate) parent: Option<Parent>,
    pub(crate) properties: Vec<&'static Property>,
    pub(crate) values: HashMap<&'static str, Value, NodeHasher>,
    pub(crate) collections: HashMap<&'static str, Vec<NodeId>, NodeHasher>,
    pub(crate) protected: HashSet<&'static str, NodeHasher>,
    pub(crate) inverses: HashMap<&'static str, &'static Property, NodeHasher>,
    pub(crate) copies: HashMap<&'static str, CopyBinding, NodeHasher>,
    pub(crate) computed: HashMap<&'static str, Computed, NodeHasher>,
    pub(crate) commands: HashMap<&'static str, CommandHandler, NodeHasher>,
}

impl Node {
    pub(crate) fn new(kind: &'static str, id: String, root: bool) -> Self {
        Self {
            id,
            kind,
            root,
            parent: None,
            properties: Vec::new(),
            values: HashMap::default(),
            collections: HashMap::default(),
            protected: HashSet::default(),
            inverses: HashMap::default(),
            copies: HashMap::default(),
            computed: HashMap::default(),
            commands: HashMap::default(),
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn kind(&self) -> &'static str {
        self.kind
    }
    pub fn is_root(&self) -> bool {
        self.root
    }
    pub fn parent(&self) -> Option<Parent> {
        self.parent
    }
    pub fn properties(&self) -> &[&'static Property] {
        &self.properties
    }
    pub(crate) fn declare(&mut self, properties: &[&'static Property]) {
        for property in properties {
            if self.property(property.name()).is_none() {
                self.properties.push(*property);
            }
        }
    }
    pub fn property(&self, name: &str) -> Option<&'static Property> {
        self.properties.iter().find(|p| p.name() == name).copied()
    }
    /// Looks the descriptor up among the declared ones and checks its kind.
    fn expect(&self, property: &Property, check: fn(&Property) -> bool, expected: &'static str) -> Result<&'static Property> {
        let declared = self
            .property(property.name())
            .ok_or_else(|| GraphError::UndeclaredProperty {
                kind: self.kind.to_string(),
                property: property.name().to_string(),
            })?;
        if !check(declared) {
            return Err(GraphError::WrongKind {
                property: property.name().to_string(),
                expected,
            });
        }
        Ok(declared)
    }
    pub(crate) fn permanent(&self, property: &Property) -> Result<&'static Property> {
        self.expect(property, Property::is_permanent, "permanent")
    }
    pub(crate) fn add_remove(&self, property: &Property) -> Result<&'static Property> {
        self.expect(property, Property::is_add_remove, "add/remove")
    }
    pub(crate) fn command(&self, property: &Property) -> Result<&'static Property> {
        self.expect(property, Property::is_command, "command")
    }
    pub fn value(&self, property: &Property) -> Value {
        match self.values.get(property.name()) {
            Some(value) => value.clone(),
            None => property.default_value(),
        }
    }
    pub fn members(&self, property: &Property) -> &[NodeId] {
        self.collections
            .get(property.name())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
    pub fn is_protected(&self, property: &Property) -> bool {
        self.protected.contains(property.name())
    }
    /// Set at least once, explicitly or by propagation.
    pub fn is_initialized(&self, property: &Property) -> bool {
        self.values.contains_key(property.name())
    }
    pub fn is_derived(&self, property: &Property) -> bool {
        self.computed.contains_key(property.name()) || self.copies.contains_key(property.name())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent", &self.parent.map(|p| p.node))
            .field("values", &self.values)
            .field("collections", &self.collections)
            .finish()
    }
}
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}({})", self.kind, self.id)
        }
    }
}
