//! Property descriptors.
//!
//! A [`Property`] is static metadata naming one slot on an entity type. The
//! same descriptor instance is shared by every node of that type (they are
//! usually declared with `lazy_static!`), so it carries no per-node state.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

use crate::value::{Value, ValueType};

/// How the members of an add/remove collection relate to their holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Children owned by the holder, keyed by their id and parented to it.
    Owned,
    /// Non-owning references to nodes living elsewhere in the graph.
    Reference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Permanent { value_type: ValueType, default: Value },
    AddRemove { membership: Membership },
    Command,
}
#[derive(Debug)]
pub struct Property {
    name: &'static str,
    kind: PropertyKind,
}

impl Property {
    pub fn permanent(name: &'static str, value_type: ValueType, default: impl Into<Value>) -> Self {
        Self {
            name,
            kind: PropertyKind::Permanent {
                value_type,
                default: default.into(),
            },
        }
    }
    pub fn children(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::AddRemove {
                membership: Membership::Owned,
            },
        }
    }
    pub fn references(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::AddRemove {
                membership: Membership::Reference,
            },
        }
    }
    pub fn command(name: &'static str) -> Self {
        Self {
            name,
            kind: PropertyKind::Command,
        }
    }
    // Descriptors are immutable after creation, so only getters are exposed.
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }
    /// Default for permanent properties, `Null` for everything else.
    pub fn default_value(&self) -> Value {
        match &self.kind {
            PropertyKind::Permanent { default, .. } => default.clone(),
            _ => Value::Null,
        }
    }
    pub fn value_type(&self) -> Option<ValueType> {
        match &self.kind {
            PropertyKind::Permanent { value_type, .. } => Some(*value_type),
            _ => None,
        }
    }
    pub fn membership(&self) -> Option<Membership> {
        match &self.kind {
            PropertyKind::AddRemove { membership } => Some(*membership),
            _ => None,
        }
    }
    pub fn is_permanent(&self) -> bool {
        matches!(self.kind, PropertyKind::Permanent { .. })
    }
    pub fn is_add_remove(&self) -> bool {
        matches!(self.kind, PropertyKind::AddRemove { .. })
    }
    pub fn is_command(&self) -> bool {
        matches!(self.kind, PropertyKind::Command)
    }
}

// names are unique within an entity type, which is the only scope descriptors
// are ever compared in
impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Property {}
impl Hash for Property {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
impl Serialize for Property {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}
