//! Read-side helpers for presentation layers: dotted node paths and JSON
//! snapshots of a subtree.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::graph::Graph;
use crate::node::NodeId;
use crate::value::Value;

impl Graph {
    /// `ScoreBoard.Media.Format(images).Type(fullscreen).File(a.png)`
    pub fn path(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = node;
        while let Some(n) = self.node(current) {
            match n.parent() {
                Some(parent) => {
                    if n.id().is_empty() {
                        segments.push(parent.property.name().to_string());
                    } else {
                        segments.push(format!("{}({})", parent.property.name(), n.id()));
                    }
                    current = parent.node;
                }
                None => {
                    segments.push(n.to_string());
                    break;
                }
            }
        }
        segments.reverse();
        segments.join(".")
    }

    /// Every permanent property in the subtree below `root`, keyed by
    /// `path.Property`. Entity values render as the path of the node they
    /// point at.
    pub fn snapshot(&self, root: NodeId) -> BTreeMap<String, JsonValue> {
        let mut snapshot = BTreeMap::new();
        for node in self.subtree(root) {
            let Some(n) = self.node(node) else {
                continue;
            };
            let path = self.path(node);
            for property in n.properties().iter().filter(|p| p.is_permanent()) {
                let value = match n.value(property) {
                    Value::Null => JsonValue::Null,
                    Value::Bool(b) => JsonValue::from(b),
                    Value::Int(i) => JsonValue::from(i),
                    Value::Text(s) => JsonValue::from(s),
                    Value::Entity(target) => JsonValue::from(self.path(target)),
                };
                snapshot.insert(format!("{}.{}", path, property.name()), value);
            }
        }
        snapshot
    }
}
