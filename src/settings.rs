//! Free-form key/value settings, one `Setting` child per key.

use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::debug;

use crate::error::Result;
use crate::event::Source;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::property::Property;
use crate::store::Store;
use crate::value::{Value, ValueType};

pub const KIND: &str = "Settings";
pub const SETTING_KIND: &str = "Setting";

lazy_static! {
    pub static ref SETTING: Property = Property::children("Setting");
    pub static ref VALUE: Property = Property::permanent("Value", ValueType::Text, Value::Null);
}

/// Installed on every new board.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("Overlay.Interactive.Clock", "On"),
    ("Overlay.Interactive.Score", "On"),
    ("Overlay.Interactive.ShowJammers", "On"),
    ("Overlay.Interactive.ShowLineups", "On"),
    ("Overlay.Interactive.ShowAllNames", "Off"),
    ("ScoreBoard.Operator_Default.StartStopButtons", "false"),
    ("ScoreBoard.Operator_Default.TabBar", "true"),
    ("ScoreBoard.Operator_Default.ReplaceButton", "false"),
    ("ScoreBoard.AutoStartBuffer", "0:02"),
    ("ScoreBoard.AutoEndJam", "true"),
    ("ScoreBoard.AutoEndTTO", "false"),
    ("ScoreBoard.Intermission.PreGame", "Time To Derby"),
    ("ScoreBoard.Intermission.Intermission", "Intermission"),
    ("ScoreBoard.Intermission.Unofficial", "Unofficial Score"),
    ("ScoreBoard.Intermission.Official", "Final Score"),
    ("ScoreBoard.View_BoxStyle", "box_flat_bright"),
    ("ScoreBoard.View_CurrentView", "scoreboard"),
    ("ScoreBoard.View_HideLogos", "false"),
    ("ScoreBoard.View_Image", "/images/fullscreen/test-image.png"),
    ("ScoreBoard.View_SwapTeams", "false"),
    ("ScoreBoard.View_Video", "/videos/fullscreen/test-video.webm"),
];

#[derive(Clone)]
pub struct Settings {
    store: Arc<Store>,
    node: NodeId,
}

impl Settings {
    /// Creates the settings node under `holder.property` and fills in [`DEFAULTS`].
    pub fn install(g: &mut Graph, holder: NodeId, property: &'static Property) -> Result<NodeId> {
        g.atomically(|g| {
            let node = g.create(KIND, "", &[&*SETTING]);
            g.add(holder, property, node, Source::External)?;
            for (key, value) in DEFAULTS {
                Self::apply(g, node, key, Some(*value), Source::External)?;
            }
            debug!(count = DEFAULTS.len(), "installed default settings");
            Ok(node)
        })
    }
    pub fn new(store: Arc<Store>, node: NodeId) -> Self {
        Self { store, node }
    }
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn lookup(g: &Graph, settings: NodeId, key: &str) -> Option<String> {
        let entry = g.child(settings, &SETTING, key)?;
        g.get(entry, &VALUE).as_str().map(str::to_string)
    }

    /// `None` removes the key.
    pub fn apply(g: &mut Graph, settings: NodeId, key: &str, value: Option<&str>, source: Source) -> Result<()> {
        match (value, g.child(settings, &SETTING, key)) {
            (Some(value), Some(entry)) => {
                g.set(entry, &VALUE, value, source)?;
            }
            (Some(value), None) => {
                g.atomically(|g| {
                    let entry = g.create(SETTING_KIND, key, &[&*VALUE]);
                    g.set(entry, &VALUE, value, source)?;
                    g.add(settings, &SETTING, entry, source)
                })?;
            }
            (None, _) => {
                g.remove_id(settings, &SETTING, key, source)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.read(|g| Self::lookup(g, self.node, key))
    }
    pub fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut g = self.store.lock()?;
        Self::apply(&mut g, self.node, key, value, Source::External)
    }
    /// All keys with their values, in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        self.store.read(|g| {
            g.children(self.node, &SETTING)
                .iter()
                .filter_map(|entry| {
                    let key = g.id(*entry)?.to_string();
                    let value = g.get(*entry, &VALUE).as_str()?.to_string();
                    Some((key, value))
                })
                .collect()
        })
    }
}
