//! The top of a scoreboard graph and its always-present singletons.

use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::media::Media;
use crate::node::NodeId;
use crate::property::Property;
use crate::settings::Settings;
use crate::store::Store;

pub const KIND: &str = "ScoreBoard";

lazy_static! {
    pub static ref SETTINGS: Property = Property::children("Settings");
    pub static ref MEDIA: Property = Property::children("Media");
}

pub struct ScoreBoard {
    store: Arc<Store>,
    root: NodeId,
    settings: Settings,
    media: Media,
}

impl ScoreBoard {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let store = Arc::new(Store::with_config(config));
        let (root, settings, media) = {
            let mut g = store.lock()?;
            let root = g.create_root(KIND, &[&*SETTINGS, &*MEDIA]);
            let settings = Settings::install(&mut g, root, &SETTINGS)?;
            let media = Media::install(&mut g, root, &MEDIA)?;
            (root, settings, media)
        };
        info!(media_root = %config.media_root.display(), "scoreboard created");
        Ok(Self {
            root,
            settings: Settings::new(Arc::clone(&store), settings),
            media: Media::new(Arc::clone(&store), media, config.media_root.clone()),
            store,
        })
    }
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
    pub fn root(&self) -> NodeId {
        self.root
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn media(&self) -> &Media {
        &self.media
    }
    /// An independent copy of the whole board, e.g. for previewing edits.
    pub fn view(&self) -> Result<(Store, NodeId)> {
        self.store.clone_subtree(self.root)
    }
}
