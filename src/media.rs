//! Media library mirrored from `<media_root>/<format>/<type>/` directories.
//!
//! The graph holds `Media -> Format -> Type -> File`. Directory listings and
//! deletions happen outside the store lock; the graph is reconciled afterwards
//! in a single batch, so listeners see one coherent set of changes per scan.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::Source;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::property::Property;
use crate::store::Store;
use crate::value::{Value, ValueType};

pub const KIND: &str = "Media";
pub const FORMAT_KIND: &str = "MediaFormat";
pub const TYPE_KIND: &str = "MediaType";
pub const FILE_KIND: &str = "MediaFile";

lazy_static! {
    pub static ref FORMAT: Property = Property::children("Format");
    pub static ref TYPE: Property = Property::children("Type");
    pub static ref FILE: Property = Property::children("File");
    pub static ref SRC: Property = Property::permanent("Src", ValueType::Text, Value::Null);
    pub static ref NAME: Property = Property::permanent("Name", ValueType::Text, Value::Null);
    // hidden files, sqlite databases and anything that would escape the directory
    static ref INVALID_FILE_NAME: Regex = Regex::new(r"(^\.)|(\.[dD][bB]$)|\\|/").expect("valid regex");
}

/// Formats and the types below each of them.
pub const CATALOG: &[(&str, &[&str])] = &[
    ("images", &["fullscreen", "sponsor_banner", "teamlogo"]),
    ("videos", &["fullscreen"]),
    ("custom", &["nso", "settings", "view", "overlay"]),
    ("game-data", &["json", "xlsx"]),
];

pub fn valid_file_name(name: &str) -> bool {
    !name.is_empty() && !INVALID_FILE_NAME.is_match(name)
}

/// The display name of a file: everything before its last extension.
pub fn display_name(file: &str) -> &str {
    match file.rfind('.') {
        Some(position) if position > 0 => &file[..position],
        _ => file,
    }
}

/// A change reported for one format/type directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Created(String),
    Deleted(String),
    /// Events were lost; the directory has to be rescanned.
    Overflow,
}

#[derive(Clone)]
pub struct Media {
    store: Arc<Store>,
    node: NodeId,
    base: PathBuf,
}

impl Media {
    /// Creates the media node under `holder.property` with the whole [`CATALOG`].
    pub fn install(g: &mut Graph, holder: NodeId, property: &'static Property) -> Result<NodeId> {
        g.atomically(|g| {
            let media = g.create(KIND, "", &[&*FORMAT]);
            g.add(holder, property, media, Source::External)?;
            for (format, types) in CATALOG {
                let f = g.create(FORMAT_KIND, *format, &[&*TYPE]);
                g.add(media, &FORMAT, f, Source::External)?;
                for media_type in types.iter() {
                    let t = g.create(TYPE_KIND, *media_type, &[&*FILE]);
                    g.add(f, &TYPE, t, Source::External)?;
                }
            }
            Ok(media)
        })
    }
    pub fn new(store: Arc<Store>, node: NodeId, base: impl Into<PathBuf>) -> Self {
        Self {
            store,
            node,
            base: base.into(),
        }
    }
    pub fn node(&self) -> NodeId {
        self.node
    }
    pub fn base(&self) -> &Path {
        &self.base
    }
    fn directory(&self, format: &str, media_type: &str) -> PathBuf {
        self.base.join(format).join(media_type)
    }

    // ------------- lookups -------------
    pub fn locate(g: &Graph, media: NodeId, format: &str, media_type: &str) -> Option<NodeId> {
        let f = g.child(media, &FORMAT, format)?;
        g.child(f, &TYPE, media_type)
    }
    pub fn format(&self, format: &str) -> Result<Option<NodeId>> {
        self.store.read(|g| g.child(self.node, &FORMAT, format))
    }
    pub fn media_type(&self, format: &str, media_type: &str) -> Result<Option<NodeId>> {
        self.store.read(|g| Self::locate(g, self.node, format, media_type))
    }
    pub fn file(&self, format: &str, media_type: &str, file: &str) -> Result<Option<NodeId>> {
        self.store.read(|g| {
            let t = Self::locate(g, self.node, format, media_type)?;
            g.child(t, &FILE, file)
        })
    }
    /// Every (format, type) pair present in the graph.
    pub fn types(&self) -> Result<Vec<(String, String)>> {
        self.store.read(|g| {
            let mut pairs = Vec::new();
            for f in g.children(self.node, &FORMAT) {
                let format = g.id(*f).unwrap_or_default();
                for t in g.children(*f, &TYPE) {
                    pairs.push((format.to_string(), g.id(*t).unwrap_or_default().to_string()));
                }
            }
            pairs
        })
    }

    // ------------- graph updates -------------
    /// Adds a `File` for `file` unless it is invalid or already known.
    pub fn file_created(g: &mut Graph, media: NodeId, format: &str, media_type: &str, file: &str, source: Source) -> Result<bool> {
        if !valid_file_name(file) {
            debug!(file, "skipping invalid media file name");
            return Ok(false);
        }
        let Some(t) = Self::locate(g, media, format, media_type) else {
            return Ok(false);
        };
        if g.child(t, &FILE, file).is_some() {
            return Ok(false);
        }
        // URL paths always use forward slashes
        let src = format!("/{}/{}/{}", format, media_type, file);
        let name = display_name(file).to_string();
        g.atomically(|g| {
            let entry = g.create(FILE_KIND, file, &[&*SRC, &*NAME]);
            g.set(entry, &NAME, name, source)?;
            g.set(entry, &SRC, src, source)?;
            g.mark_write_protected(entry, &SRC)?;
            g.add(t, &FILE, entry, source)?;
            Ok(true)
        })
    }
    pub fn file_deleted(g: &mut Graph, media: NodeId, format: &str, media_type: &str, file: &str, source: Source) -> Result<bool> {
        match Self::locate(g, media, format, media_type) {
            Some(t) => g.remove_id(t, &FILE, file, source),
            None => Ok(false),
        }
    }

    // ------------- disk -------------
    /// Creates every catalog directory and loads what is already there.
    pub fn prepare(&self) -> Result<()> {
        for (format, media_type) in self.types()? {
            fs::create_dir_all(self.directory(&format, &media_type))?;
            self.refresh(&format, &media_type)?;
        }
        info!(base = %self.base.display(), "media library ready");
        Ok(())
    }
    pub fn refresh(&self, format: &str, media_type: &str) -> Result<()> {
        self.scan(format, media_type, Source::External)
    }
    fn scan(&self, format: &str, media_type: &str, source: Source) -> Result<()> {
        let listed = self.list(format, media_type)?;
        self.store.batch(|g| {
            let Some(t) = Self::locate(g, self.node, format, media_type) else {
                return Ok(());
            };
            let known: Vec<String> = g
                .children(t, &FILE)
                .iter()
                .filter_map(|f| g.id(*f).map(str::to_string))
                .collect();
            for file in known.iter().filter(|file| !listed.contains(*file)) {
                Self::file_deleted(g, self.node, format, media_type, file, source)?;
            }
            for file in &listed {
                Self::file_created(g, self.node, format, media_type, file, source)?;
            }
            Ok(())
        })
    }
    fn list(&self, format: &str, media_type: &str) -> Result<BTreeSet<String>> {
        let mut listed = BTreeSet::new();
        let directory = self.directory(format, media_type);
        if !directory.is_dir() {
            return Ok(listed);
        }
        for entry in fs::read_dir(directory)? {
            listed.insert(entry?.file_name().to_string_lossy().to_string());
        }
        Ok(listed)
    }

    /// Applies change notifications for one directory in a single batch. An
    /// overflow falls back to a full rescan.
    pub fn apply(&self, format: &str, media_type: &str, events: &[MediaEvent]) -> Result<()> {
        if events.contains(&MediaEvent::Overflow) {
            return self.scan(format, media_type, Source::Watcher);
        }
        self.store.batch(|g| {
            for event in events {
                match event {
                    MediaEvent::Created(file) => Self::file_created(g, self.node, format, media_type, file, Source::Watcher)?,
                    MediaEvent::Deleted(file) => Self::file_deleted(g, self.node, format, media_type, file, Source::Watcher)?,
                    MediaEvent::Overflow => false,
                };
            }
            Ok(())
        })
    }

    /// Deletes a file (or directory) from disk. The graph catches up on the
    /// next scan.
    pub fn remove_media_file(&self, format: &str, media_type: &str, file: &str) -> bool {
        if !valid_file_name(file) || !matches!(self.media_type(format, media_type), Ok(Some(_))) {
            return false;
        }
        let path = self.directory(format, media_type).join(file);
        let removed = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        match removed {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not remove media file");
                false
            }
        }
    }

    /// Polls every catalog directory every `interval` on a background thread.
    pub fn watch(&self, interval: Duration) -> Watcher {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let media = self.clone();
        let thread = thread::spawn(move || {
            while !token.is_cancelled() {
                match media.types() {
                    Ok(pairs) => {
                        for (format, media_type) in pairs {
                            if let Err(e) = media.scan(&format, &media_type, Source::Watcher) {
                                warn!(format = %format, media_type = %media_type, error = %e, "media scan failed");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "media watcher cannot read the graph"),
                }
                thread::park_timeout(interval);
            }
            debug!("media watcher stopped");
        });
        Watcher {
            cancel,
            thread: Some(thread),
        }
    }
}

/// Cancellation flag shared with the watcher thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to a running media watcher; dropping it stops the thread.
pub struct Watcher {
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}
impl Watcher {
    pub fn stop(mut self) {
        self.shutdown();
    }
    fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}
impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
