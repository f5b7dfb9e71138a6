//! Engine configuration, layered from built-in defaults, an optional file and
//! `SCOREBOARD__*` environment variables, later layers winning. The double
//! underscore separates the prefix as well as nested keys, so the depth limit
//! is `SCOREBOARD__MAX_PROPAGATION_DEPTH`.

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How deep a chain of derived updates may nest before it is treated as a cycle.
    pub max_propagation_depth: usize,
    pub media_root: PathBuf,
    pub watch_interval_ms: u64,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_propagation_depth: crate::graph::DEFAULT_MAX_PROPAGATION_DEPTH,
            media_root: PathBuf::from("html"),
            watch_interval_ms: 1000,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("max_propagation_depth", defaults.max_propagation_depth as i64)?
            .set_default("media_root", defaults.media_root.to_string_lossy().to_string())?
            .set_default("watch_interval_ms", defaults.watch_interval_ms as i64)?
            .set_default("log_filter", defaults.log_filter)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("SCOREBOARD").separator("__").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Installs the global `fmt` subscriber. `RUST_LOG`-style directives in
/// `filter` apply; a second call is a no-op.
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}
