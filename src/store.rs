//! The shared handle to a graph.
//!
//! One coarse lock guards the whole graph. Everything a caller does while
//! holding it, including listener callbacks, observes a consistent state.

use std::sync::{Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::NodeId;

pub struct Store {
    graph: Mutex<Graph>,
}

impl Store {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Mutex::new(graph),
        }
    }
    pub fn with_config(config: &EngineConfig) -> Self {
        Self::new(Graph::with_config(config))
    }
    pub fn lock(&self) -> Result<MutexGuard<'_, Graph>> {
        self.graph.lock().map_err(|e| GraphError::Lock(e.to_string()))
    }
    /// Runs `f` inside one batch: listeners see its events only once it
    /// returns, collapsed. The batch is closed even when `f` fails.
    pub fn batch<T>(&self, f: impl FnOnce(&mut Graph) -> Result<T>) -> Result<T> {
        let mut graph = self.lock()?;
        graph.begin_batch();
        let result = f(&mut graph);
        graph.end_batch();
        result
    }
    pub fn read<T>(&self, f: impl FnOnce(&Graph) -> T) -> Result<T> {
        let graph = self.lock()?;
        Ok(f(&graph))
    }
    pub fn clone_subtree(&self, root: NodeId) -> Result<(Store, NodeId)> {
        let (graph, root) = self.lock()?.clone_subtree(root)?;
        Ok((Store::new(graph), root))
    }
}
