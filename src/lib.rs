//! Scoreboard – a reactive entity graph for a roller derby scoreboard.
//!
//! Everything the scoreboard knows lives in one [`graph::Graph`]: an arena of
//! nodes addressed by [`node::NodeId`] handles, each carrying typed properties
//! described by shared [`property::Property`] descriptors.
//! * *Permanent* properties hold a single [`value::Value`] and fall back to a
//!   default until set.
//! * *Add/remove* properties hold ordered collections, either owned children
//!   (keyed by their string id) or references to nodes elsewhere.
//! * *Command* properties trigger a handler.
//!
//! On top of plain storage the graph keeps derived state current:
//! * recalculated properties with direct and indirect sources ([`tracker`]),
//! * inverse references and property copies ([`binder`]),
//! * atomic operations, nested batches and collapsed change notifications
//!   ([`event`]),
//! * deep copies of subtrees ([`clone`]).
//!
//! A [`store::Store`] puts the graph behind a single lock for sharing between
//! threads. [`scoreboard::ScoreBoard`] builds the board with its
//! [`settings::Settings`] and [`media::Media`] library.
//!
//! ## Quick Start
//! ```
//! use lazy_static::lazy_static;
//! use scoreboard::{graph::Graph, event::{Interest, Source}, property::Property, value::{Value, ValueType}};
//! lazy_static! {
//!     static ref NAME: Property = Property::permanent("Name", ValueType::Text, Value::Null);
//! }
//! let mut g = Graph::new();
//! let root = g.create_root("Team", &[&*NAME]);
//! g.subscribe(Interest::All, |event| println!("{}", event.path()));
//! assert!(g.set(root, &NAME, "Carolina", Source::External).unwrap());
//! assert_eq!(g.get(root, &NAME), Value::from("Carolina"));
//! ```

pub mod binder;
pub mod clone;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod media;
pub mod node;
pub mod property;
pub mod scoreboard;
pub mod settings;
pub mod store;
pub mod tracker;
pub mod value;
pub mod view;

pub use error::{GraphError, Result};
pub use event::{Event, Interest, ListenerId, Source};
pub use graph::Graph;
pub use node::{CopySource, NodeId};
pub use property::Property;
pub use store::Store;
pub use value::{Value, ValueType};
