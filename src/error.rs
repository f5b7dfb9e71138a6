use thiserror::Error;

use crate::node::NodeId;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Property {property} is not declared on {kind}")]
    UndeclaredProperty { kind: String, property: String },
    #[error("Property {property} is not a {expected} property")]
    WrongKind { property: String, expected: &'static str },
    #[error("Property {property} expects {expected}, got {found}")]
    TypeMismatch { property: String, expected: String, found: String },
    #[error("Property {property} is write protected")]
    WriteProtected { property: String },
    #[error("Duplicate id {id} in {property}")]
    DuplicateId { property: String, id: String },
    #[error("Node {0} cannot be attached here")]
    Containment(NodeId),
    #[error("Dependency cycle while deriving {property}")]
    DependencyCycle { property: String },
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// Helper conversions
impl From<::config::ConfigError> for GraphError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
