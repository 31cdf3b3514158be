use std::fmt;

use thiserror::Error;

/// Canonical result for core and the crates layered on it.
pub type Result<T> = std::result::Result<T, Error>;

/// Which registry a missing name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Table,
    View,
    Gnode,
    Context,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Table => "table",
            ResourceKind::View => "view",
            ResourceKind::Gnode => "gnode",
            ResourceKind::Context => "context",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Bad view configuration: arity mismatch, unknown operator or column.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ResourceKind, name: String },

    /// The engine refused to build a table or context.
    #[error("Engine construction failed: {0}")]
    Construction(String),

    #[error("Buffer decode error: {0}")]
    Decode(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    pub fn not_found(kind: ResourceKind, name: impl fmt::Display) -> Self {
        Error::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
