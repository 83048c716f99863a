//! Error types for the flattening core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeltError {
    /// The schema cannot describe the value or type it was asked about.
    #[error("unsupported type `{type_name}`: {reason}")]
    UnsupportedType { type_name: String, reason: String },

    #[error("schema cycle detected: {}", path.join(" -> "))]
    SchemaCycle { path: Vec<String> },

    #[error("missing root data at `{root_node}`: {reason}")]
    MissingRootData { root_node: String, reason: String },

    #[error("parent of table `{table}` has no identity")]
    MissingParentIdentity { table: String },

    #[error("endpoint `{name}` not found, only found definitions for {known:?}")]
    UnknownEndpoint { name: String, known: Vec<String> },

    #[error("type `{0}` is not in the catalog")]
    UnknownType(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("page source failed: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MeltError {
    pub(crate) fn unsupported(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        MeltError::UnsupportedType {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_root(root_node: impl Into<String>, reason: impl Into<String>) -> Self {
        MeltError::MissingRootData {
            root_node: root_node.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must abort the whole run.
    ///
    /// Missing root data and page source failures only concern one endpoint;
    /// the orchestrator may skip it and continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MeltError::MissingRootData { .. } | MeltError::Source(_)
        )
    }
}

pub type Result<T, E = MeltError> = std::result::Result<T, E>;
