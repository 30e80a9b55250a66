//! Error types for the tc-metrics crate.

use thiserror::Error;

/// Errors that can occur in the collector framework.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// A collector with the same ID is already registered.
    #[error("collector with ID {id} already registered")]
    DuplicateCollector {
        /// The conflicting collector ID.
        id: String,
    },

    /// A factory with the same name is already registered.
    #[error("factory with name {name} already registered")]
    DuplicateFactory {
        /// The conflicting factory name.
        name: String,
    },

    /// No factory is registered under the requested name.
    #[error("factory with name {name} not found")]
    FactoryNotFound {
        /// The requested factory name.
        name: String,
    },

    /// The factory cannot build a collector for this kind.
    #[error("unsupported kind: {kind}")]
    UnsupportedKind {
        /// The requested kind.
        kind: String,
    },

    /// A configuration value of the wrong type was handed to a collector.
    #[error("invalid config type")]
    InvalidConfigType,

    /// The traffic-control data source failed.
    #[error("tc source error: {reason}")]
    Source {
        /// What went wrong.
        reason: String,
    },
}

impl MetricsError {
    /// Builds a [`MetricsError::Source`] from anything displayable.
    pub fn source_error(reason: impl std::fmt::Display) -> Self {
        Self::Source {
            reason: reason.to_string(),
        }
    }
}

/// Result type for collector framework operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
