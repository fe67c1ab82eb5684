//! Error types for the nodal network solver.
//!
//! This module provides a unified error type [`NodalError`]. Configuration
//! problems are hard failures surfaced from `initialize()`. Numerical trouble
//! during a step (failed decompositions, non-converged minor steps) is
//! absorbed into counters instead and only shows up here as
//! [`NodalError::DecompositionFailed`] inside the decomposition engine.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all solver operations.
#[derive(Error, Debug)]
pub enum NodalError {
    // ============ Configuration Errors ============
    /// The link vector handed to `initialize()` was empty
    #[error("Network '{network}' has no links")]
    EmptyLinks { network: String },

    /// `initialize()` was called before any nodes were bound
    #[error("Network '{network}' has no nodes bound (call initialize_nodes first)")]
    NodesNotBound { network: String },

    /// A link failed its own initialization check
    #[error("Link '{link}' is not initialized")]
    LinkNotInitialized { link: String },

    /// A link's node map points outside the network
    #[error("Link '{link}' port {port} maps to node {node}, network size is {size}")]
    NodeMapOutOfRange {
        link: String,
        port: usize,
        node: usize,
        size: usize,
    },

    /// A link's contribution slices disagree with its port count
    #[error("Link '{link}' has {ports} ports but its {what} has length {len}")]
    PortSizeMismatch {
        link: String,
        ports: usize,
        what: &'static str,
        len: usize,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for network '{network}': {message}")]
    InvalidConfig { network: String, message: String },

    // ============ Runtime Errors ============
    /// `step()` or a runtime setter was used before a successful `initialize()`
    #[error("Network '{network}' is not initialized")]
    NotInitialized { network: String },

    /// Slave potential vector has the wrong length
    #[error("Slave potential vector has length {actual}, network size is {expected}")]
    InvalidSlaveVector { expected: usize, actual: usize },

    /// Matrix is not positive definite, even after conditioning
    #[error("Decomposition of {size}x{size} matrix failed: {message}")]
    DecompositionFailed { size: usize, message: String },

    /// A thread panicked while holding the shared solver lock
    #[error("Shared solver lock poisoned")]
    LockPoisoned,
}

impl NodalError {
    /// Create an invalid configuration error
    pub fn invalid_config(network: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            network: network.into(),
            message: message.into(),
        }
    }

    /// Create a decomposition failure error
    pub fn decomposition_failed(size: usize, message: impl Into<String>) -> Self {
        Self::DecompositionFailed {
            size,
            message: message.into(),
        }
    }

    /// Whether this error is a configuration error detected at initialization.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyLinks { .. }
                | Self::NodesNotBound { .. }
                | Self::LinkNotInitialized { .. }
                | Self::NodeMapOutOfRange { .. }
                | Self::PortSizeMismatch { .. }
                | Self::InvalidConfig { .. }
        )
    }
}
