//! Network representation: nodes, identifiers and link validation.
//!
//! Nodes live in a [`NodeList`] owned by the solver; links refer to them
//! through [`NodeId`] indices only.

mod node;
mod types;
mod validate;

pub use node::{Node, NodeList};
pub use types::*;
pub use validate::{validate_link, validate_node_map, validate_port_sizes};
