//! Link validation.

use crate::error::{NodalError, Result};
use crate::link::Link;

/// Validate one link against a network of `size` nodes.
///
/// Checks:
/// - The link passes its own initialization check
/// - Admittance, source, node map and overrides agree with the port count
/// - Every non-ground port maps inside the network
pub fn validate_link(link: &dyn Link, size: usize) -> Result<()> {
    if !link.is_initialized() {
        return Err(NodalError::LinkNotInitialized {
            link: link.name().to_string(),
        });
    }

    validate_port_sizes(link)?;
    validate_node_map(link, size)
}

/// Check that admittance, source, node map and overrides agree with the
/// port count.
pub fn validate_port_sizes(link: &dyn Link) -> Result<()> {
    let ports = link.num_ports();
    let mismatch = |what: &'static str, len: usize| NodalError::PortSizeMismatch {
        link: link.name().to_string(),
        ports,
        what,
        len,
    };

    if link.node_map().len() != ports {
        return Err(mismatch("node map", link.node_map().len()));
    }
    if link.admittance().len() != ports * ports {
        return Err(mismatch("admittance matrix", link.admittance().len()));
    }
    if link.source().len() != ports {
        return Err(mismatch("source vector", link.source().len()));
    }
    let overrides = link.overrides().len();
    if overrides != 0 && overrides != ports {
        return Err(mismatch("override vector", overrides));
    }

    Ok(())
}

/// Check that every non-ground port of `link` maps inside the network.
pub fn validate_node_map(link: &dyn Link, size: usize) -> Result<()> {
    for (port, node) in link.node_map().iter().enumerate() {
        if let Some(index) = node.index() {
            if index >= size {
                return Err(NodalError::NodeMapOutOfRange {
                    link: link.name().to_string(),
                    port,
                    node: index,
                    size,
                });
            }
        }
    }
    Ok(())
}
