//! Network nodes.

use super::types::NodeId;

/// One conserved-quantity unknown.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// Potential from the last major step (or the externally fixed value
    /// when a link overrides this node)
    pub potential: f64,
    /// Capacitance of the node itself, for transient networks
    pub capacitance: f64,
    /// Flux to apply when computing network capacitance, 0 = no request
    pub network_capacitance_request: f64,
    /// Result of the last network capacitance computation
    pub network_capacitance: f64,
    /// Potential change of every node in response to the request flux
    pub network_capacitance_delta_potentials: Vec<f64>,
    /// Island this node belonged to on the last solve
    pub island: usize,
}

impl Node {
    /// Create a new node at the given initial potential.
    pub fn new(name: impl Into<String>, potential: f64) -> Self {
        Self {
            name: name.into(),
            potential,
            capacitance: 0.0,
            network_capacitance_request: 0.0,
            network_capacitance: 0.0,
            network_capacitance_delta_potentials: Vec::new(),
            island: 0,
        }
    }

    /// Set the node capacitance.
    pub fn with_capacitance(mut self, capacitance: f64) -> Self {
        self.capacitance = capacitance;
        self
    }
}

/// The node array of a network, plus the ground node's potential.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    nodes: Vec<Node>,
    ground_potential: f64,
}

impl NodeList {
    /// Create a node list from the given nodes, ground at 0.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            ground_potential: 0.0,
        }
    }

    /// Create `count` nodes named `N0..` at zero potential.
    pub fn with_count(count: usize) -> Self {
        Self::new((0..count).map(|i| Node::new(format!("N{i}"), 0.0)).collect())
    }

    /// Set the ground potential.
    pub fn with_ground_potential(mut self, potential: f64) -> Self {
        self.ground_potential = potential;
        self
    }

    /// Number of non-ground nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ground_potential(&self) -> f64 {
        self.ground_potential
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        id.index().and_then(|i| self.nodes.get(i))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        id.index().and_then(move |i| self.nodes.get_mut(i))
    }

    /// Potential of a node, ground included.
    pub fn potential(&self, id: NodeId) -> f64 {
        match id.index() {
            Some(i) => self.nodes.get(i).map(|n| n.potential).unwrap_or(0.0),
            None => self.ground_potential,
        }
    }

    /// Find a node by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }
}
