use std::fmt;

use relayprobe_node_config::{
    NodeConfig, NodeConfigBuilder, NodeFamily, NodeIndex, NodeKind, NodePorts,
};

/// One node the fleet should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeSpec {
    pub index: NodeIndex,
    pub kind: NodeKind,
    pub family: NodeFamily,
}

impl NodeSpec {
    pub const fn new(index: NodeIndex, kind: NodeKind, family: NodeFamily) -> Self {
        Self {
            index,
            kind,
            family,
        }
    }

    /// A hop-enabled node.
    pub const fn relay(index: u16, family: NodeFamily) -> Self {
        Self::new(NodeIndex::new(index), NodeKind::Relay, family)
    }

    /// A regular participant.
    pub const fn leaf(index: u16, family: NodeFamily) -> Self {
        Self::new(NodeIndex::new(index), NodeKind::Leaf, family)
    }

    /// Ports the node will bind.
    pub fn ports(&self) -> NodePorts {
        self.config().ports()
    }

    /// Generated configuration for the node.
    pub fn config(&self) -> NodeConfig {
        NodeConfigBuilder::new(self.index, self.family)
            .kind(self.kind)
            .build()
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} #{}", self.family, self.kind, self.index)
    }
}

/// The standard fleet: one relay and three leaves per family.
pub fn default_fleet() -> Vec<NodeSpec> {
    vec![
        NodeSpec::relay(7, NodeFamily::Embedded),
        NodeSpec::leaf(8, NodeFamily::Embedded),
        NodeSpec::leaf(12, NodeFamily::Embedded),
        NodeSpec::leaf(13, NodeFamily::Embedded),
        NodeSpec::relay(27, NodeFamily::External),
        NodeSpec::leaf(28, NodeFamily::External),
        NodeSpec::leaf(31, NodeFamily::External),
        NodeSpec::leaf(32, NodeFamily::External),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            NodeSpec::relay(7, NodeFamily::Embedded).to_string(),
            "embedded relay #007"
        );
    }

    #[test]
    fn test_default_fleet_has_no_port_conflicts() {
        let fleet = default_fleet();
        let ports: Vec<u16> = fleet
            .iter()
            .flat_map(|spec| {
                let ports = spec.ports();
                [ports.swarm, ports.websocket, ports.api, ports.gateway]
            })
            .collect();
        let unique: HashSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), ports.len());

        let relays = fleet.iter().filter(|s| s.kind == NodeKind::Relay).count();
        assert_eq!(relays, 2);
    }
}
