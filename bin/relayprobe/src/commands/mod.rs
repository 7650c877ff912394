pub(crate) mod config;
pub(crate) mod daemon;
pub(crate) mod run;

use relayprobe_node_config::{NodeConfig, NodeConfigBuilder, NodeIndex};

use crate::cli::NodeArgs;

fn node_config(args: &NodeArgs) -> NodeConfig {
    NodeConfigBuilder::new(NodeIndex::new(args.index), args.family)
        .kind(args.kind)
        .build()
}
