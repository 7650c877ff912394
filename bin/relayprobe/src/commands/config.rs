//! `relayprobe config`

use eyre::Result;

use crate::cli::NodeArgs;

pub(crate) fn run(args: &NodeArgs) -> Result<()> {
    let config = super::node_config(args);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
