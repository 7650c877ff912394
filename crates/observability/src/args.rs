//! Logging CLI arguments.

use clap::Args;
use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[command(next_help_heading = "Logging")]
#[serde(default)]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    #[serde(skip)] // CLI-only
    pub verbosity: u8,

    /// Log filter directive (e.g., "relayprobe_verifier=debug,libp2p=info").
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub json: bool,
}

impl LogArgs {
    /// Command line flags reproducing these settings, for child processes.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.quiet {
            args.push("--quiet".to_string());
        }
        if self.verbosity > 0 {
            args.push(format!("-{}", "v".repeat(self.verbosity.into())));
        }
        if let Some(filter) = &self.filter {
            args.push("--log.filter".to_string());
            args.push(filter.clone());
        }
        if self.json {
            args.push("--log.json".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn test_cli_args_roundtrip() {
        let log = LogArgs {
            quiet: false,
            verbosity: 2,
            filter: Some("libp2p=warn".to_string()),
            json: true,
        };
        let mut argv = vec!["relayprobe".to_string()];
        argv.extend(log.to_cli_args());
        assert_eq!(Cli::parse_from(argv).log, log);
    }

    #[test]
    fn test_verbosity_not_in_config() {
        let json = serde_json::to_value(LogArgs {
            verbosity: 3,
            ..Default::default()
        })
        .unwrap();
        assert!(json.get("verbosity").is_none());
    }
}
