use eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;

use crate::LogArgs;

/// Initialize logging based on command line arguments.
///
/// The filter is built with the following precedence:
/// 1. If `--quiet` is set, only errors are shown
/// 2. Otherwise, start with `RUST_LOG` if set, or a level from the verbosity flags
/// 3. Apply any custom directives from `--log.filter`
///
/// Output goes to stderr so stdout stays free for command results.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = if args.quiet {
        EnvFilter::new("error")
    } else {
        let base_level = match args.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

        if let Some(custom_filter) = &args.filter {
            for directive in custom_filter.split(',') {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(e) => eprintln!("ignoring invalid log directive {directive:?}: {e}"),
                }
            }
        }

        filter
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if args.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| eyre!("failed to install log subscriber: {e}"))?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Logging initialized");
    Ok(())
}

/// Install a test subscriber honouring `RUST_LOG` (default `info`). Safe to
/// call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
