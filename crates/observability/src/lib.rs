//! Logging for relayprobe.
//!
//! Binaries call [`init_logging`] once with their parsed [`LogArgs`]; tests
//! call [`init_test_logging`], which is idempotent and captures output per test.

mod args;
mod logging;

pub use args::LogArgs;
pub use logging::{init_logging, init_test_logging};
