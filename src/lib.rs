//! Runs a browser test suite on a ChromeOS VM or device by driving the
//! deployment tool, with retries, timeouts and a single-test result summary.

pub mod config;
pub mod environment;
pub mod error;
pub mod host_cmd;
pub mod invocation;
pub mod on_device_script;
pub mod process_tree;
pub mod reporter;
pub mod runner;
pub mod supervisor;
pub mod test_variant;
pub mod utils;
