//! Command line and configuration file handling.

pub mod cli_args;
pub mod runner_config;

pub use cli_args::{CliArgs, TestCommand};
pub use runner_config::{RunnerConfig, ToolPaths};
