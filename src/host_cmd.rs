//! Host-side commands run against a provisioned target.

use std::path::PathBuf;

use crate::error::{Result, RunnerError};
use crate::invocation::{CommandBuilder, RemoteInvocation};
use crate::utils::path_arg;

#[derive(Debug, Clone, Default)]
pub struct HostCommand {
    pub cmd: Vec<String>,
    pub deploy_chrome: bool,
    /// Absolute build output directory, required with `deploy_chrome`.
    pub path_to_outdir: Option<PathBuf>,
    /// Forward `--debug` to the deployment tool.
    pub debug: bool,
}

impl HostCommand {
    pub fn validate(&self) -> Result<()> {
        if self.cmd.is_empty() {
            return Err(RunnerError::configuration("Must specify command to run on the host."));
        }
        if self.deploy_chrome && self.path_to_outdir.is_none() {
            return Err(RunnerError::configuration(
                "--path-to-outdir must be specified if --deploy-chrome is passed.",
            ));
        }
        Ok(())
    }

    /// Validates, then builds the invocation. Host commands never get an
    /// on-device script.
    pub fn build(&self, builder: &CommandBuilder) -> Result<RemoteInvocation> {
        self.validate()?;
        let mut invocation = builder.base_invocation().flag_if(self.debug, "--debug");
        if self.deploy_chrome {
            if let Some(outdir) = &self.path_to_outdir {
                invocation = invocation
                    .args(["--deploy", "--mount", "--build-dir"])
                    .arg(path_arg(outdir));
            }
        }
        Ok(invocation
            .args(["--host-cmd", "--"])
            .args(self.cmd.iter().cloned()))
    }
}
