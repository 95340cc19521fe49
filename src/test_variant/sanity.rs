//! Browser sanity test: smoke-checks a locally built browser with the
//! diagnostic baked into the device image.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RunnerError};
use crate::invocation::{CommandBuilder, RemoteInvocation};
use crate::on_device_script::BASIC_SHELL_SCRIPT;

use super::strip_gtest_args;

pub use crate::config::cli_args::SANITY_TEST_TARGET;

pub const SANITY_RETRIES: u32 = 1;

/// 10 min should be enough time for the sanity test to pass.
pub const SANITY_TIMEOUT: Duration = Duration::from_secs(600);

const SANITY_BINARY: &str = "/usr/local/autotest/bin/vm_sanity.py";

#[derive(Debug, Clone, Default)]
pub struct BrowserSanityTest {
    pub test_launcher_summary_output: Option<PathBuf>,
    pub additional_args: Vec<String>,
}

impl BrowserSanityTest {
    pub fn validate(&self) -> Result<()> {
        let remaining = strip_gtest_args(&self.additional_args, SANITY_TEST_TARGET, "the sanity test");
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(RunnerError::configuration(format!(
                "Sanity test should not have additional args: {remaining:?}"
            )))
        }
    }

    pub fn build(&self, builder: &CommandBuilder) -> Result<RemoteInvocation> {
        let invocation = builder
            .base_invocation()
            .flag_if(builder.wants_nostrip(), "--nostrip");

        let mut lines: Vec<String> = BASIC_SHELL_SCRIPT.iter().map(|s| s.to_string()).collect();
        if let Some(profile) = builder.device_profile_path() {
            lines.push(format!("echo \"LLVM_PROFILE_FILE={profile}\" >> /etc/chrome_dev.conf"));
        }
        lines.push(SANITY_BINARY.to_string());

        let invocation = builder.with_on_device_script(invocation, &lines)?;
        let script = invocation.script().map(|s| builder.script_from_src(s));
        let invocation = match script {
            Some(script) => invocation.arg("--files").arg(script),
            None => invocation,
        };
        Ok(builder.run_script(builder.with_deploy(invocation)))
    }
}
