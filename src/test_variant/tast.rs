//! Tast tests, driven either from the host or from the device.

use log::error;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::invocation::{CommandBuilder, RemoteInvocation};
use crate::on_device_script::BASIC_SHELL_SCRIPT;
use crate::utils::{path_arg, shell_quote};

use super::strip_gtest_args;

#[derive(Debug, Clone)]
pub struct TastTest {
    pub suite_name: String,
    pub test_launcher_summary_output: Option<PathBuf>,
    /// Boolean expression selecting the tests, e.g. `("dep:chrome")`.
    pub conditional: Option<String>,
    /// Explicit test names, used when no conditional is given.
    pub tests: Vec<String>,
    /// Run the host-side tast binary instead of the device's local_test_runner.
    pub use_host_tast_bin: bool,
    pub additional_args: Vec<String>,
    pub retries: u32,
    pub timeout: Option<Duration>,
}

impl TastTest {
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            test_launcher_summary_output: None,
            conditional: None,
            tests: Vec::new(),
            use_host_tast_bin: false,
            additional_args: Vec::new(),
            retries: 0,
            timeout: None,
        }
    }

    /// Pass-through args the Tast driver can't take. GTest-only flags are
    /// dropped with a warning; the rest are returned.
    pub fn ignored_args(&self) -> Vec<String> {
        strip_gtest_args(&self.additional_args, &self.suite_name, "tast tests")
    }

    pub fn build(&self, builder: &CommandBuilder) -> Result<RemoteInvocation> {
        let ignored = self.ignored_args();
        if !ignored.is_empty() {
            error!("Tast tests should not have additional args. These will be ignored: {ignored:?}");
        }

        let invocation = builder
            .base_invocation()
            .flag_if(builder.wants_nostrip(), "--nostrip");
        let invocation = builder.with_deploy(invocation);

        if self.use_host_tast_bin {
            Ok(self.host_driven(builder, invocation))
        } else {
            self.device_driven(builder, invocation)
        }
    }

    /// The device-side local_test_runner runs the tests from an on-device script.
    fn device_driven(
        &self,
        builder: &CommandBuilder,
        invocation: RemoteInvocation,
    ) -> Result<RemoteInvocation> {
        let mut lines: Vec<String> = BASIC_SHELL_SCRIPT.iter().map(|s| s.to_string()).collect();
        if let Some(profile) = builder.device_profile_path() {
            lines.push(format!("echo \"LLVM_PROFILE_FILE={profile}\" >> /etc/chrome_dev.conf"));
        }

        let mut runner = vec!["local_test_runner".to_string(), "-waituntilready".to_string()];
        if builder.target.is_vm() {
            // Skip tests that aren't compatible with VMs.
            runner.push("-extrauseflags=tast_vm".to_string());
        }
        match &self.conditional {
            Some(conditional) => runner.push(shell_quote(conditional)),
            None => runner.extend(self.tests.iter().cloned()),
        }
        lines.push(runner.join(" "));

        let invocation = builder.with_on_device_script(invocation, &lines)?;
        let script = invocation.script().map(|s| builder.script_from_src(s));
        let invocation = match script {
            Some(script) => invocation.arg("--files").arg(script),
            None => invocation,
        };
        Ok(builder.run_script(invocation))
    }

    /// The host-side tast binary connects to the device itself.
    fn host_driven(&self, builder: &CommandBuilder, invocation: RemoteInvocation) -> RemoteInvocation {
        // Outside a chroot tast can't find the testing ssh key on its own.
        let key = builder.chromite_path.join("ssh_keys").join("testing_rsa");
        let mut invocation = invocation.arg("--private-key").arg(path_arg(&key));
        if let Some(logs_dir) = &builder.logs_dir {
            invocation = invocation.arg("--results-dir").arg(path_arg(logs_dir));
        }
        // The conditional is passed unquoted: tast rejects the quotes once the
        // deployment tool hands the arg down.
        match &self.conditional {
            Some(conditional) => invocation.arg(format!("--tast={conditional}")),
            None => invocation.arg("--tast").args(self.tests.iter().cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::DeviceTarget;
    use crate::invocation::tests::{builder, src_with_outdir};
    use std::fs;
    use std::path::Path;

    #[test]
    fn test_pass_through_args_are_dropped() {
        let src = src_with_outdir();
        let b = builder(src.path(), DeviceTarget::Vm);
        let mut tast = TastTest::new("X");
        tast.tests = vec!["ui.ChromeLogin".into()];
        tast.additional_args = vec!["--gtest_filter=X".into(), "--foo".into()];
        assert_eq!(tast.ignored_args(), vec!["--foo".to_string()]);

        let inv = tast.build(&b).unwrap();
        assert!(!inv.contains("--gtest_filter=X"));
        assert!(!inv.contains("--foo"));
        let script = fs::read_to_string(inv.script().unwrap().path()).unwrap();
        assert!(!script.contains("--foo"));
        assert!(!script.contains("--gtest_filter"));
        inv.into_script().unwrap().remove().unwrap();
    }

    #[test]
    fn test_device_driven_in_vm() {
        let src = src_with_outdir();
        let b = builder(src.path(), DeviceTarget::Vm);
        let mut tast = TastTest::new("tast_suite");
        tast.conditional = Some(r#"("dep:chrome" || "dep:chrome_login")"#.into());

        let inv = tast.build(&b).unwrap();
        let script = fs::read_to_string(inv.script().unwrap().path()).unwrap();
        assert_eq!(
            script.lines().last(),
            Some(r#"local_test_runner -waituntilready -extrauseflags=tast_vm '("dep:chrome" || "dep:chrome_login")'"#)
        );
        let args = inv.args_slice().join(" ");
        assert!(args.contains("--nostrip --deploy --mount --build-dir out/Release --remote-cmd --cwd out/Release --files out/Release/device_script_"));
        inv.into_script().unwrap().remove().unwrap();
    }

    #[test]
    fn test_device_driven_on_device_with_coverage() {
        let src = src_with_outdir();
        let mut b = builder(src.path(), DeviceTarget::Device { hostname: "dut".into() });
        b.llvm_profile_file = Some("/cov/chrome.profraw".into());
        let mut tast = TastTest::new("tast_suite");
        tast.tests = vec!["ui.ChromeLogin".into(), "ui.Shelf".into()];

        let inv = tast.build(&b).unwrap();
        let script = fs::read_to_string(inv.script().unwrap().path()).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines[2],
            "echo \"LLVM_PROFILE_FILE=/tmp/profraw/chrome.profraw\" >> /etc/chrome_dev.conf"
        );
        assert_eq!(lines[3], "local_test_runner -waituntilready ui.ChromeLogin ui.Shelf");
        inv.into_script().unwrap().remove().unwrap();
    }

    #[test]
    fn test_host_driven() {
        let mut b = builder(Path::new("/src"), DeviceTarget::Device { hostname: "dut".into() });
        b.logs_dir = Some("/logs".into());
        let mut tast = TastTest::new("tast_suite");
        tast.use_host_tast_bin = true;
        tast.conditional = Some(r#"("dep:chrome")"#.into());

        let inv = tast.build(&b).unwrap();
        assert!(inv.script().is_none());
        let args = inv.args_slice().join(" ");
        assert!(args.ends_with(
            r#"--private-key /src/third_party/chromite/ssh_keys/testing_rsa --results-dir /logs --tast=("dep:chrome")"#
        ));

        tast.conditional = None;
        tast.tests = vec!["ui.ChromeLogin".into()];
        let inv = tast.build(&b).unwrap();
        assert!(inv.args_slice().join(" ").ends_with("--tast ui.ChromeLogin"));
    }
}
