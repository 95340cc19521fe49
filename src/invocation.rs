//! Deployment-tool invocations.
//!
//! A [`RemoteInvocation`] is assembled by value: every step takes the
//! invocation built so far and returns an extended one, so the shared base
//! flags are always in place before any variant-specific flag is appended.

use log::info;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::on_device_script::OnDeviceScript;
use crate::utils::{path_arg, relative_path};

/// Where the test runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// A VM started by the deployment tool on this host.
    Vm,
    /// A physical device reachable under `hostname`.
    Device { hostname: String },
}

impl DeviceTarget {
    pub fn is_vm(&self) -> bool {
        matches!(self, DeviceTarget::Vm)
    }

    /// Deployment-tool flags selecting this target.
    fn flags(&self) -> Vec<String> {
        match self {
            // Don't persist any filesystem changes after the VM shuts down.
            DeviceTarget::Vm => vec![
                "--start".into(),
                "--copy-on-write".into(),
                "--device".into(),
                "localhost".into(),
            ],
            DeviceTarget::Device { hostname } => vec!["--device".into(), hostname.clone()],
        }
    }
}

/// Argument vector for the deployment tool, plus the on-device script it
/// pushes and runs, if any.
#[derive(Debug)]
pub struct RemoteInvocation {
    program: PathBuf,
    args: Vec<String>,
    script: Option<OnDeviceScript>,
}

impl RemoteInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            script: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `flag` when `enabled` is set.
    #[must_use]
    pub fn flag_if(self, enabled: bool, flag: &str) -> Self {
        if enabled { self.arg(flag) } else { self }
    }

    #[must_use]
    fn with_script(mut self, script: OnDeviceScript) -> Self {
        self.script = Some(script);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args_slice(&self) -> &[String] {
        &self.args
    }

    pub fn script(&self) -> Option<&OnDeviceScript> {
        self.script.as_ref()
    }

    /// Releases the on-device script so the caller can remove it.
    pub fn into_script(self) -> Option<OnDeviceScript> {
        self.script
    }

    /// Full argument vector, starting with the deployment tool.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(path_arg(&self.program))
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn contains(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for RemoteInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Variant-agnostic inputs for command construction. All paths are absolute.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    pub deploy_tool: PathBuf,
    pub board: String,
    pub cros_cache: PathBuf,
    pub target: DeviceTarget,
    pub src_root: PathBuf,
    pub chromite_path: PathBuf,
    pub path_to_outdir: PathBuf,
    pub logs_dir: Option<PathBuf>,
    /// Incoming `LLVM_PROFILE_FILE`, set for coverage-instrumented builds.
    pub llvm_profile_file: Option<String>,
}

impl CommandBuilder {
    /// Where the coverage profile is written on the device. Its directory is
    /// exfiltrated by the deployment tool before the target shuts down.
    pub fn device_profile_path(&self) -> Option<String> {
        let profile = self.llvm_profile_file.as_deref()?;
        let file_name = Path::new(profile).file_name()?.to_string_lossy();
        Some(format!("/tmp/profraw/{file_name}"))
    }

    pub fn coverage_enabled(&self) -> bool {
        self.llvm_profile_file.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// `--nostrip` is skipped only for coverage builds in a VM: those
    /// binaries don't fit on the VM disk unstripped.
    pub fn wants_nostrip(&self) -> bool {
        !(self.target.is_vm() && self.coverage_enabled())
    }

    /// Build output directory relative to the source root.
    pub fn outdir_from_src(&self) -> String {
        path_arg(&relative_path(&self.path_to_outdir, &self.src_root))
    }

    /// Common flags: tool, board, cache, target selection, log exfiltration.
    pub fn base_invocation(&self) -> RemoteInvocation {
        let mut invocation = RemoteInvocation::new(&self.deploy_tool)
            .args(["--board", self.board.as_str()])
            .arg("--cache-dir")
            .arg(path_arg(&self.cros_cache))
            .args(self.target.flags());

        if let Some(logs_dir) = &self.logs_dir {
            invocation = invocation
                .args(["--results-src", "/var/log/", "--results-dest-dir"])
                .arg(path_arg(logs_dir));
        }
        if self.device_profile_path().is_some() {
            invocation = invocation.args(["--results-src", "/tmp/profraw"]);
        }
        invocation
    }

    /// `--deploy --mount --build-dir <outdir>`: push the locally built browser.
    pub fn with_deploy(&self, invocation: RemoteInvocation) -> RemoteInvocation {
        invocation
            .args(["--deploy", "--mount", "--build-dir"])
            .arg(self.outdir_from_src())
    }

    /// Writes the on-device script and attaches it to the invocation. The
    /// script runs from the outdir on the device.
    pub fn with_on_device_script<S: AsRef<str>>(
        &self,
        invocation: RemoteInvocation,
        lines: &[S],
    ) -> Result<RemoteInvocation> {
        let invocation = invocation
            .args(["--remote-cmd", "--cwd"])
            .arg(self.outdir_from_src());
        let script = OnDeviceScript::write(lines, &self.path_to_outdir)?;
        Ok(invocation.with_script(script))
    }

    /// Script path as seen by the deployment tool (relative to the source root).
    pub fn script_from_src(&self, script: &OnDeviceScript) -> String {
        path_arg(&relative_path(script.path(), &self.src_root))
    }

    /// `-- ./<script>`: run the script from the outdir on the device.
    pub fn run_script(&self, invocation: RemoteInvocation) -> RemoteInvocation {
        let command = invocation.script().map(|script| {
            format!(
                "./{}",
                path_arg(&relative_path(script.path(), &self.path_to_outdir))
            )
        });
        match command {
            Some(command) => invocation.arg("--").arg(command),
            None => invocation,
        }
    }

    /// Logs the final command line.
    pub fn log_invocation(invocation: &RemoteInvocation) {
        info!("Running the following command:");
        info!("{invocation}");
    }
}
