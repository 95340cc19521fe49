//! GTest-style binaries run on the device through a generated script.

use log::debug;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{Result, RunnerError};
use crate::invocation::{CommandBuilder, RemoteInvocation};
use crate::on_device_script::BASIC_SHELL_SCRIPT;
use crate::utils::{absolutize, path_arg, relative_path};

/// Runtime deps under these paths are host-side tooling and never pushed.
static FILE_DENYLIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r".*build/chromeos.*", r".*build/cros_cache.*", r".*third_party/chromite.*"]
        .iter()
        .map(|p| Regex::new(p).expect("denylist pattern is valid"))
        .collect()
});

/// Needs the vivid kernel module loaded before it runs.
const CAPTURE_SUITE: &str = "capture_unittests";

/// The UI service owns the chronos session this suite tears down, so it is
/// stopped first and the test re-invoked as chronos from a root shell.
const INTERACTIVE_UI_SUITE: &str = "interactive_ui_tests";

#[derive(Debug, Clone)]
pub struct GTestTest {
    pub test_exe: String,
    /// Absolute path the test's JSON summary should end up at on the host.
    pub test_launcher_summary_output: Option<PathBuf>,
    /// Runtime dependency manifest. A relative path resolves against the outdir.
    pub runtime_deps_path: Option<PathBuf>,
    /// Directory holding a vpython binary, relative to the outdir.
    pub vpython_dir: Option<PathBuf>,
    pub shard_index: u32,
    pub total_shards: u32,
    pub additional_args: Vec<String>,
    pub retries: u32,
    pub timeout: Option<Duration>,
}

impl GTestTest {
    pub fn new(test_exe: impl Into<String>) -> Self {
        Self {
            test_exe: test_exe.into(),
            test_launcher_summary_output: None,
            runtime_deps_path: None,
            vpython_dir: None,
            shard_index: 0,
            total_shards: 1,
            additional_args: Vec::new(),
            retries: 0,
            timeout: None,
        }
    }

    /// Directory and file name of the summary output. A bare file name means
    /// the current directory.
    fn summary_location(&self) -> Option<(PathBuf, String)> {
        let output = self.test_launcher_summary_output.as_deref()?;
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file = output.file_name()?.to_string_lossy().into_owned();
        Some((dir, file))
    }

    fn runtime_deps_file(&self, builder: &CommandBuilder) -> Option<PathBuf> {
        self.runtime_deps_path
            .as_deref()
            .map(|p| absolutize(p, &builder.path_to_outdir))
    }

    pub fn validate(&self, builder: &CommandBuilder) -> Result<()> {
        // Both output locations must be the same directory.
        if let (Some((json_dir, _)), Some(logs_dir)) = (self.summary_location(), &builder.logs_dir) {
            let json_dir = absolutize(&json_dir, &builder.src_root);
            let logs_dir = absolutize(logs_dir, &builder.src_root);
            if json_dir != logs_dir {
                return Err(RunnerError::configuration(
                    "--test-launcher-summary-output and --logs-dir must point to the same directory.",
                ));
            }
        }
        if let Some(deps) = self.runtime_deps_file(builder) {
            if !deps.is_file() {
                return Err(RunnerError::configuration(format!(
                    "Runtime deps file {} does not exist.",
                    deps.display()
                )));
            }
        }
        Ok(())
    }

    /// Runtime deps listed in the manifest, relative to the source root,
    /// minus the denylisted tooling directories.
    fn read_runtime_files(&self, builder: &CommandBuilder) -> Result<Vec<String>> {
        let Some(deps) = self.runtime_deps_file(builder) else {
            return Ok(Vec::new());
        };
        let contents = fs::read_to_string(&deps).map_err(|e| {
            RunnerError::configuration(format!("Failed to read runtime deps {}: {e}", deps.display()))
        })?;

        let mut files = Vec::new();
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let file = absolutize(Path::new(line), &builder.path_to_outdir);
            let rel = path_arg(&relative_path(&file, &builder.src_root));
            if FILE_DENYLIST.iter().any(|re| re.is_match(&rel)) {
                debug!("Skipping denylisted runtime dep {rel}");
                continue;
            }
            files.push(rel);
        }
        Ok(files)
    }

    pub fn build(&self, builder: &CommandBuilder) -> Result<RemoteInvocation> {
        let mut invocation = builder
            .base_invocation()
            .flag_if(builder.wants_nostrip(), "--nostrip");

        let mut device_result_file = None;
        if let Some((dir, file)) = self.summary_location() {
            let device_file = format!("/tmp/{file}");
            invocation = invocation
                .args(["--results-src", device_file.as_str(), "--results-dest-dir"])
                .arg(path_arg(&dir));
            device_result_file = Some(device_file);
        }

        let mut lines: Vec<String> = BASIC_SHELL_SCRIPT.iter().map(|s| s.to_string()).collect();
        if let Some(profile) = builder.device_profile_path() {
            lines.push(format!("export LLVM_PROFILE_FILE={profile}"));
        }

        if let Some(vpython_dir) = &self.vpython_dir {
            let spec = relative_path(&builder.src_root.join(".vpython"), &builder.path_to_outdir);
            // Initializing the vpython cache takes 10-20s; do it before the test starts.
            lines.push(format!("export PATH=$PATH:$PWD/{}", vpython_dir.display()));
            lines.push(format!("vpython -vpython-spec {} -vpython-tool install", spec.display()));
        }

        if self.test_exe == CAPTURE_SUITE {
            lines.push("echo \"test0000\" | sudo -S modprobe vivid n_devs=1 node_types=0x1".to_string());
        }

        let mut test_invocation = format!(
            "./{} --test-launcher-shard-index={} --test-launcher-total-shards={}",
            self.test_exe, self.shard_index, self.total_shards
        );
        if let Some(device_file) = &device_result_file {
            test_invocation.push_str(&format!(" --test-launcher-summary-output={device_file}"));
        }
        if !self.additional_args.is_empty() {
            test_invocation.push(' ');
            test_invocation.push_str(&self.additional_args.join(" "));
        }

        if self.test_exe == INTERACTIVE_UI_SUITE {
            lines.push("stop ui".to_string());
            test_invocation = format!("su chronos -c -- \"{test_invocation}\"");
            // --as-chronos would normally chown the outdir for us.
            lines.push("chown -R chronos: ../..".to_string());
        } else {
            // Some tests fail as root.
            invocation = invocation.arg("--as-chronos");
        }
        lines.push(test_invocation);

        let mut invocation = builder.with_on_device_script(invocation, &lines)?;

        let mut runtime_files = Vec::new();
        if let Some(script) = invocation.script() {
            runtime_files.push(builder.script_from_src(script));
        }
        runtime_files.extend(self.read_runtime_files(builder)?);
        if let Some(vpython_dir) = &self.vpython_dir {
            let vpython = absolutize(vpython_dir, &builder.path_to_outdir);
            runtime_files.push(path_arg(&relative_path(&vpython, &builder.src_root)));
            runtime_files.push(".vpython".to_string());
        }
        for file in runtime_files {
            invocation = invocation.arg("--files").arg(file);
        }

        Ok(builder.run_script(invocation))
    }
}
