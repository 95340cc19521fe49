//! End-to-end tests driving the binary against a fake deployment tool.

mod cli_test;
mod run_test;

use assert_cmd::Command;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BIN: &str = env!("CARGO_PKG_NAME");

/// Logs its arguments, optionally hangs until its child is killed, then
/// exits with `$FAKE_EXIT`.
const FAKE_TOOL: &str = r#"#!/bin/sh
echo "$@" >> "$FAKE_LOG"
if [ -n "$FAKE_HANG" ]; then
  sleep 30 &
  touch "$FAKE_LOG.started"
  wait
  echo shutdown >> "$FAKE_LOG"
fi
exit ${FAKE_EXIT:-0}
"#;

/// A source checkout with an outdir, a fake deployment tool and a runner
/// config pointing at both.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new(extra_config: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("out/Release")).unwrap();

        let tool = dir.path().join("fake_run_test");
        fs::write(&tool, FAKE_TOOL).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        fs::write(
            dir.path().join("runner.toml"),
            format!(
                "src_root = \"{}\"\ndeploy_tool = \"{}\"\n{extra_config}",
                src.display(),
                tool.display()
            ),
        )
        .unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn outdir(&self) -> PathBuf {
        self.root().join("src/out/Release")
    }

    pub fn log(&self) -> PathBuf {
        self.root().join("tool.log")
    }

    pub fn config(&self) -> PathBuf {
        self.root().join("runner.toml")
    }

    /// Lines the fake tool logged, one per start.
    pub fn tool_calls(&self) -> Vec<String> {
        fs::read_to_string(self.log())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Scripts left behind in the outdir.
    pub fn leftover_scripts(&self) -> Vec<PathBuf> {
        fs::read_dir(self.outdir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("device_script_"))
            })
            .collect()
    }

    /// The binary, run from the fixture root against a device target.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin(BIN).unwrap();
        cmd.current_dir(self.root())
            .env("FAKE_LOG", self.log())
            .env_remove("LLVM_PROFILE_FILE")
            .env_remove("FAKE_EXIT")
            .env_remove("FAKE_HANG")
            .arg("--board")
            .arg("eve")
            .arg("--device")
            .arg("127.0.0.1")
            .arg("--config")
            .arg(self.config());
        cmd
    }
}
