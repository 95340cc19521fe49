//! Runner configuration file.
//!
//! Every field is optional; a missing file means "use the defaults", which
//! derive the tool locations from the source checkout the runner sits in.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RunnerError};
use crate::utils::{self, absolutize};

/// Special hostname that resolves to a different DUT in the lab depending on
/// which lab machine the runner is on.
pub const LAB_DUT_HOSTNAME: &str = "variable_chromeos_device_hostname";

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

fn default_lab_dut_hostname() -> String {
    LAB_DUT_HOSTNAME.to_string()
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Root of the source checkout. Relative paths handed to the deployment
    /// tool are relative to this directory.
    #[serde(default)]
    pub src_root: Option<PathBuf>,
    #[serde(default)]
    pub chromite_path: Option<PathBuf>,
    #[serde(default)]
    pub deploy_tool: Option<PathBuf>,
    #[serde(default = "default_lab_dut_hostname")]
    pub lab_dut_hostname: String,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutorConfig {
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            retries: None,
            timeout: None,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            src_root: None,
            chromite_path: None,
            deploy_tool: None,
            lab_dut_hostname: default_lab_dut_hostname(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Absolute locations derived from a [`RunnerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub src_root: PathBuf,
    pub chromite_path: PathBuf,
    pub deploy_tool: PathBuf,
    pub default_cros_cache: PathBuf,
}

impl RunnerConfig {
    /// Loads the configuration, or the defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => utils::read_toml_from_file(path)
                .map_err(|e| RunnerError::configuration(format!("{e:#}"))),
            None => Ok(Self::default()),
        }
    }

    /// Resolves tool locations. Relative entries are taken relative to `cwd`.
    pub fn resolve_paths(&self, cwd: &Path) -> ToolPaths {
        let src_root = self
            .src_root
            .as_deref()
            .map(|p| absolutize(p, cwd))
            .unwrap_or_else(|| cwd.to_path_buf());
        let chromite_path = self
            .chromite_path
            .as_deref()
            .map(|p| absolutize(p, cwd))
            .unwrap_or_else(|| src_root.join("third_party").join("chromite"));
        let deploy_tool = self
            .deploy_tool
            .as_deref()
            .map(|p| absolutize(p, cwd))
            .unwrap_or_else(|| chromite_path.join("bin").join("cros_run_test"));
        let default_cros_cache = src_root.join("build").join("cros_cache");
        ToolPaths {
            src_root,
            chromite_path,
            deploy_tool,
            default_cros_cache,
        }
    }
}
