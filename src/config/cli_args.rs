use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Target name that selects the browser sanity test instead of a gtest binary.
pub const SANITY_TEST_TARGET: &str = "cros_vm_sanity_test";

// remote-test-runner - run a test suite on a ChromeOS VM or device
#[derive(Parser, Debug)]
#[command(
    name = "remote-test-runner",
    version,
    about = "Run a test suite on a ChromeOS VM or device through the deployment tool",
    after_help = "TEST TYPES:\n  vm-test                Run a device-side gtest binary (or the browser sanity test)\n  tast                   Run a set of Tast tests\n  host-cmd               Run a host-side command against the target\n\nEXAMPLES:\n  remote-test-runner --board eve --use-vm vm-test --test-exe base_unittests --path-to-outdir out/Release\n  remote-test-runner --board eve --device dut1 tast --suite-name chrome_all_tast_tests --path-to-outdir out/Release -t ui.ChromeLogin\n  remote-test-runner --board eve --use-vm host-cmd --deploy-chrome --path-to-outdir out/Release -- ./run_telemetry"
)]
pub struct CliArgs {
    // Verbose mode - Show debug log information
    #[arg(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub verbose: bool,

    // Board - Type of the ChromeOS device
    #[arg(long = "board", help = "Type of CrOS device")]
    pub board: String,

    // VM mode - Start a VM and run the test inside it
    #[arg(long = "use-vm", conflicts_with = "device", help = "Run the test in a VM instead of a device")]
    pub use_vm: bool,

    // Device - Hostname or IP of the device
    #[arg(long = "device", help = "Hostname (or IP) of the device to run the test on")]
    pub device: Option<String>,

    // Runner configuration file
    #[arg(long = "config", help = "Runner configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: TestCommand,
}

#[derive(Subcommand, Debug)]
pub enum TestCommand {
    /// Runs a host-side command. Pass the command to run after "--".
    #[command(name = "host-cmd")]
    HostCmd(HostCmdArgs),

    /// Runs a device-side gtest.
    #[command(name = "vm-test", alias = "gtest")]
    VmTest(GTestArgs),

    /// Runs a device-side set of Tast tests.
    #[command(name = "tast")]
    Tast(TastArgs),
}

/// Arguments shared by the device-side test types.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long = "cros-cache", help = "Path to cros cache")]
    pub cros_cache: Option<PathBuf>,

    #[arg(
        long = "path-to-outdir",
        help = "Path to output directory, all of whose contents will be deployed to the device"
    )]
    pub path_to_outdir: PathBuf,

    #[arg(long = "runtime-deps-path", help = "Runtime data dependency file from GN")]
    pub runtime_deps_path: Option<PathBuf>,

    #[arg(
        long = "vpython-dir",
        help = "Directory (relative to the outdir) holding a vpython binary to deploy to the device"
    )]
    pub vpython_dir: Option<PathBuf>,

    #[arg(
        long = "logs-dir",
        visible_alias = "vm-logs-dir",
        help = "Copy everything under /var/log/ from the device into this dir after the test"
    )]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GTestArgs {
    #[arg(
        long = "test-exe",
        help = "Test executable to run inside the device; cros_vm_sanity_test runs the browser sanity test"
    )]
    pub test_exe: String,

    #[arg(
        long = "test-launcher-summary-output",
        help = "Pass the same option down to the test and retrieve its result file at this location"
    )]
    pub test_launcher_summary_output: Option<PathBuf>,

    #[arg(
        long = "test-launcher-shard-index",
        env = "GTEST_SHARD_INDEX",
        default_value_t = 0,
        help = "Index of the external shard to run"
    )]
    pub test_launcher_shard_index: u32,

    #[arg(
        long = "test-launcher-total-shards",
        env = "GTEST_TOTAL_SHARDS",
        default_value_t = 1,
        help = "Total number of external shards"
    )]
    pub test_launcher_total_shards: u32,

    #[command(flatten)]
    pub common: CommonArgs,

    // Everything clap does not recognise is forwarded to the test binary
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TEST_ARGS")]
    pub additional_args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TastArgs {
    #[arg(long = "suite-name", help = "Name used to report the set of Tast tests")]
    pub suite_name: String,

    #[arg(
        long = "test-launcher-summary-output",
        help = "Generate a simple GTest-style JSON result file for the run"
    )]
    pub test_launcher_summary_output: Option<PathBuf>,

    #[arg(
        long = "conditional",
        visible_alias = "attr-expr",
        help = "Boolean expression whose matching tests will run"
    )]
    pub conditional: Option<String>,

    #[arg(short = 't', long = "test", help = "A Tast test to run in the device (repeatable)")]
    pub tests: Vec<String>,

    #[arg(
        long = "use-host-tast-bin",
        help = "Use the host-side Tast bin instead of the device-side local_test_runner"
    )]
    pub use_host_tast_bin: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TEST_ARGS")]
    pub additional_args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct HostCmdArgs {
    #[arg(long = "cros-cache", help = "Path to cros cache")]
    pub cros_cache: Option<PathBuf>,

    #[arg(long = "path-to-outdir", help = "Path to output directory")]
    pub path_to_outdir: Option<PathBuf>,

    #[arg(
        long = "deploy-chrome",
        help = "Deploy a locally built Chrome to the device before running the host command"
    )]
    pub deploy_chrome: bool,

    #[arg(last = true, value_name = "CMD")]
    pub cmd: Vec<String>,
}

impl CliArgs {
    /// Get log level
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        }
    }

    /// Hostname of the requested device, if any
    pub fn device_hostname(&self) -> Option<String> {
        self.device.clone()
    }
}
