//! Ties the command line to command construction, supervision and
//! reporting.

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::path::{Path, PathBuf};

use crate::config::cli_args::{CommonArgs, GTestArgs, HostCmdArgs, SANITY_TEST_TARGET, TastArgs};
use crate::config::{CliArgs, RunnerConfig, TestCommand, ToolPaths};
use crate::environment::{check_kvm, check_lab_dut, setup_env};
use crate::host_cmd::HostCommand;
use crate::invocation::{CommandBuilder, DeviceTarget, RemoteInvocation};
use crate::reporter::ResultDocument;
use crate::supervisor::{ProcessSupervisor, SupervisorReport};
use crate::test_variant::{BrowserSanityTest, GTestTest, TastTest, TestVariant};
use crate::utils::absolutize;

/// Everything resolved before a command is built.
struct RunContext {
    board: String,
    target: DeviceTarget,
    cwd: PathBuf,
    paths: ToolPaths,
    config: RunnerConfig,
    llvm_profile_file: Option<String>,
    verbose: bool,
}

impl RunContext {
    fn new(args: &CliArgs) -> Result<Self> {
        let config = RunnerConfig::load(args.config.as_deref())?;
        let cwd = std::env::current_dir().context("Failed to get the current directory")?;
        let paths = config.resolve_paths(&cwd);
        let target = if args.use_vm {
            DeviceTarget::Vm
        } else {
            DeviceTarget::Device {
                hostname: args
                    .device_hostname()
                    .unwrap_or_else(|| config.lab_dut_hostname.clone()),
            }
        };
        let llvm_profile_file = std::env::var("LLVM_PROFILE_FILE").ok().filter(|p| !p.is_empty());

        Ok(Self {
            board: args.board.clone(),
            target,
            cwd,
            paths,
            config,
            llvm_profile_file,
            verbose: args.verbose,
        })
    }

    /// Host checks that must pass before anything is built.
    fn preflight(&self, args: &CliArgs) -> Result<()> {
        if args.use_vm {
            check_kvm()?;
        } else if args.device.is_none() {
            check_lab_dut(&self.config.lab_dut_hostname)?;
        }
        Ok(())
    }

    fn abs(&self, path: &Path) -> PathBuf {
        absolutize(path, &self.cwd)
    }

    fn builder(
        &self,
        cros_cache: Option<&Path>,
        path_to_outdir: PathBuf,
        logs_dir: Option<PathBuf>,
        llvm_profile_file: Option<String>,
    ) -> CommandBuilder {
        CommandBuilder {
            deploy_tool: self.paths.deploy_tool.clone(),
            board: self.board.clone(),
            cros_cache: cros_cache
                .map(|p| self.abs(p))
                .unwrap_or_else(|| self.paths.default_cros_cache.clone()),
            target: self.target.clone(),
            src_root: self.paths.src_root.clone(),
            chromite_path: self.paths.chromite_path.clone(),
            path_to_outdir,
            logs_dir,
            llvm_profile_file,
        }
    }

    fn test_builder(&self, common: &CommonArgs) -> CommandBuilder {
        self.builder(
            common.cros_cache.as_deref(),
            self.abs(&common.path_to_outdir),
            common.logs_dir.as_deref().map(|p| self.abs(p)),
            self.llvm_profile_file.clone(),
        )
    }

    fn supervisor(&self) -> ProcessSupervisor {
        ProcessSupervisor::default()
            .grace_period(self.config.executor.grace_period)
            .env(setup_env(&self.paths.chromite_path))
            .current_dir(&self.paths.src_root)
    }

    fn gtest_variant(&self, args: &GTestArgs) -> TestVariant {
        let summary = args.test_launcher_summary_output.as_deref().map(|p| self.abs(p));
        if args.test_exe == SANITY_TEST_TARGET {
            return TestVariant::BrowserSanity(BrowserSanityTest {
                test_launcher_summary_output: summary,
                additional_args: args.additional_args.clone(),
            });
        }
        let mut test = GTestTest::new(&args.test_exe);
        test.test_launcher_summary_output = summary;
        test.runtime_deps_path = args.common.runtime_deps_path.as_deref().map(|p| self.abs(p));
        test.vpython_dir = args.common.vpython_dir.clone();
        test.shard_index = args.test_launcher_shard_index;
        test.total_shards = args.test_launcher_total_shards;
        test.additional_args = args.additional_args.clone();
        test.retries = self.config.executor.retries.unwrap_or(0);
        test.timeout = self.config.executor.timeout;
        TestVariant::GTest(test)
    }

    fn tast_variant(&self, args: &TastArgs) -> TestVariant {
        let mut test = TastTest::new(&args.suite_name);
        test.test_launcher_summary_output =
            args.test_launcher_summary_output.as_deref().map(|p| self.abs(p));
        test.conditional = args.conditional.clone();
        test.tests = args.tests.clone();
        test.use_host_tast_bin = args.use_host_tast_bin;
        test.additional_args = args.additional_args.clone();
        test.retries = self.config.executor.retries.unwrap_or(0);
        test.timeout = self.config.executor.timeout;
        TestVariant::Tast(test)
    }
}

/// Runs the requested command and returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let ctx = RunContext::new(&args)?;
    ctx.preflight(&args)?;
    debug!("Resolved tool paths: {:?}", ctx.paths);

    match &args.command {
        TestCommand::HostCmd(host) => run_host_cmd(&ctx, host).await,
        TestCommand::VmTest(gtest) => {
            let builder = ctx.test_builder(&gtest.common);
            run_test(&ctx, &builder, ctx.gtest_variant(gtest)).await
        }
        TestCommand::Tast(tast) => {
            let builder = ctx.test_builder(&tast.common);
            run_test(&ctx, &builder, ctx.tast_variant(tast)).await
        }
    }
}

async fn run_host_cmd(ctx: &RunContext, args: &HostCmdArgs) -> Result<i32> {
    let path_to_outdir = args.path_to_outdir.as_deref().map(|p| ctx.abs(p));
    let builder = ctx.builder(
        args.cros_cache.as_deref(),
        path_to_outdir.clone().unwrap_or_else(|| ctx.paths.src_root.clone()),
        None,
        None,
    );
    let command = HostCommand {
        cmd: args.cmd.clone(),
        deploy_chrome: args.deploy_chrome,
        path_to_outdir,
        debug: ctx.verbose,
    };
    let invocation = command.build(&builder)?;
    CommandBuilder::log_invocation(&invocation);

    let report = ctx.supervisor().run(&invocation, None, 1).await?;
    print_failed_attempts(&report);
    Ok(report.exit_code)
}

async fn run_test(ctx: &RunContext, builder: &CommandBuilder, variant: TestVariant) -> Result<i32> {
    let invocation = variant.build_remote_invocation(builder)?;
    CommandBuilder::log_invocation(&invocation);

    let result = ctx
        .supervisor()
        .run(&invocation, variant.timeout(), variant.max_attempts())
        .await;
    cleanup(invocation);
    let report = result?;

    print_failed_attempts(&report);
    ResultDocument::report(variant.suite_name(), report.exit_code)
        .write(variant.summary_output())?;
    Ok(report.exit_code)
}

/// Removes the on-device script after the last attempt.
fn cleanup(invocation: RemoteInvocation) {
    if let Some(script) = invocation.into_script() {
        let path = script.path().to_path_buf();
        match script.remove() {
            Ok(()) => info!("Removed {}", path.display()),
            Err(e) => error!("Failed to remove {}: {e}", path.display()),
        }
    }
}

fn print_failed_attempts(report: &SupervisorReport) {
    if !report.succeeded() {
        eprintln!("Test attempts:\n{}", report.summary());
    }
}
