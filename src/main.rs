use clap::Parser;
use log::debug;

use remote_test_runner::config::CliArgs;
use remote_test_runner::error::{EXIT_CONFIGURATION, RunnerError};
use remote_test_runner::runner;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version land here too.
            let code = if e.use_stderr() { EXIT_CONFIGURATION } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format_timestamp_secs()
        .init();
    debug!("Parsed arguments: {args:?}");

    let code = match runner::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            e.downcast_ref::<RunnerError>()
                .map_or(EXIT_CONFIGURATION, RunnerError::exit_code)
        }
    };
    std::process::exit(code);
}
