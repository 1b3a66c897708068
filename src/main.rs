use clap::Parser;
use dirtidy::cli::{Cli, run};
use dirtidy::logging::{Verbosity, init_logging};
use dirtidy::output::OutputFormatter;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(
        Verbosity::from_flags(cli.verbose, cli.debug),
        cli.log_dir.as_deref(),
    );

    match run(&cli.into_invocation()) {
        Ok(outcome) if outcome.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "command failed");
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
