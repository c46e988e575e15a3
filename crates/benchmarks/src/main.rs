//! Benchmark harness executable for cyclebench.

use clap::{CommandFactory, Parser};
use cyclebench_harness::cli::{
    is_allocation_error, is_usage_error, run_cli, usage_exit_code, Cli,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // usage goes to stdout, like the classic benchmark programs
            print!("{}", err.render());
            return ExitCode::from(usage_exit_code(&err));
        }
    };

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_usage_error(&err) => {
            println!("error: {err}\n\n{}", Cli::command().render_usage());
            ExitCode::from(1)
        }
        Err(err) if is_allocation_error(&err) => {
            eprintln!("cyclebench: {err}; try a smaller size");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("cyclebench: {err:#}");
            ExitCode::from(1)
        }
    }
}
