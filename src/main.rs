use clap::Parser;
use parlaz::{infer_direction, run, Cli, Config};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();

    let direction = match infer_direction(&cli.input) {
        Ok(d) => d,
        Err(e) => {
            log::error!("could not read input header: {e}");
            return ExitCode::FAILURE;
        }
    };
    let config = Config::from_cli(cli, direction);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let rank = e
                .rank()
                .map(|r| format!(" (rank {r})"))
                .unwrap_or_default();
            log::error!("conversion failed{rank}: {e}");
            ExitCode::FAILURE
        }
    }
}
