mod config;
mod data;
mod engine;
mod error;
mod model;
mod normalize;
mod serialize;
mod server;
mod solver;
mod verify;

#[cfg(test)]
mod testing;

use clap::Parser;
use log::error;
use std::process::ExitCode;

use crate::config::{Cli, Command};
use crate::data::SchedulingInput;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_filter)).init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => match server::run_server(cli.bind, cli.solver).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server stopped: {}", e);
                ExitCode::FAILURE
            }
        },
        Command::Solve { input } => {
            let raw = match std::fs::read_to_string(&input) {
                Ok(raw) => raw,
                Err(e) => {
                    error!("Cannot read {}: {}", input.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            let snapshot: SchedulingInput = match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Cannot parse {}: {}", input.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            match solver::solve(&snapshot, &cli.solver) {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}", e);
                    println!("{:#}", serialize::error_body(&e));
                    ExitCode::FAILURE
                }
            }
        }
    }
}
