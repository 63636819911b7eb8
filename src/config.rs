use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::data::SolveOptions;

/// Weekly timetable generator.
#[derive(Debug, Parser)]
#[command(name = "timetable-solver", version, about)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "TIMETABLE_LOG", default_value = "info", global = true)]
    pub log_filter: String,

    /// Address the HTTP service listens on
    #[arg(long, env = "TIMETABLE_BIND", default_value = "127.0.0.1:8080", global = true)]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub solver: SolverDefaults,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Solve a snapshot read from a JSON file and print the report.
    Solve {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

/// Grid and budget used when a request does not carry its own.
#[derive(Debug, Clone, Copy, Args)]
pub struct SolverDefaults {
    /// Scheduling days per week
    #[arg(long, env = "TIMETABLE_DAYS", default_value_t = 5)]
    pub days: u32,

    /// Periods per scheduling day
    #[arg(long, env = "TIMETABLE_PERIODS", default_value_t = 8)]
    pub periods_per_day: u32,

    /// Backtracks allowed before a run is aborted
    #[arg(long, env = "TIMETABLE_MAX_BACKTRACKS", default_value_t = 200_000)]
    pub max_backtracks: u64,

    /// Wall-clock limit per run in milliseconds
    #[arg(long, env = "TIMETABLE_TIME_LIMIT_MS", default_value_t = 10_000)]
    pub time_limit_ms: u64,

    /// Attach the deepest partial timetable to failures
    #[arg(long, env = "TIMETABLE_BEST_EFFORT")]
    pub best_effort: bool,
}

impl Default for SolverDefaults {
    fn default() -> Self {
        Self {
            days: 5,
            periods_per_day: 8,
            max_backtracks: 200_000,
            time_limit_ms: 10_000,
            best_effort: false,
        }
    }
}

/// Search limits for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_backtracks: u64,
    pub time_limit: Duration,
    pub best_effort: bool,
}

impl SolverDefaults {
    /// Applies per-request overrides on top of the configured defaults.
    pub fn limits(&self, options: &SolveOptions) -> SearchLimits {
        SearchLimits {
            max_backtracks: options.max_backtracks.unwrap_or(self.max_backtracks),
            time_limit: Duration::from_millis(options.time_limit_ms.unwrap_or(self.time_limit_ms)),
            best_effort: options.best_effort.unwrap_or(self.best_effort),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_options_override_defaults() {
        let defaults = SolverDefaults::default();
        let options = SolveOptions {
            max_backtracks: Some(5),
            time_limit_ms: None,
            best_effort: Some(true),
        };
        let limits = defaults.limits(&options);
        assert_eq!(limits.max_backtracks, 5);
        assert_eq!(limits.time_limit, Duration::from_millis(10_000));
        assert!(limits.best_effort);
    }

    #[test]
    fn cli_defaults_to_serve_less_invocation() {
        let cli = Cli::try_parse_from(["timetable-solver", "--days", "6"]).unwrap();
        assert_eq!(cli.solver.days, 6);
        assert_eq!(cli.solver.periods_per_day, 8);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_solve_subcommand() {
        let cli = Cli::try_parse_from(["timetable-solver", "solve", "snapshot.json"]).unwrap();
        match cli.command {
            Some(Command::Solve { input }) => assert_eq!(input, PathBuf::from("snapshot.json")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
