use log::{debug, info};
use std::time::Instant;

use crate::config::SolverDefaults;
use crate::data::{Assignment, SchedulingInput, SolveReport};
use crate::engine::Engine;
use crate::error::SolveError;
use crate::model::Grid;
use crate::normalize::{Problem, normalize};
use crate::serialize;
use crate::verify::{self, Violation};

fn grid_for(input: &SchedulingInput, defaults: &SolverDefaults) -> Grid {
    Grid::new(
        input.days.unwrap_or(defaults.days),
        input.periods_per_day.unwrap_or(defaults.periods_per_day),
    )
}

fn prepare(input: &SchedulingInput, defaults: &SolverDefaults) -> Result<Problem, SolveError> {
    normalize(input, grid_for(input, defaults))
}

/// Builds a timetable for the snapshot: normalize, search, serialize.
pub fn solve(input: &SchedulingInput, defaults: &SolverDefaults) -> Result<SolveReport, SolveError> {
    let start_time = Instant::now();
    let problem = prepare(input, defaults)?;
    let limits = defaults.limits(&input.options);
    debug!(
        "Search limits: {} backtracks, {:?}, best effort {}.",
        limits.max_backtracks, limits.time_limit, limits.best_effort
    );

    let solution = Engine::new(&problem, limits).run()?;
    let assignments = serialize::assignments(&problem, &solution.placements);
    debug_assert!(verify::check(&problem, &assignments).is_empty());

    let report = serialize::report(&problem, assignments, solution.stats);
    info!(
        "Timetable with {} assignments built in {:.2?} (preferred-slot score {}).",
        report.assignments.len(),
        start_time.elapsed(),
        report.score
    );
    Ok(report)
}

/// Plain assignment list, the shape the calling application persists.
pub fn generate(input: &SchedulingInput, defaults: &SolverDefaults) -> Result<Vec<Assignment>, SolveError> {
    solve(input, defaults).map(|report| report.assignments)
}

/// Checks an externally supplied timetable against the snapshot.
pub fn check(
    input: &SchedulingInput,
    assignments: &[Assignment],
    defaults: &SolverDefaults,
) -> Result<Vec<Violation>, SolveError> {
    let problem = prepare(input, defaults)?;
    let violations = verify::check(&problem, assignments);
    info!(
        "Checked {} assignments: {} violation(s).",
        assignments.len(),
        violations.len()
    );
    Ok(violations)
}
