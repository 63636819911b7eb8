//! Flattens engine results into wire records.

use serde_json::{Value, json};

use crate::data::{Assignment, SearchStats, SolveReport, UnmetSoftConstraint, UnplacedDemand};
use crate::engine::Blocked;
use crate::error::SolveError;
use crate::normalize::Problem;

/// One record per placed hour, sorted by class, day, period. Fixed slots are
/// never part of `placements` and so never appear here.
pub fn assignments(problem: &Problem, placements: &[(usize, usize)]) -> Vec<Assignment> {
    let mut out: Vec<Assignment> = placements
        .iter()
        .map(|&(group, slot)| {
            let demand = &problem.groups[group];
            let slot = problem.grid.slot(slot);
            Assignment {
                class_id: problem.classes[demand.class].id.clone(),
                day: slot.day,
                period: slot.period,
                subject_id: demand.subject_id.clone(),
                teacher_id: problem.teachers[demand.teacher].id.clone(),
            }
        })
        .collect();
    out.sort();
    out
}

pub fn unplaced(problem: &Problem, blocked: &[Blocked]) -> Vec<UnplacedDemand> {
    blocked
        .iter()
        .map(|b| {
            let demand = &problem.groups[b.group];
            UnplacedDemand {
                class_id: problem.classes[demand.class].id.clone(),
                subject_id: demand.subject_id.clone(),
                teacher_id: problem.teachers[demand.teacher].id.clone(),
                remaining_hours: b.remaining,
                reason: b.reason,
                detail: b.detail.clone(),
            }
        })
        .collect()
}

/// Scores the timetable against teachers' preferred slots.
///
/// Only teachers that list preferences are scored: +1 for an hour inside a
/// preferred slot, -1 and an unmet soft constraint for an hour outside.
pub fn report(problem: &Problem, assignments: Vec<Assignment>, stats: SearchStats) -> SolveReport {
    let mut score = 0;
    let mut preferred_hits = 0;
    let mut unmet = Vec::new();

    for assignment in &assignments {
        let Some(teacher) = problem.teachers.iter().find(|t| t.id == assignment.teacher_id) else {
            continue;
        };
        if !teacher.has_preferences() {
            continue;
        }
        let Some(index) = problem.grid.index(assignment.slot()) else {
            continue;
        };
        if teacher.preferred[index] {
            score += 1;
            preferred_hits += 1;
        } else {
            score -= 1;
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Preferred Slot".to_string(),
                description: format!(
                    "Teacher {} teaches {} to class {} at {}, outside their preferred slots.",
                    teacher.label(),
                    assignment.subject_id,
                    assignment.class_id,
                    assignment.slot()
                ),
            });
        }
    }

    SolveReport {
        assignments,
        score,
        preferred_hits,
        unmet_soft_constraints: unmet,
        stats,
    }
}

/// JSON body describing a failed run, shared by the HTTP and CLI surfaces.
pub fn error_body(error: &SolveError) -> Value {
    let mut body = json!({
        "error": error.code(),
        "message": error.to_string(),
    });
    match error {
        SolveError::Validation(problems) => {
            body["problems"] = json!(problems);
        }
        SolveError::Unsatisfiable {
            unplaced,
            partial,
            stats,
        }
        | SolveError::BudgetExceeded {
            unplaced,
            partial,
            stats,
        } => {
            body["unplaced"] = json!(unplaced);
            body["stats"] = json!(stats);
            if let Some(partial) = partial {
                body["partial"] = json!(partial);
            }
        }
    }
    body
}
