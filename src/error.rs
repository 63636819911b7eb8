use serde::Serialize;
use thiserror::Error;

use crate::data::{Assignment, SearchStats, UnplacedDemand};

/// A single problem found in the input snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationErrorKind {
    InvalidGrid,
    DuplicateId,
    UnknownReference,
    DuplicateSubject,
    TeacherNotQualified,
    NonPositiveHours,
    HoursExceedGrid,
    NonPositiveCap,
    SlotOutOfRange,
    FixedSlotConflict,
    FixedExceedsDemand,
    FixedExceedsCap,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Terminal outcomes of a scheduling run other than success.
#[derive(Debug, Clone, Error)]
pub enum SolveError {
    #[error("input snapshot has {} validation problem(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("{} demand(s) cannot be placed under the hard constraints", .unplaced.len())]
    Unsatisfiable {
        unplaced: Vec<UnplacedDemand>,
        /// Deepest partial timetable, only filled in best-effort mode.
        partial: Option<Vec<Assignment>>,
        stats: SearchStats,
    },

    #[error(
        "search budget exhausted after {} nodes and {} backtracks ({} ms)",
        .stats.nodes,
        .stats.backtracks,
        .stats.elapsed_ms
    )]
    BudgetExceeded {
        unplaced: Vec<UnplacedDemand>,
        partial: Option<Vec<Assignment>>,
        stats: SearchStats,
    },
}

impl SolveError {
    /// Stable identifier used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SolveError::Validation(_) => "validation",
            SolveError::Unsatisfiable { .. } => "unsatisfiable",
            SolveError::BudgetExceeded { .. } => "budgetExceeded",
        }
    }
}
