use serde::{Deserialize, Serialize};
use std::fmt;

// Type aliases for clarity
pub type ClassId = String;
pub type TeacherId = String;
pub type SubjectId = String;
pub type Day = u32;
pub type Period = u32;

/// A (day, period) position in the weekly grid. Orders by day, then period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Slot {
    pub day: Day,
    pub period: Period,
}

impl Slot {
    pub fn new(day: Day, period: Period) -> Self {
        Self { day, period }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} period {}", self.day, self.period)
    }
}

/// One row of a class's weekly requirements.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRequirement {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub subject_name: Option<String>,
    pub teacher_id: TeacherId,
    /// Falls back to the subject's own `hoursPerWeek` when absent.
    #[serde(default)]
    pub hours_per_week: Option<i32>,
}

/// A cohort that needs a weekly schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: ClassId,
    #[serde(default)]
    pub name: Option<String>,
    pub subjects: Vec<SubjectRequirement>,
}

/// An instructor with their scheduling constraints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subjects_can_teach: Vec<SubjectId>,
    #[serde(default)]
    pub unavailable_slots: Vec<Slot>,
    #[serde(default)]
    pub preferred_slots: Vec<Slot>,
    #[serde(default)]
    pub max_hours_per_day: Option<i32>,
    #[serde(default)]
    pub max_hours_per_week: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hours_per_week: Option<i32>,
}

/// A pre-pinned assignment the solver must leave untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedSlot {
    pub class_id: ClassId,
    pub day: Day,
    pub period: Period,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
}

impl FixedSlot {
    pub fn slot(&self) -> Slot {
        Slot::new(self.day, self.period)
    }
}

/// Per-request overrides of the server's search budget.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveOptions {
    #[serde(default)]
    pub max_backtracks: Option<u64>,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub best_effort: Option<bool>,
}

/// The complete input for the scheduling problem.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingInput {
    pub classes: Vec<Class>,
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub fixed_slots: Vec<FixedSlot>,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub periods_per_day: Option<u32>,
    #[serde(default)]
    pub options: SolveOptions,
}

/// Represents a single, scheduled class hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub class_id: ClassId,
    pub day: Day,
    pub period: Period,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
}

impl Assignment {
    pub fn slot(&self) -> Slot {
        Slot::new(self.day, self.period)
    }
}

/// Why a demand could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockReason {
    ClassFull,
    TeacherUnavailable,
    TeacherBusy,
    DailyCap,
    WeeklyCap,
    TeacherOverbooked,
    ClassOverbooked,
    SearchExhausted,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::ClassFull => "class already has a lesson in every remaining slot",
            BlockReason::TeacherUnavailable => "teacher is unavailable",
            BlockReason::TeacherBusy => "teacher is teaching another class",
            BlockReason::DailyCap => "teacher would exceed maxHoursPerDay",
            BlockReason::WeeklyCap => "teacher would exceed maxHoursPerWeek",
            BlockReason::TeacherOverbooked => "teacher has fewer free slots than demanded hours",
            BlockReason::ClassOverbooked => "class has fewer free cells than demanded hours",
            BlockReason::SearchExhausted => "no consistent placement found for the remaining hours",
        };
        f.write_str(text)
    }
}

/// A (class, subject) pair left with unscheduled hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedDemand {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub remaining_hours: u32,
    pub reason: BlockReason,
    pub detail: String,
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub nodes: u64,
    pub backtracks: u64,
    pub elapsed_ms: u64,
}

/// The extended output of the solver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveReport {
    pub assignments: Vec<Assignment>,
    pub score: i32,
    pub preferred_hits: u32,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
    pub stats: SearchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_decodes_camel_case_fields() {
        let raw = r#"{
            "classes": [{"id": "c1", "name": "7A", "studentCount": 30,
                "subjects": [{"subjectId": "math", "subjectName": "Math", "teacherId": "t1", "hoursPerWeek": 3}]}],
            "teachers": [{"id": "t1", "subjectsCanTeach": ["math"],
                "unavailableSlots": [{"day": 0, "period": 1}], "preferredSlots": [],
                "maxHoursPerDay": 4, "maxHoursPerWeek": 20, "isHOD": true}],
            "subjects": [{"id": "math", "name": "Math", "type": "lab", "hoursPerWeek": 3}],
            "fixedSlots": [{"classId": "c1", "day": 1, "period": 0, "subjectId": "math", "teacherId": "t1"}]
        }"#;
        let input: SchedulingInput = serde_json::from_str(raw).unwrap();
        assert_eq!(input.classes[0].subjects[0].hours_per_week, Some(3));
        assert_eq!(input.teachers[0].unavailable_slots, vec![Slot::new(0, 1)]);
        assert_eq!(input.teachers[0].max_hours_per_day, Some(4));
        // "type" is accepted and ignored
        assert_eq!(input.subjects[0].hours_per_week, Some(3));
        assert_eq!(input.fixed_slots[0].slot(), Slot::new(1, 0));
        assert!(input.days.is_none());
        assert!(input.options.best_effort.is_none());
    }

    #[test]
    fn assignments_sort_by_class_then_day_then_period() {
        let make = |class: &str, day, period| Assignment {
            class_id: class.to_string(),
            day,
            period,
            subject_id: "s".to_string(),
            teacher_id: "t".to_string(),
        };
        let mut list = vec![make("b", 0, 0), make("a", 1, 0), make("a", 0, 2), make("a", 0, 1)];
        list.sort();
        assert_eq!(list, vec![make("a", 0, 1), make("a", 0, 2), make("a", 1, 0), make("b", 0, 0)]);
    }

    #[test]
    fn block_reason_serializes_camel_case() {
        let json = serde_json::to_string(&BlockReason::WeeklyCap).unwrap();
        assert_eq!(json, "\"weeklyCap\"");
    }
}
