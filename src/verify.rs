//! Re-checks a finished timetable against the hard constraints.
//!
//! Used after every successful search and exposed over HTTP so a manually
//! edited timetable can be validated before it is persisted.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::data::Assignment;
use crate::normalize::Problem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    UnknownReference,
    OutOfGrid,
    FixedOverwritten,
    ClassClash,
    TeacherClash,
    TeacherUnavailable,
    DailyCap,
    WeeklyCap,
    WrongTeacher,
    Coverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

impl Violation {
    fn new(kind: ViolationKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// Checks `assignments` (fixed slots excluded) on top of the problem's fixed
/// slots. An empty result means every hard constraint holds and every
/// demanded hour is covered exactly once.
pub fn check(problem: &Problem, assignments: &[Assignment]) -> Vec<Violation> {
    let grid = problem.grid;
    let slots = grid.slot_count();
    let days = grid.days as usize;
    let mut violations = Vec::new();

    let class_index: BTreeMap<&str, usize> = problem
        .classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();
    let teacher_index: BTreeMap<&str, usize> = problem
        .teachers
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut pinned = vec![false; problem.classes.len() * slots];
    for fixed in &problem.fixed {
        pinned[fixed.class * slots + fixed.slot] = true;
    }
    let mut taken = vec![false; problem.classes.len() * slots];
    let mut teacher_at: Vec<Option<usize>> = vec![None; problem.teachers.len() * slots];
    let mut day_load = vec![0u32; problem.teachers.len() * days];
    let mut week_load = vec![0u32; problem.teachers.len()];
    for (t, teacher) in problem.teachers.iter().enumerate() {
        day_load[t * days..(t + 1) * days].copy_from_slice(&teacher.day_load);
        week_load[t] = teacher.week_load;
    }
    for fixed in &problem.fixed {
        teacher_at[fixed.teacher * slots + fixed.slot] = Some(fixed.class);
    }

    let mut covered: BTreeMap<(usize, &str), u32> = BTreeMap::new();
    for a in assignments {
        let class = class_index.get(a.class_id.as_str()).copied();
        let teacher = teacher_index.get(a.teacher_id.as_str()).copied();
        let (Some(c), Some(t)) = (class, teacher) else {
            violations.push(Violation::new(
                ViolationKind::UnknownReference,
                format!(
                    "Assignment for class '{}' with teacher '{}' references an unknown id",
                    a.class_id, a.teacher_id
                ),
            ));
            continue;
        };
        let Some(s) = grid.index(a.slot()) else {
            violations.push(Violation::new(
                ViolationKind::OutOfGrid,
                format!("Class '{}' is scheduled at {} outside the grid", a.class_id, a.slot()),
            ));
            continue;
        };

        let cell = c * slots + s;
        if pinned[cell] {
            violations.push(Violation::new(
                ViolationKind::FixedOverwritten,
                format!("Class '{}' has a fixed slot at {} that was reassigned", a.class_id, a.slot()),
            ));
        } else if taken[cell] {
            violations.push(Violation::new(
                ViolationKind::ClassClash,
                format!("Class '{}' has two lessons at {}", a.class_id, a.slot()),
            ));
        } else {
            taken[cell] = true;
        }

        let holder = teacher_at[t * slots + s];
        match holder {
            Some(other) if other != c => violations.push(Violation::new(
                ViolationKind::TeacherClash,
                format!(
                    "Teacher '{}' teaches classes '{}' and '{}' at {}",
                    a.teacher_id,
                    problem.classes[other].id,
                    a.class_id,
                    a.slot()
                ),
            )),
            _ => teacher_at[t * slots + s] = Some(c),
        }

        if problem.teachers[t].unavailable[s] {
            violations.push(Violation::new(
                ViolationKind::TeacherUnavailable,
                format!("Teacher '{}' is unavailable at {}", a.teacher_id, a.slot()),
            ));
        }

        day_load[t * days + grid.day_of(s)] += 1;
        week_load[t] += 1;
        *covered.entry((c, a.subject_id.as_str())).or_default() += 1;

        let expected = problem
            .groups
            .iter()
            .find(|g| g.class == c && g.subject_id == a.subject_id)
            .map(|g| g.teacher);
        if let Some(expected) = expected {
            if expected != t {
                violations.push(Violation::new(
                    ViolationKind::WrongTeacher,
                    format!(
                        "Class '{}' {} is taught by '{}' instead of '{}'",
                        a.class_id, a.subject_id, a.teacher_id, problem.teachers[expected].id
                    ),
                ));
            }
        }
    }

    for (t, teacher) in problem.teachers.iter().enumerate() {
        for day in 0..days {
            let load = day_load[t * days + day];
            if load > teacher.max_per_day {
                violations.push(Violation::new(
                    ViolationKind::DailyCap,
                    format!(
                        "Teacher '{}' has {} hours on day {} (maxHoursPerDay {})",
                        teacher.id, load, day, teacher.max_per_day
                    ),
                ));
            }
        }
        if week_load[t] > teacher.max_per_week {
            violations.push(Violation::new(
                ViolationKind::WeeklyCap,
                format!(
                    "Teacher '{}' has {} hours in the week (maxHoursPerWeek {})",
                    teacher.id, week_load[t], teacher.max_per_week
                ),
            ));
        }
    }

    for group in &problem.groups {
        let got = covered
            .remove(&(group.class, group.subject_id.as_str()))
            .unwrap_or(0);
        if got != group.hours {
            violations.push(Violation::new(
                ViolationKind::Coverage,
                format!(
                    "Class '{}' has {} of {} required hours of '{}'",
                    problem.classes[group.class].id, got, group.hours, group.subject_id
                ),
            ));
        }
    }
    for ((class, subject), got) in covered {
        violations.push(Violation::new(
            ViolationKind::Coverage,
            format!(
                "Class '{}' has {} unrequested hour(s) of '{}'",
                problem.classes[class].id, got, subject
            ),
        ));
    }

    violations
}
