//! Snapshot builders shared by the unit tests.

use crate::data::{Class, FixedSlot, SchedulingInput, Slot, SolveOptions, SubjectRequirement, Teacher};

pub fn class(id: &str, rows: &[(&str, &str, i32)]) -> Class {
    Class {
        id: id.to_string(),
        name: None,
        subjects: rows
            .iter()
            .map(|(subject, teacher, hours)| SubjectRequirement {
                subject_id: subject.to_string(),
                subject_name: None,
                teacher_id: teacher.to_string(),
                hours_per_week: Some(*hours),
            })
            .collect(),
    }
}

pub fn teacher(id: &str, subjects: &[&str]) -> Teacher {
    Teacher {
        id: id.to_string(),
        name: None,
        subjects_can_teach: subjects.iter().map(|s| s.to_string()).collect(),
        unavailable_slots: Vec::new(),
        preferred_slots: Vec::new(),
        max_hours_per_day: None,
        max_hours_per_week: None,
    }
}

pub fn fixed(class: &str, day: u32, period: u32, subject: &str, teacher: &str) -> FixedSlot {
    FixedSlot {
        class_id: class.to_string(),
        day,
        period,
        subject_id: subject.to_string(),
        teacher_id: teacher.to_string(),
    }
}

pub fn slots(pairs: &[(u32, u32)]) -> Vec<Slot> {
    pairs.iter().map(|&(day, period)| Slot::new(day, period)).collect()
}

pub fn input(classes: Vec<Class>, teachers: Vec<Teacher>) -> SchedulingInput {
    SchedulingInput {
        classes,
        teachers,
        subjects: Vec::new(),
        fixed_slots: Vec::new(),
        days: None,
        periods_per_day: None,
        options: SolveOptions::default(),
    }
}
