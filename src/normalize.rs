//! Input validation and indexing.
//!
//! Turns the raw snapshot into a [`Problem`]: dense indices for classes and
//! teachers, per-teacher slot masks, loads already committed by fixed slots,
//! and the remaining demand per (class, subject) requirement. Every problem in
//! the snapshot is reported, not just the first one.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::data::{ClassId, SchedulingInput, Slot, Subject, SubjectId, TeacherId};
use crate::error::{SolveError, ValidationError, ValidationErrorKind as Kind};
use crate::model::{Grid, MAX_DAYS, MAX_PERIODS};

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: Option<String>,
}

impl ClassInfo {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct TeacherInfo {
    pub id: TeacherId,
    pub name: Option<String>,
    pub max_per_day: u32,
    pub max_per_week: u32,
    /// Indexed by slot.
    pub unavailable: Vec<bool>,
    pub preferred: Vec<bool>,
    /// Slots taken by fixed slots.
    pub committed: Vec<bool>,
    /// Fixed-slot hours per day.
    pub day_load: Vec<u32>,
    pub week_load: u32,
}

impl TeacherInfo {
    pub fn has_preferences(&self) -> bool {
        self.preferred.contains(&true)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Remaining hours of one (class, subject, teacher) requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandGroup {
    pub class: usize,
    pub teacher: usize,
    pub subject_id: SubjectId,
    pub hours: u32,
}

/// One unscheduled hour of a demand group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    pub group: usize,
    pub unit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPlacement {
    pub class: usize,
    pub teacher: usize,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub grid: Grid,
    pub classes: Vec<ClassInfo>,
    pub teachers: Vec<TeacherInfo>,
    /// Sorted by class index, then subject id.
    pub groups: Vec<DemandGroup>,
    pub fixed: Vec<FixedPlacement>,
}

impl Problem {
    /// Expands the demand groups into one entry per required hour.
    pub fn demands(&self) -> Vec<Demand> {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(group, g)| (0..g.hours).map(move |unit| Demand { group, unit }))
            .collect()
    }

    pub fn total_hours(&self) -> u32 {
        self.groups.iter().map(|g| g.hours).sum()
    }

    #[cfg(test)]
    pub fn group_index(&self, class_id: &str, subject_id: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| self.classes[g.class].id == class_id && g.subject_id == subject_id)
    }

    pub fn teacher_groups(&self, teacher: usize) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.teacher == teacher)
            .map(|(i, _)| i)
    }

    pub fn class_groups(&self, class: usize) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.class == class)
            .map(|(i, _)| i)
    }
}

/// Validates `input` against `grid` and builds the search problem.
pub fn normalize(input: &SchedulingInput, grid: Grid) -> Result<Problem, SolveError> {
    if !grid.is_valid() {
        return Err(SolveError::Validation(vec![ValidationError::new(
            Kind::InvalidGrid,
            format!(
                "grid must have 1..={MAX_DAYS} days and 1..={MAX_PERIODS} periods, got {} x {}",
                grid.days, grid.periods
            ),
        )]));
    }

    let mut errors = Vec::new();
    let slots = grid.slot_count();

    // subject catalog
    let mut catalog: BTreeMap<&str, &Subject> = BTreeMap::new();
    for subject in &input.subjects {
        if catalog.insert(subject.id.as_str(), subject).is_some() {
            errors.push(ValidationError::new(
                Kind::DuplicateId,
                format!("Duplicate subject ID: {}", subject.id),
            ));
        }
        if let Some(hours) = subject.hours_per_week {
            if hours <= 0 {
                errors.push(ValidationError::new(
                    Kind::NonPositiveHours,
                    format!("Subject '{}' has hoursPerWeek {}", subject.id, hours),
                ));
            }
        }
    }

    // teachers
    let mut teacher_index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut teachers = Vec::with_capacity(input.teachers.len());
    let mut qualified: Vec<BTreeSet<&str>> = Vec::with_capacity(input.teachers.len());
    for teacher in &input.teachers {
        if teacher_index.contains_key(teacher.id.as_str()) {
            errors.push(ValidationError::new(
                Kind::DuplicateId,
                format!("Duplicate teacher ID: {}", teacher.id),
            ));
            continue;
        }
        teacher_index.insert(teacher.id.as_str(), teachers.len());

        let max_per_day = hour_cap(
            teacher.max_hours_per_day,
            grid.periods,
            &teacher.id,
            "maxHoursPerDay",
            &mut errors,
        );
        let max_per_week = hour_cap(
            teacher.max_hours_per_week,
            slots as u32,
            &teacher.id,
            "maxHoursPerWeek",
            &mut errors,
        );
        let unavailable = slot_mask(
            &teacher.unavailable_slots,
            grid,
            &teacher.id,
            "unavailableSlots",
            &mut errors,
        );
        let preferred = slot_mask(
            &teacher.preferred_slots,
            grid,
            &teacher.id,
            "preferredSlots",
            &mut errors,
        );

        let overlap = (0..slots).filter(|&s| unavailable[s] && preferred[s]).count();
        if overlap > 0 {
            warn!(
                "Teacher {} lists {} slot(s) as both unavailable and preferred; unavailability wins.",
                teacher.id, overlap
            );
        }

        qualified.push(teacher.subjects_can_teach.iter().map(String::as_str).collect());
        teachers.push(TeacherInfo {
            id: teacher.id.clone(),
            name: teacher.name.clone(),
            max_per_day,
            max_per_week,
            unavailable,
            preferred,
            committed: vec![false; slots],
            day_load: vec![0; grid.days as usize],
            week_load: 0,
        });
    }

    // classes and their requirement rows
    let mut class_index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut classes = Vec::with_capacity(input.classes.len());
    let mut requirements: Vec<(usize, usize, &str, u32)> = Vec::new();
    let mut known_subjects: BTreeSet<&str> = catalog.keys().copied().collect();
    for class in &input.classes {
        if class_index.contains_key(class.id.as_str()) {
            errors.push(ValidationError::new(
                Kind::DuplicateId,
                format!("Duplicate class ID: {}", class.id),
            ));
            continue;
        }
        let c = classes.len();
        class_index.insert(class.id.as_str(), c);
        classes.push(ClassInfo {
            id: class.id.clone(),
            name: class.name.clone(),
        });

        let mut seen = BTreeSet::new();
        for req in &class.subjects {
            let subject_id = req.subject_id.as_str();
            if !seen.insert(subject_id) {
                errors.push(ValidationError::new(
                    Kind::DuplicateSubject,
                    format!(
                        "Class '{}' lists subject '{}' more than once",
                        class.id,
                        req.subject_name.as_deref().unwrap_or(subject_id)
                    ),
                ));
                continue;
            }

            let subject = catalog.get(subject_id).copied();
            if subject.is_none() && !catalog.is_empty() {
                errors.push(ValidationError::new(
                    Kind::UnknownReference,
                    format!("Class '{}' references unknown subject '{}'", class.id, subject_id),
                ));
                continue;
            }
            known_subjects.insert(subject_id);

            let Some(&t) = teacher_index.get(req.teacher_id.as_str()) else {
                errors.push(ValidationError::new(
                    Kind::UnknownReference,
                    format!(
                        "Class '{}' references unknown teacher '{}' for subject '{}'",
                        class.id, req.teacher_id, subject_id
                    ),
                ));
                continue;
            };
            if !qualified[t].contains(subject_id) {
                errors.push(ValidationError::new(
                    Kind::TeacherNotQualified,
                    format!(
                        "Teacher '{}' is not listed as able to teach '{}' (class '{}')",
                        req.teacher_id, subject_id, class.id
                    ),
                ));
            }

            let catalog_hours = subject.and_then(|s| s.hours_per_week);
            let hours = match req.hours_per_week.or(catalog_hours) {
                Some(h) if h as i64 > slots as i64 => {
                    errors.push(ValidationError::new(
                        Kind::HoursExceedGrid,
                        format!(
                            "Class '{}' requires {} hours of '{}' but the grid has only {} slots",
                            class.id, h, subject_id, slots
                        ),
                    ));
                    continue;
                }
                Some(h) if h > 0 => h as u32,
                Some(h) => {
                    errors.push(ValidationError::new(
                        Kind::NonPositiveHours,
                        format!(
                            "Class '{}' requires {} hours of '{}'; hoursPerWeek must be positive",
                            class.id, h, subject_id
                        ),
                    ));
                    continue;
                }
                None => {
                    errors.push(ValidationError::new(
                        Kind::NonPositiveHours,
                        format!("Class '{}' gives no hoursPerWeek for '{}'", class.id, subject_id),
                    ));
                    continue;
                }
            };
            if let (Some(subject), Some(target)) = (subject, catalog_hours) {
                if target != hours as i32 {
                    debug!(
                        "Class {} schedules {} hours of {} against a catalog target of {}.",
                        class.id,
                        hours,
                        subject.name.as_deref().unwrap_or(subject_id),
                        target
                    );
                }
            }
            requirements.push((c, t, subject_id, hours));
        }
    }

    // fixed slots
    let mut class_taken = vec![false; classes.len() * slots];
    let mut fixed = Vec::with_capacity(input.fixed_slots.len());
    let mut fixed_hours: BTreeMap<(usize, &str), u32> = BTreeMap::new();
    for pinned in &input.fixed_slots {
        let class = class_index.get(pinned.class_id.as_str()).copied();
        let teacher = teacher_index.get(pinned.teacher_id.as_str()).copied();
        let index = grid.index(pinned.slot());
        if class.is_none() {
            errors.push(ValidationError::new(
                Kind::UnknownReference,
                format!("Fixed slot references unknown class '{}'", pinned.class_id),
            ));
        }
        if teacher.is_none() {
            errors.push(ValidationError::new(
                Kind::UnknownReference,
                format!("Fixed slot references unknown teacher '{}'", pinned.teacher_id),
            ));
        }
        if !known_subjects.contains(pinned.subject_id.as_str()) {
            errors.push(ValidationError::new(
                Kind::UnknownReference,
                format!("Fixed slot references unknown subject '{}'", pinned.subject_id),
            ));
        }
        if index.is_none() {
            errors.push(ValidationError::new(
                Kind::SlotOutOfRange,
                format!(
                    "Fixed slot for class '{}' at {} lies outside the {} x {} grid",
                    pinned.class_id,
                    pinned.slot(),
                    grid.days,
                    grid.periods
                ),
            ));
        }
        let (Some(c), Some(t), Some(s)) = (class, teacher, index) else {
            continue;
        };
        let subject_id = pinned.subject_id.as_str();
        let required = requirements.iter().any(|&(rc, _, rs, _)| rc == c && rs == subject_id);
        if !required && known_subjects.contains(subject_id) {
            errors.push(ValidationError::new(
                Kind::UnknownReference,
                format!(
                    "Fixed slot at {} gives class '{}' subject '{}', which the class does not require",
                    pinned.slot(),
                    pinned.class_id,
                    subject_id
                ),
            ));
            continue;
        }
        if !qualified[t].contains(subject_id) {
            errors.push(ValidationError::new(
                Kind::TeacherNotQualified,
                format!(
                    "Fixed slot at {} has teacher '{}' teaching '{}', which they are not listed for",
                    pinned.slot(),
                    pinned.teacher_id,
                    subject_id
                ),
            ));
            continue;
        }

        if class_taken[c * slots + s] {
            errors.push(ValidationError::new(
                Kind::FixedSlotConflict,
                format!("Class '{}' has two fixed slots at {}", pinned.class_id, pinned.slot()),
            ));
            continue;
        }
        let info = &mut teachers[t];
        if info.committed[s] {
            errors.push(ValidationError::new(
                Kind::FixedSlotConflict,
                format!(
                    "Teacher '{}' is fixed into two classes at {}",
                    pinned.teacher_id,
                    pinned.slot()
                ),
            ));
            continue;
        }
        if info.unavailable[s] {
            warn!(
                "Fixed slot pins teacher {} at {} although they are marked unavailable.",
                pinned.teacher_id,
                pinned.slot()
            );
        }

        class_taken[c * slots + s] = true;
        info.committed[s] = true;
        info.day_load[grid.day_of(s)] += 1;
        info.week_load += 1;
        *fixed_hours.entry((c, subject_id)).or_default() += 1;
        fixed.push(FixedPlacement {
            class: c,
            teacher: t,
            slot: s,
        });
    }

    for teacher in &teachers {
        for (day, &load) in teacher.day_load.iter().enumerate() {
            if load > teacher.max_per_day {
                errors.push(ValidationError::new(
                    Kind::FixedExceedsCap,
                    format!(
                        "Fixed slots give teacher '{}' {} hours on day {} (maxHoursPerDay {})",
                        teacher.id, load, day, teacher.max_per_day
                    ),
                ));
            }
        }
        if teacher.week_load > teacher.max_per_week {
            errors.push(ValidationError::new(
                Kind::FixedExceedsCap,
                format!(
                    "Fixed slots give teacher '{}' {} hours in the week (maxHoursPerWeek {})",
                    teacher.id, teacher.week_load, teacher.max_per_week
                ),
            ));
        }
    }

    let mut groups = Vec::with_capacity(requirements.len());
    for (class, teacher, subject_id, hours) in requirements {
        let covered = fixed_hours.get(&(class, subject_id)).copied().unwrap_or(0);
        if covered > hours {
            errors.push(ValidationError::new(
                Kind::FixedExceedsDemand,
                format!(
                    "Class '{}' has {} fixed hours of '{}' but only requires {}",
                    classes[class].id, covered, subject_id, hours
                ),
            ));
            continue;
        }
        if covered < hours {
            groups.push(DemandGroup {
                class,
                teacher,
                subject_id: subject_id.to_string(),
                hours: hours - covered,
            });
        }
    }
    groups.sort_by(|a, b| (a.class, &a.subject_id).cmp(&(b.class, &b.subject_id)));

    if !errors.is_empty() {
        warn!("Snapshot rejected with {} validation problem(s).", errors.len());
        return Err(SolveError::Validation(errors));
    }

    let problem = Problem {
        grid,
        classes,
        teachers,
        groups,
        fixed,
    };
    info!(
        "Normalized snapshot: {} classes, {} teachers, {} demand groups ({} hours), {} fixed slots on a {} x {} grid.",
        problem.classes.len(),
        problem.teachers.len(),
        problem.groups.len(),
        problem.total_hours(),
        problem.fixed.len(),
        grid.days,
        grid.periods
    );
    Ok(problem)
}

fn hour_cap(
    value: Option<i32>,
    default: u32,
    teacher: &str,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> u32 {
    match value {
        None => default,
        Some(v) if v > 0 => v as u32,
        Some(v) => {
            errors.push(ValidationError::new(
                Kind::NonPositiveCap,
                format!("Teacher '{teacher}' has {field} {v}; caps must be positive"),
            ));
            default
        }
    }
}

fn slot_mask(
    list: &[Slot],
    grid: Grid,
    teacher: &str,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> Vec<bool> {
    let mut mask = vec![false; grid.slot_count()];
    for &slot in list {
        match grid.index(slot) {
            Some(i) => mask[i] = true,
            None => errors.push(ValidationError::new(
                Kind::SlotOutOfRange,
                format!("Teacher '{teacher}' {field} entry {slot} lies outside the grid"),
            )),
        }
    }
    mask
}
