//! Weekly grid and the mutable partial timetable the engine searches over.
//!
//! Slots are dense indices `day * periods + period`, so iterating indices in
//! ascending order visits the week in (day, period) order.

use itertools::Itertools;
use std::cmp::Reverse;

use crate::data::{BlockReason, Slot};
use crate::normalize::Problem;

pub const MAX_DAYS: u32 = 7;
pub const MAX_PERIODS: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub days: u32,
    pub periods: u32,
}

impl Grid {
    pub fn new(days: u32, periods: u32) -> Self {
        Self { days, periods }
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_DAYS).contains(&self.days) && (1..=MAX_PERIODS).contains(&self.periods)
    }

    pub fn slot_count(&self) -> usize {
        (self.days * self.periods) as usize
    }

    pub fn index(&self, slot: Slot) -> Option<usize> {
        if slot.day < self.days && slot.period < self.periods {
            Some((slot.day * self.periods + slot.period) as usize)
        } else {
            None
        }
    }

    pub fn slot(&self, index: usize) -> Slot {
        let index = index as u32;
        Slot::new(index / self.periods, index % self.periods)
    }

    pub fn day_of(&self, index: usize) -> usize {
        index / self.periods as usize
    }
}

/// Contents of one (class, day, period) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Free,
    Fixed,
    /// Index into `Problem::groups`.
    Placed(usize),
}

/// Partial assignment over `days × periods × classes`, seeded with fixed slots.
///
/// Every state reachable through [`Timetable::place`] satisfies the hard
/// constraints: one lesson per class cell, one class per teacher slot, and
/// the teacher's daily and weekly caps.
#[derive(Debug, Clone)]
pub struct Timetable<'p> {
    problem: &'p Problem,
    cells: Vec<Cell>,
    teacher_busy: Vec<bool>,
    day_load: Vec<u32>,
    week_load: Vec<u32>,
    placed: usize,
}

impl<'p> Timetable<'p> {
    pub fn new(problem: &'p Problem) -> Self {
        let slots = problem.grid.slot_count();
        let days = problem.grid.days as usize;

        let mut cells = vec![Cell::Free; problem.classes.len() * slots];
        for fixed in &problem.fixed {
            cells[fixed.class * slots + fixed.slot] = Cell::Fixed;
        }

        let mut teacher_busy = vec![false; problem.teachers.len() * slots];
        let mut day_load = vec![0; problem.teachers.len() * days];
        let mut week_load = Vec::with_capacity(problem.teachers.len());
        for (t, teacher) in problem.teachers.iter().enumerate() {
            teacher_busy[t * slots..(t + 1) * slots].copy_from_slice(&teacher.committed);
            day_load[t * days..(t + 1) * days].copy_from_slice(&teacher.day_load);
            week_load.push(teacher.week_load);
        }

        Self {
            problem,
            cells,
            teacher_busy,
            day_load,
            week_load,
            placed: 0,
        }
    }

    /// Number of engine placements (fixed slots excluded).
    pub fn placed(&self) -> usize {
        self.placed
    }

    pub fn cell(&self, class: usize, slot: usize) -> Cell {
        self.cells[class * self.problem.grid.slot_count() + slot]
    }

    /// Checks whether one hour of `group` may go into `slot`.
    ///
    /// Returns the first hard constraint the placement would break.
    pub fn check(&self, group: usize, slot: usize) -> Result<(), BlockReason> {
        let grid = self.problem.grid;
        let demand = &self.problem.groups[group];
        let teacher = &self.problem.teachers[demand.teacher];
        let slots = grid.slot_count();

        if self.cells[demand.class * slots + slot] != Cell::Free {
            return Err(BlockReason::ClassFull);
        }
        if teacher.unavailable[slot] {
            return Err(BlockReason::TeacherUnavailable);
        }
        if self.teacher_busy[demand.teacher * slots + slot] {
            return Err(BlockReason::TeacherBusy);
        }
        let day = demand.teacher * grid.days as usize + grid.day_of(slot);
        if self.day_load[day] >= teacher.max_per_day {
            return Err(BlockReason::DailyCap);
        }
        if self.week_load[demand.teacher] >= teacher.max_per_week {
            return Err(BlockReason::WeeklyCap);
        }
        Ok(())
    }

    pub fn place(&mut self, group: usize, slot: usize) {
        debug_assert!(self.check(group, slot).is_ok());
        let grid = self.problem.grid;
        let slots = grid.slot_count();
        let demand = &self.problem.groups[group];

        self.cells[demand.class * slots + slot] = Cell::Placed(group);
        self.teacher_busy[demand.teacher * slots + slot] = true;
        self.day_load[demand.teacher * grid.days as usize + grid.day_of(slot)] += 1;
        self.week_load[demand.teacher] += 1;
        self.placed += 1;
    }

    pub fn unplace(&mut self, group: usize, slot: usize) {
        let grid = self.problem.grid;
        let slots = grid.slot_count();
        let demand = &self.problem.groups[group];
        let cell = &mut self.cells[demand.class * slots + slot];
        debug_assert_eq!(*cell, Cell::Placed(group), "unplace of a cell the group does not hold");

        *cell = Cell::Free;
        self.teacher_busy[demand.teacher * slots + slot] = false;
        self.day_load[demand.teacher * grid.days as usize + grid.day_of(slot)] -= 1;
        self.week_load[demand.teacher] -= 1;
        self.placed -= 1;
    }

    pub fn admissible(&self, group: usize) -> Vec<usize> {
        (0..self.problem.grid.slot_count())
            .filter(|&slot| self.check(group, slot).is_ok())
            .collect()
    }

    /// Explains why `group` cannot receive `needed` more hours in this state.
    pub fn blocking_reason(&self, group: usize, needed: u32) -> BlockReason {
        let mut open = 0u32;
        let mut reasons = Vec::new();
        for slot in 0..self.problem.grid.slot_count() {
            match self.check(group, slot) {
                Ok(()) => open += 1,
                Err(reason) => reasons.push(reason),
            }
        }
        if open >= needed {
            return BlockReason::SearchExhausted;
        }
        if reasons.contains(&BlockReason::WeeklyCap) {
            return BlockReason::WeeklyCap;
        }
        reasons
            .into_iter()
            .counts()
            .into_iter()
            .max_by_key(|&(reason, count)| (count, Reverse(reason)))
            .map(|(reason, _)| reason)
            .unwrap_or(BlockReason::SearchExhausted)
    }

    /// Engine placements as `(group, slot)`, in class then slot order.
    pub fn placements(&self) -> Vec<(usize, usize)> {
        let slots = self.problem.grid.slot_count();
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| match cell {
                Cell::Placed(group) => Some((*group, i % slots)),
                _ => None,
            })
            .collect()
    }
}
