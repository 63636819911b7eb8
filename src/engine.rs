//! Backtracking search that fills the free cells of a [`Timetable`].
//!
//! Demand groups are branched on most-constrained-first: the group with the
//! least slack between admissible slots and remaining hours is expanded next.
//! Candidates come from a static per-group order (the teacher's preferred
//! slots first, slots other teachers of the class prefer last), and the hours
//! of one group take strictly increasing ranks in that order so
//! interchangeable hours are never permuted against each other.

use log::{info, trace, warn};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::SearchLimits;
use crate::data::{Assignment, BlockReason, SearchStats};
use crate::error::SolveError;
use crate::model::{Cell, Timetable};
use crate::normalize::Problem;
use crate::serialize;

/// Loop iterations between wall-clock checks.
const CLOCK_INTERVAL: u64 = 256;

/// A complete placement of every demanded hour, as `(group, slot)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub placements: Vec<(usize, usize)>,
    pub stats: SearchStats,
}

/// A demand group the engine could not finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    pub group: usize,
    pub remaining: u32,
    pub reason: BlockReason,
    pub detail: String,
}

enum Selection {
    Complete,
    DeadEnd(usize),
    Branch(usize, Vec<usize>),
}

struct Frame {
    group: usize,
    /// Ranks into the group's candidate order, still to be tried.
    candidates: Vec<usize>,
    next: usize,
    placed: Option<usize>,
}

pub struct Engine<'p> {
    problem: &'p Problem,
    limits: SearchLimits,
    table: Timetable<'p>,
    orders: Vec<Vec<usize>>,
    /// Ranks taken by the placed hours of each group, ascending.
    ranks: Vec<Vec<usize>>,
    stats: SearchStats,
}

impl<'p> Engine<'p> {
    pub fn new(problem: &'p Problem, limits: SearchLimits) -> Self {
        let orders = (0..problem.groups.len())
            .map(|g| candidate_order(problem, g))
            .collect();
        Self {
            problem,
            limits,
            table: Timetable::new(problem),
            orders,
            ranks: vec![Vec::new(); problem.groups.len()],
            stats: SearchStats::default(),
        }
    }

    pub fn run(mut self) -> Result<Solution, SolveError> {
        let start = Instant::now();

        let blocked = self.preflight();
        if !blocked.is_empty() {
            warn!(
                "Preflight proved {} demand group(s) unplaceable; skipping search.",
                blocked.len()
            );
            return Err(SolveError::Unsatisfiable {
                unplaced: serialize::unplaced(self.problem, &blocked),
                partial: self.limits.best_effort.then(Vec::new),
                stats: self.stats,
            });
        }

        info!(
            "Starting backtracking search over {} demand entries in {} groups...",
            self.problem.demands().len(),
            self.problem.groups.len()
        );

        let mut stack: Vec<Frame> = Vec::new();
        let mut deepest: Vec<(usize, usize)> = Vec::new();
        let mut ticks = 0u64;
        let mut descend = true;

        loop {
            if descend {
                if self.table.placed() > deepest.len() {
                    deepest = self.table.placements();
                }
                match self.select() {
                    Selection::Complete => {
                        self.stats.elapsed_ms = start.elapsed().as_millis() as u64;
                        info!(
                            "Search complete in {:.2?}: {} nodes, {} backtracks.",
                            start.elapsed(),
                            self.stats.nodes,
                            self.stats.backtracks
                        );
                        return Ok(Solution {
                            placements: self.table.placements(),
                            stats: self.stats,
                        });
                    }
                    Selection::DeadEnd(group) => {
                        trace!(
                            "Dead end at depth {}: group {} has too few admissible slots.",
                            stack.len(),
                            group
                        );
                    }
                    Selection::Branch(group, candidates) => stack.push(Frame {
                        group,
                        candidates,
                        next: 0,
                        placed: None,
                    }),
                }
            }

            let Some(frame) = stack.last_mut() else {
                self.stats.elapsed_ms = start.elapsed().as_millis() as u64;
                let blocked = self.blocked_in(&deepest);
                warn!(
                    "Search space exhausted after {} nodes; {} group(s) left unplaced.",
                    self.stats.nodes,
                    blocked.len()
                );
                return Err(SolveError::Unsatisfiable {
                    unplaced: serialize::unplaced(self.problem, &blocked),
                    partial: self.partial(&deepest),
                    stats: self.stats,
                });
            };

            if let Some(rank) = frame.placed.take() {
                self.table.unplace(frame.group, self.orders[frame.group][rank]);
                self.ranks[frame.group].pop();
                self.stats.backtracks += 1;
            }

            if frame.next < frame.candidates.len() {
                let rank = frame.candidates[frame.next];
                frame.next += 1;
                self.table.place(frame.group, self.orders[frame.group][rank]);
                self.ranks[frame.group].push(rank);
                frame.placed = Some(rank);
                self.stats.nodes += 1;
                descend = true;
            } else {
                stack.pop();
                descend = false;
            }

            ticks += 1;
            let out_of_time =
                ticks % CLOCK_INTERVAL == 0 && start.elapsed() > self.limits.time_limit;
            if self.stats.backtracks > self.limits.max_backtracks || out_of_time {
                self.stats.elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(
                    "Search budget exhausted ({} backtracks, {:.2?}).",
                    self.stats.backtracks,
                    start.elapsed()
                );
                let blocked = self.blocked_in(&deepest);
                return Err(SolveError::BudgetExceeded {
                    unplaced: serialize::unplaced(self.problem, &blocked),
                    partial: self.partial(&deepest),
                    stats: self.stats,
                });
            }
        }
    }

    fn remaining(&self, group: usize) -> usize {
        self.problem.groups[group].hours as usize - self.ranks[group].len()
    }

    /// Ranks still open to the next hour of `group` in the current state.
    fn open_ranks(&self, group: usize) -> Vec<usize> {
        let order = &self.orders[group];
        let first = self.ranks[group].last().map_or(0, |r| r + 1);
        (first..order.len())
            .filter(|&r| self.table.check(group, order[r]).is_ok())
            .collect()
    }

    fn select(&self) -> Selection {
        let mut best: Option<((usize, usize, usize), Vec<usize>)> = None;
        for group in 0..self.problem.groups.len() {
            let remaining = self.remaining(group);
            if remaining == 0 {
                continue;
            }
            let open = self.open_ranks(group);
            if open.len() < remaining {
                return Selection::DeadEnd(group);
            }
            let key = (open.len() - remaining, open.len(), group);
            if best.as_ref().is_none_or(|(k, _)| key < *k) {
                best = Some((key, open));
            }
        }

        match best {
            None => Selection::Complete,
            Some(((_, _, group), mut open)) => {
                // later hours of the group need ranks above this one
                let keep = open.len() + 1 - self.remaining(group);
                open.truncate(keep);
                Selection::Branch(group, open)
            }
        }
    }

    /// Cheap necessary conditions checked before any search.
    fn preflight(&self) -> Vec<Blocked> {
        let problem = self.problem;
        let grid = problem.grid;
        let slots = grid.slot_count();
        let periods = grid.periods as usize;
        let mut blocked: BTreeMap<usize, Blocked> = BTreeMap::new();

        for (g, group) in problem.groups.iter().enumerate() {
            let open = self.table.admissible(g).len() as u32;
            if open < group.hours {
                blocked.insert(
                    g,
                    Blocked {
                        group: g,
                        remaining: group.hours,
                        reason: self.table.blocking_reason(g, group.hours),
                        detail: format!(
                            "only {} admissible slot(s) for {} required hour(s)",
                            open, group.hours
                        ),
                    },
                );
            }
        }

        for (t, teacher) in problem.teachers.iter().enumerate() {
            let groups: Vec<usize> = problem.teacher_groups(t).collect();
            if groups.is_empty() {
                continue;
            }
            let demand: u32 = groups.iter().map(|&g| problem.groups[g].hours).sum();
            let open = |s: usize| !teacher.unavailable[s] && !teacher.committed[s];
            let free = (0..slots).filter(|&s| open(s)).count() as u32;
            let week_room = teacher.max_per_week.saturating_sub(teacher.week_load);
            let day_room: u32 = (0..grid.days as usize)
                .map(|d| {
                    let free_today = (d * periods..(d + 1) * periods).filter(|&s| open(s)).count() as u32;
                    free_today.min(teacher.max_per_day.saturating_sub(teacher.day_load[d]))
                })
                .sum();

            let verdict = if demand > week_room {
                Some((
                    BlockReason::WeeklyCap,
                    format!(
                        "teacher '{}' needs {} more hour(s) but only {} remain under maxHoursPerWeek {}",
                        teacher.label(),
                        demand,
                        week_room,
                        teacher.max_per_week
                    ),
                ))
            } else if demand > free {
                Some((
                    BlockReason::TeacherOverbooked,
                    format!(
                        "teacher '{}' has {} free slot(s) for {} demanded hour(s)",
                        teacher.label(),
                        free,
                        demand
                    ),
                ))
            } else if demand > day_room {
                Some((
                    BlockReason::DailyCap,
                    format!(
                        "teacher '{}' can take at most {} hour(s) across the week under maxHoursPerDay {}, {} demanded",
                        teacher.label(),
                        day_room,
                        teacher.max_per_day,
                        demand
                    ),
                ))
            } else {
                None
            };

            if let Some((reason, detail)) = verdict {
                for g in groups {
                    blocked.entry(g).or_insert_with(|| Blocked {
                        group: g,
                        remaining: problem.groups[g].hours,
                        reason,
                        detail: detail.clone(),
                    });
                }
            }
        }

        for (c, class) in problem.classes.iter().enumerate() {
            let groups: Vec<usize> = problem.class_groups(c).collect();
            let demand: u32 = groups.iter().map(|&g| problem.groups[g].hours).sum();
            let free = (0..slots)
                .filter(|&s| self.table.cell(c, s) == Cell::Free)
                .count() as u32;
            if demand > free {
                for g in groups {
                    blocked.entry(g).or_insert_with(|| Blocked {
                        group: g,
                        remaining: problem.groups[g].hours,
                        reason: BlockReason::ClassOverbooked,
                        detail: format!(
                            "class '{}' has {} free cell(s) for {} demanded hour(s)",
                            class.label(),
                            free,
                            demand
                        ),
                    });
                }
            }
        }

        blocked.into_values().collect()
    }

    /// Groups left unfinished by `placements`, with the reason they stalled.
    fn blocked_in(&self, placements: &[(usize, usize)]) -> Vec<Blocked> {
        let mut table = Timetable::new(self.problem);
        let mut placed = vec![0u32; self.problem.groups.len()];
        for &(group, slot) in placements {
            table.place(group, slot);
            placed[group] += 1;
        }

        self.problem
            .groups
            .iter()
            .enumerate()
            .filter(|(g, group)| placed[*g] < group.hours)
            .map(|(g, group)| {
                let remaining = group.hours - placed[g];
                let reason = table.blocking_reason(g, remaining);
                let teacher = &self.problem.teachers[group.teacher];
                Blocked {
                    group: g,
                    remaining,
                    reason,
                    detail: format!("{} (teacher '{}')", reason, teacher.label()),
                }
            })
            .collect()
    }

    fn partial(&self, placements: &[(usize, usize)]) -> Option<Vec<Assignment>> {
        self.limits
            .best_effort
            .then(|| serialize::assignments(self.problem, placements))
    }
}

/// The teacher's preferred slots first, then slots no other teacher of the
/// class prefers, then the rest; each part in (day, period) order.
fn candidate_order(problem: &Problem, group: usize) -> Vec<usize> {
    let demand = &problem.groups[group];
    let own = &problem.teachers[demand.teacher];
    let contested = |slot: usize| {
        problem.class_groups(demand.class).any(|g| {
            let other = problem.groups[g].teacher;
            other != demand.teacher && problem.teachers[other].preferred[slot]
        })
    };
    let mut order: Vec<usize> = (0..problem.grid.slot_count()).collect();
    order.sort_by_key(|&s| (!own.preferred[s], contested(s), s));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Slot;
    use crate::model::Grid;
    use crate::normalize::normalize;
    use crate::testing::{class, fixed, input, slots, teacher};
    use std::time::Duration;

    fn limits() -> SearchLimits {
        SearchLimits {
            max_backtracks: 100_000,
            time_limit: Duration::from_secs(10),
            best_effort: false,
        }
    }

    fn slot_of(problem: &Problem, index: usize) -> Slot {
        problem.grid.slot(index)
    }

    #[test]
    fn places_every_hour_without_collisions() {
        let snapshot = input(
            vec![class("c1", &[("math", "t1", 2), ("art", "t2", 2)])],
            vec![teacher("t1", &["math"]), teacher("t2", &["art"])],
        );
        let problem = normalize(&snapshot, Grid::new(5, 2)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();

        assert_eq!(solution.placements.len(), 4);
        for g in 0..problem.groups.len() {
            assert_eq!(solution.placements.iter().filter(|(pg, _)| *pg == g).count(), 2);
        }
        let mut used: Vec<usize> = solution.placements.iter().map(|(_, s)| *s).collect();
        used.sort();
        used.dedup();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let snapshot = input(
            vec![
                class("c1", &[("math", "t1", 3), ("art", "t2", 2)]),
                class("c2", &[("math", "t1", 3), ("bio", "t3", 2)]),
            ],
            vec![teacher("t1", &["math"]), teacher("t2", &["art"]), teacher("t3", &["bio"])],
        );
        let problem = normalize(&snapshot, Grid::new(5, 2)).unwrap();
        let first = Engine::new(&problem, limits()).run().unwrap();
        let second = Engine::new(&problem, limits()).run().unwrap();
        assert_eq!(first.placements, second.placements);
    }

    #[test]
    fn preferred_slots_take_all_hours_when_they_fit() {
        let mut t1 = teacher("t1", &["math"]);
        t1.preferred_slots = slots(&[(1, 1), (3, 0), (4, 1)]);
        let snapshot = input(
            vec![class("c1", &[("math", "t1", 3), ("art", "t2", 2)])],
            vec![t1, teacher("t2", &["art"])],
        );
        let problem = normalize(&snapshot, Grid::new(5, 2)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();
        let math = problem.group_index("c1", "math").unwrap();

        let mut placed: Vec<Slot> = solution
            .placements
            .iter()
            .filter(|(g, _)| *g == math)
            .map(|&(_, s)| slot_of(&problem, s))
            .collect();
        placed.sort();
        assert_eq!(placed, slots(&[(1, 1), (3, 0), (4, 1)]));
    }

    #[test]
    fn daily_cap_spreads_hours_across_days() {
        let mut t1 = teacher("t1", &["math"]);
        t1.max_hours_per_day = Some(1);
        let snapshot = input(vec![class("c1", &[("math", "t1", 3)])], vec![t1]);
        let problem = normalize(&snapshot, Grid::new(5, 4)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();

        let mut days: Vec<u32> = solution
            .placements
            .iter()
            .map(|&(_, s)| slot_of(&problem, s).day)
            .collect();
        days.dedup();
        assert_eq!(days, vec![0, 1, 2]);
    }

    #[test]
    fn fixed_cells_are_never_reused() {
        let mut snapshot = input(
            vec![class("c1", &[("math", "t1", 2), ("art", "t2", 1)])],
            vec![teacher("t1", &["math"]), teacher("t2", &["art"])],
        );
        snapshot.fixed_slots = vec![fixed("c1", 0, 0, "art", "t2"), fixed("c1", 0, 1, "math", "t1")];
        let problem = normalize(&snapshot, Grid::new(2, 2)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();

        // art is fully fixed; one hour of math remains
        assert_eq!(solution.placements.len(), 1);
        assert!(solution.placements.iter().all(|&(_, s)| s >= 2));
    }

    #[test]
    fn shared_teacher_over_capacity_is_reported_for_each_class() {
        let mut shared = teacher("t1", &["math", "phys"]);
        shared.unavailable_slots = slots(&[(3, 0), (4, 0)]);
        let snapshot = input(
            vec![class("c1", &[("math", "t1", 2)]), class("c2", &[("phys", "t1", 2)])],
            vec![shared],
        );
        let problem = normalize(&snapshot, Grid::new(5, 1)).unwrap();

        match Engine::new(&problem, limits()).run() {
            Err(SolveError::Unsatisfiable { unplaced, partial, .. }) => {
                let pairs: Vec<(&str, &str)> = unplaced
                    .iter()
                    .map(|u| (u.class_id.as_str(), u.subject_id.as_str()))
                    .collect();
                assert_eq!(pairs, vec![("c1", "math"), ("c2", "phys")]);
                assert!(unplaced.iter().all(|u| u.reason == BlockReason::TeacherOverbooked));
                assert!(unplaced.iter().all(|u| u.remaining_hours == 2));
                assert!(partial.is_none());
            }
            other => panic!("expected unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn weekly_cap_is_checked_before_search() {
        let mut t1 = teacher("t1", &["math"]);
        t1.max_hours_per_week = Some(2);
        let snapshot = input(vec![class("c1", &[("math", "t1", 3)])], vec![t1]);
        let problem = normalize(&snapshot, Grid::new(5, 2)).unwrap();

        match Engine::new(&problem, limits()).run() {
            Err(SolveError::Unsatisfiable { unplaced, .. }) => {
                assert_eq!(unplaced.len(), 1);
                assert_eq!(unplaced[0].reason, BlockReason::WeeklyCap);
            }
            other => panic!("expected unsatisfiable, got {other:?}"),
        }
    }

    fn clash_snapshot() -> crate::data::SchedulingInput {
        // both teachers can only work period 0, but the class has one cell there
        let mut a = teacher("ta", &["a"]);
        a.unavailable_slots = slots(&[(0, 1)]);
        let mut b = teacher("tb", &["b"]);
        b.unavailable_slots = slots(&[(0, 1)]);
        input(vec![class("c1", &[("a", "ta", 1), ("b", "tb", 1)])], vec![a, b])
    }

    #[test]
    fn exhausted_search_reports_the_stalled_group() {
        let snapshot = clash_snapshot();
        let problem = normalize(&snapshot, Grid::new(1, 2)).unwrap();
        let mut limits = limits();
        limits.best_effort = true;

        match Engine::new(&problem, limits).run() {
            Err(SolveError::Unsatisfiable { unplaced, partial, stats }) => {
                assert_eq!(unplaced.len(), 1);
                assert_eq!(unplaced[0].subject_id, "b");
                assert_eq!(unplaced[0].reason, BlockReason::ClassFull);
                let partial = partial.unwrap();
                assert_eq!(partial.len(), 1);
                assert_eq!(partial[0].subject_id, "a");
                assert_eq!(stats.backtracks, 1);
            }
            other => panic!("expected unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn backtrack_budget_aborts_distinctly() {
        let snapshot = clash_snapshot();
        let problem = normalize(&snapshot, Grid::new(1, 2)).unwrap();
        let mut limits = limits();
        limits.max_backtracks = 0;

        match Engine::new(&problem, limits).run() {
            Err(SolveError::BudgetExceeded { stats, partial, .. }) => {
                assert_eq!(stats.backtracks, 1);
                assert!(partial.is_none());
            }
            other => panic!("expected budget exceeded, got {other:?}"),
        }
    }

    #[test]
    fn time_limit_aborts_a_long_search() {
        // 300 hours to place, so the clock is read before the search can finish
        let names: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        let teachers: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        let snapshot = input(
            (0..10).map(|i| class(&names[i], &[("a", teachers[i].as_str(), 30)])).collect(),
            (0..10).map(|i| teacher(&teachers[i], &["a"])).collect(),
        );
        let problem = normalize(&snapshot, Grid::new(5, 6)).unwrap();
        let mut limits = limits();
        limits.time_limit = Duration::ZERO;
        limits.best_effort = true;

        match Engine::new(&problem, limits).run() {
            Err(SolveError::BudgetExceeded { stats, partial, unplaced }) => {
                assert_eq!(stats.backtracks, 0);
                assert_eq!(stats.nodes, CLOCK_INTERVAL);
                assert_eq!(partial.map(|p| p.len()), Some(CLOCK_INTERVAL as usize - 1));
                assert!(!unplaced.is_empty());
            }
            other => panic!("expected budget exceeded, got {other:?}"),
        }
    }

    #[test]
    fn most_constrained_group_is_placed_first() {
        // art only fits period 0 on either day, so it must claim both before math
        let mut t2 = teacher("t2", &["art"]);
        t2.unavailable_slots = slots(&[(0, 1), (1, 1)]);
        t2.max_hours_per_day = Some(1);
        let snapshot = input(
            vec![class("c1", &[("math", "t1", 2), ("art", "t2", 2)])],
            vec![teacher("t1", &["math"]), t2],
        );
        let problem = normalize(&snapshot, Grid::new(2, 2)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();

        let art = problem.group_index("c1", "art").unwrap();
        let mut art_slots: Vec<usize> = solution
            .placements
            .iter()
            .filter(|(g, _)| *g == art)
            .map(|&(_, s)| s)
            .collect();
        art_slots.sort();
        assert_eq!(art_slots, vec![0, 2]);
        assert_eq!(solution.placements.len(), 4);
    }

    #[test]
    fn empty_demand_is_trivially_solved() {
        let snapshot = input(vec![class("c1", &[])], vec![teacher("t1", &["math"])]);
        let problem = normalize(&snapshot, Grid::new(5, 2)).unwrap();
        let solution = Engine::new(&problem, limits()).run().unwrap();
        assert!(solution.placements.is_empty());
        assert_eq!(solution.stats.nodes, 0);
    }
}
