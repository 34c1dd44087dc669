//! Branching heuristics.
//!
//! A single component implements the VSIDS, LRB and distance heuristics. Each keeps its own
//! activity array and heap over the same variables, so the mixed strategy can switch between them
//! without losing state. This follows the combined branching of the Maple solver family: start
//! with VSIDS plus distance bumping, move to LRB after a fixed number of conflicts and return to
//! VSIDS for the long tail of the search.

use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use partial_ref::{partial, split_borrow, PartialRef};

use crate::config::{BranchMode, SolverConfig};
use crate::context::{parts::*, Context};
use crate::lit::{Lit, Var};
use crate::prop::Conflict;

pub mod heap;

use heap::ActivityHeap;

mod random;

use random::Random;

const RESCALE_LIMIT: f64 = 1e100;
const ANTI_EXPLORATION_DECAY: f64 = 0.95;
const DIST_CONFLICT_LIMIT: u64 = 50000;

/// Variable selection heuristics and phase saving.
pub struct Branch {
    mode: BranchMode,
    /// VSIDS is the active activity source. LRB otherwise.
    vsids_active: bool,
    /// Distance bumping feeds the distance heap and decisions use it.
    dist_active: bool,
    /// The one-time switch from the initial VSIDS phase to LRB happened.
    switched_to_lrb: bool,
    /// Start of the search, for the time-based switch back to VSIDS.
    started: Option<Instant>,
    time_to_switch: Duration,
    confl_to_switch: u64,

    /// Mirror of the global conflict counter, also the clock for LRB rewards.
    conflicts: u64,

    vsids_inc: f64,
    vsids_decay: f64,
    vsids_decay_timer: u64,
    decay_timer_left: u64,

    step_size: f64,
    step_size_dec: f64,
    min_step_size: f64,

    dist_inc: f64,
    dist_decay: f64,

    init_pol_zero: bool,
    rnd_init_activity: bool,
    rnd_polarity: bool,
    rng: Random,

    /// Saved phase of each variable.
    polarity: Vec<bool>,

    act_vsids: Vec<OrderedFloat<f64>>,
    act_lrb: Vec<OrderedFloat<f64>>,
    act_dist: Vec<OrderedFloat<f64>>,

    heap_vsids: ActivityHeap,
    heap_lrb: ActivityHeap,
    heap_dist: ActivityHeap,

    /// Conflict count when the variable was assigned.
    picked: Vec<u64>,
    /// Conflict count when the variable was last unassigned.
    canceled: Vec<u64>,
    conflicted: Vec<u32>,
    almost_conflicted: Vec<u32>,

    /// Variables bumped during analysis, re-bumped when the learned clause is known.
    bump_later: Vec<Var>,

    // Scratch for distance bumping.
    seen: Vec<bool>,
    to_clear: Vec<Var>,
    involved: Vec<Lit>,
    depth: Vec<u32>,
    path_count: Vec<u32>,
    level_incs: Vec<f64>,
}

impl Default for Branch {
    fn default() -> Branch {
        let config = SolverConfig::default();
        let mut branch = Branch {
            mode: config.branch,
            vsids_active: true,
            dist_active: true,
            switched_to_lrb: false,
            started: None,
            time_to_switch: Duration::from_secs(config.time_to_branch_switch),
            confl_to_switch: config.confl_to_branch_switch,
            conflicts: 0,
            vsids_inc: 1.0,
            vsids_decay: config.vsids_var_decay,
            vsids_decay_timer: config.vsids_decay_timer,
            decay_timer_left: config.vsids_decay_timer,
            step_size: config.step_size,
            step_size_dec: config.step_size_dec,
            min_step_size: config.min_step_size,
            dist_inc: 1.0,
            dist_decay: config.dist_var_decay,
            init_pol_zero: config.init_pol_zero,
            rnd_init_activity: config.rnd_init_activity,
            rnd_polarity: config.rnd_polarity,
            rng: Random::new(config.seed),
            polarity: vec![],
            act_vsids: vec![],
            act_lrb: vec![],
            act_dist: vec![],
            heap_vsids: ActivityHeap::default(),
            heap_lrb: ActivityHeap::default(),
            heap_dist: ActivityHeap::default(),
            picked: vec![],
            canceled: vec![],
            conflicted: vec![],
            almost_conflicted: vec![],
            bump_later: vec![],
            seen: vec![],
            to_clear: vec![],
            involved: vec![],
            depth: vec![],
            path_count: vec![],
            level_incs: vec![],
        };
        branch.apply_mode();
        branch
    }
}

impl Branch {
    /// Apply a configuration. Must happen before any variables are added.
    pub fn configure(&mut self, config: &SolverConfig) {
        self.mode = config.branch;
        self.time_to_switch = Duration::from_secs(config.time_to_branch_switch);
        self.confl_to_switch = config.confl_to_branch_switch;
        self.vsids_decay = config.vsids_var_decay;
        self.vsids_decay_timer = config.vsids_decay_timer;
        self.decay_timer_left = config.vsids_decay_timer;
        self.step_size = config.step_size;
        self.step_size_dec = config.step_size_dec;
        self.min_step_size = config.min_step_size;
        self.dist_decay = config.dist_var_decay;
        self.init_pol_zero = config.init_pol_zero;
        self.rnd_init_activity = config.rnd_init_activity;
        self.rnd_polarity = config.rnd_polarity;
        self.rng = Random::new(config.seed);
        self.started = Some(Instant::now());
        self.apply_mode();
    }

    fn apply_mode(&mut self) {
        match self.mode {
            BranchMode::Vsids => {
                self.vsids_active = true;
                self.dist_active = false;
            }
            BranchMode::Lrb => {
                self.vsids_active = false;
                self.dist_active = false;
            }
            BranchMode::Dist => {
                self.vsids_active = true;
                self.dist_active = true;
            }
            BranchMode::DistLrbVsids => {
                self.vsids_active = true;
                self.dist_active = true;
            }
        }
    }

    /// Whether decisions are currently driven by LRB activities.
    ///
    /// The mixed restart policy couples to this: Luby restarts while LRB branches, Glucose
    /// restarts while VSIDS branches.
    pub fn lrb_active(&self) -> bool {
        !self.vsids_active
    }

    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        let old_count = self.polarity.len();

        let rnd_init_activity = self.rnd_init_activity;
        let rnd_polarity = self.rnd_polarity;
        let init_pol_zero = self.init_pol_zero;
        for _ in old_count..count {
            let activity = if rnd_init_activity {
                self.rng.drand() * 0.0001
            } else {
                0.0
            };
            let polarity = if rnd_polarity {
                self.rng.irand(2) == 1
            } else {
                !init_pol_zero
            };
            self.act_vsids.push(OrderedFloat(activity));
            self.act_lrb.push(OrderedFloat(activity));
            self.act_dist.push(OrderedFloat(activity));
            self.polarity.push(polarity);
        }

        self.heap_vsids.set_var_count(count);
        self.heap_lrb.set_var_count(count);
        self.heap_dist.set_var_count(count);
        self.picked.resize(count, 0);
        self.canceled.resize(count, 0);
        self.conflicted.resize(count, 0);
        self.almost_conflicted.resize(count, 0);
        self.seen.resize(count, false);
        self.depth.resize(count, 0);
        self.path_count.resize(count + 1, 0);

        for index in old_count..count {
            let var = Var::from_index(index);
            self.heap_vsids.insert(var, &self.act_vsids);
            self.heap_lrb.insert(var, &self.act_lrb);
            self.heap_dist.insert(var, &self.act_dist);
        }
    }

    /// A conflict was found, before any analysis took place.
    pub fn on_conflict_found(&mut self) {
        self.conflicts += 1;
        if self.vsids_active {
            self.decay_timer_left -= 1;
            if self.decay_timer_left == 0 {
                self.decay_timer_left = self.vsids_decay_timer;
                if self.vsids_decay < 0.95 {
                    self.vsids_decay += 0.01;
                }
            }
        } else if self.step_size > self.min_step_size {
            self.step_size -= self.step_size_dec;
        }
    }

    /// A variable was resolved on or appeared in the conflicting clause.
    pub fn on_var_seen_in_conflict(&mut self, var: Var) {
        if self.vsids_active {
            self.bump_vsids(var, 0.5);
            self.bump_later.push(var);
        } else {
            self.conflicted[var.index()] += 1;
        }
    }

    /// Analysis produced its learned clause. Called before backtracking.
    pub fn on_learnt_created(
        mut ctx: partial!(Context, mut BranchP, ClauseAllocP, ImplGraphP),
        clause: &[Lit],
    ) {
        split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
        let (branch, ctx) = ctx.split_part_mut(BranchP);
        let impl_graph = ctx.part(ImplGraphP);

        if clause.is_empty() {
            branch.bump_later.clear();
            return;
        }

        let backtrack_level = if clause.len() > 1 {
            impl_graph.level(clause[1].var()).saturating_sub(1)
        } else {
            0
        };

        if branch.vsids_active {
            // Re-bump the analysis variables that stay assigned after backjumping. They are the
            // ones most likely to appear in the next conflicts.
            let mut bump_later = std::mem::take(&mut branch.bump_later);
            for &var in bump_later.iter() {
                if impl_graph.level(var) >= backtrack_level {
                    branch.bump_vsids(var, 1.0);
                }
            }
            bump_later.clear();
            branch.bump_later = bump_later;
        } else {
            // LRB: variables whose reasons touch the learned clause almost participated in this
            // conflict.
            for &lit in clause {
                branch.mark_seen(lit.var());
            }
            for &lit in clause.iter().rev() {
                let reason = impl_graph.reason(lit.var());
                for &reason_lit in reason.lits(&lit_ctx) {
                    let reason_var = reason_lit.var();
                    if !branch.seen[reason_var.index()] {
                        branch.mark_seen(reason_var);
                        branch.almost_conflicted[reason_var.index()] += 1;
                    }
                }
            }
            branch.clear_seen();
        }
    }

    /// The conflict is fully handled.
    pub fn on_conflict_resolved(&mut self) {
        if self.vsids_active {
            self.vsids_inc *= 1.0 / self.vsids_decay;
            if self.vsids_inc > RESCALE_LIMIT {
                self.rescale_vsids();
            }
        }
    }

    /// A restart boundary was reached.
    ///
    /// This is where the mixed strategy switches: to LRB once the initial conflict budget is
    /// used up, and back to VSIDS once the time budget has elapsed.
    pub fn on_restart(mut ctx: partial!(Context, mut BranchP, AssignmentP)) {
        let (branch, ctx) = ctx.split_part_mut(BranchP);
        if branch.mode != BranchMode::DistLrbVsids {
            return;
        }

        if !branch.switched_to_lrb && branch.conflicts > branch.confl_to_switch {
            branch.switched_to_lrb = true;
            branch.vsids_active = false;
            branch.rebuild_heaps(ctx.part(AssignmentP).assignment());
        } else if !branch.vsids_active {
            let over = branch
                .started
                .map(|started| started.elapsed() >= branch.time_to_switch)
                .unwrap_or(false);
            if over {
                log::info!("switching back to VSIDS branching");
                branch.vsids_active = true;
                branch.rebuild_heaps(ctx.part(AssignmentP).assignment());
            }
        }
    }

    /// A variable is assigned.
    pub fn on_var_assigned(&mut self, var: Var) {
        let index = var.index();
        self.picked[index] = self.conflicts;
        self.conflicted[index] = 0;
        self.almost_conflicted[index] = 0;

        // Anti-exploration: catch up on the decay the variable missed while unassigned.
        let age = self.conflicts - self.canceled[index];
        if age > 0 {
            self.act_lrb[index] =
                OrderedFloat(self.act_lrb[index].0 * ANTI_EXPLORATION_DECAY.powi(age as i32));
            self.heap_lrb.update(var, &self.act_lrb);
        }
    }

    /// A variable is unassigned, with the value it had.
    pub fn on_var_unassigned(&mut self, var: Var, value: bool) {
        let index = var.index();

        if !self.vsids_active {
            let age = self.conflicts - self.picked[index];
            if age > 0 {
                let reward = (self.conflicted[index] + self.almost_conflicted[index]) as f64
                    / age as f64;
                let activity =
                    self.step_size * reward + (1.0 - self.step_size) * self.act_lrb[index].0;
                self.act_lrb[index] = OrderedFloat(activity);
                self.heap_lrb.update(var, &self.act_lrb);
            }
        }
        self.canceled[index] = self.conflicts;

        self.polarity[index] = value;
        self.insert_var_order(var);
    }

    /// Select an unassigned variable and return the literal to assign.
    ///
    /// Returns `None` when all variables are assigned.
    pub fn pick_branch_lit(
        mut ctx: partial!(Context, mut BranchP, AssignmentP),
    ) -> Option<Lit> {
        let (branch, ctx) = ctx.split_part_mut(BranchP);
        let assignment = ctx.part(AssignmentP);

        if !branch.vsids_active {
            // Anti-exploration: decay the activity of long-unassigned candidates before trusting
            // their heap position.
            while let Some(var) = branch.heap_lrb.peek() {
                let index = var.index();
                let age = branch.conflicts - branch.canceled[index];
                if age == 0 {
                    break;
                }
                branch.act_lrb[index] = OrderedFloat(
                    branch.act_lrb[index].0 * ANTI_EXPLORATION_DECAY.powi(age as i32),
                );
                branch.canceled[index] = branch.conflicts;
                branch.heap_lrb.update(var, &branch.act_lrb);
            }
        }

        loop {
            let var = {
                let (heap, activities) = branch.active_heap();
                heap.pop(activities)?
            };
            if assignment.var_value(var).is_none() {
                return Some(Lit::from_var(var, !branch.polarity[var.index()]));
            }
        }
    }

    fn active_heap(&mut self) -> (&mut ActivityHeap, &[OrderedFloat<f64>]) {
        if self.vsids_active {
            if self.dist_active {
                (&mut self.heap_dist, &self.act_dist)
            } else {
                (&mut self.heap_vsids, &self.act_vsids)
            }
        } else {
            (&mut self.heap_lrb, &self.act_lrb)
        }
    }

    fn insert_var_order(&mut self, var: Var) {
        if self.vsids_active {
            if self.dist_active {
                self.heap_dist.insert(var, &self.act_dist);
            } else {
                self.heap_vsids.insert(var, &self.act_vsids);
            }
        } else {
            self.heap_lrb.insert(var, &self.act_lrb);
        }
    }

    fn rebuild_heaps(&mut self, assignment: &[Option<bool>]) {
        let unassigned = |assignment: &[Option<bool>]| {
            assignment
                .iter()
                .enumerate()
                .filter(|(_, value)| value.is_none())
                .map(|(index, _)| Var::from_index(index))
                .collect::<Vec<_>>()
        };
        let vars = unassigned(assignment);
        self.heap_vsids.rebuild(vars.iter().cloned(), &self.act_vsids);
        self.heap_lrb.rebuild(vars.iter().cloned(), &self.act_lrb);
        self.heap_dist.rebuild(vars.iter().cloned(), &self.act_dist);
    }

    fn bump_vsids(&mut self, var: Var, mult: f64) {
        let index = var.index();
        self.act_vsids[index] = OrderedFloat(self.act_vsids[index].0 + self.vsids_inc * mult);
        if self.act_vsids[index].0 > RESCALE_LIMIT {
            self.rescale_vsids();
        }
        self.heap_vsids.update(var, &self.act_vsids);
    }

    fn rescale_vsids(&mut self) {
        for activity in self.act_vsids.iter_mut() {
            activity.0 *= 1.0 / RESCALE_LIMIT;
        }
        self.vsids_inc *= 1.0 / RESCALE_LIMIT;
    }

    fn mark_seen(&mut self, var: Var) {
        self.seen[var.index()] = true;
        self.to_clear.push(var);
    }

    fn clear_seen(&mut self) {
        for var in self.to_clear.drain(..) {
            self.seen[var.index()] = false;
        }
    }
}

/// Distance bumping, run on the conflicting clause before analysis.
///
/// Walks the implication graph from the conflict towards the decisions, computing for each
/// involved variable the length of its longest propagation chain into the conflict. Activities
/// are bumped proportionally to that depth, so variables close to the conflict gain the most.
pub fn on_conflict_pre_analyze(
    mut ctx: partial!(Context, mut BranchP, ClauseAllocP, ImplGraphP, TrailP),
    conflict: Conflict,
) {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let (branch, mut ctx) = ctx.split_part_mut(BranchP);

    branch.dist_active = branch.conflicts <= DIST_CONFLICT_LIMIT
        && matches!(branch.mode, BranchMode::Dist | BranchMode::DistLrbVsids);
    if !branch.vsids_active || !branch.dist_active {
        return;
    }

    let (trail, ctx) = ctx.split_part(TrailP);
    let impl_graph = ctx.part(ImplGraphP);

    if trail.current_level() == 0 {
        return;
    }

    branch.involved.clear();
    let mut max_depth = 1u32;
    let mut min_level = trail.current_level();

    for &lit in conflict.lits(&lit_ctx) {
        let var = lit.var();
        let level = impl_graph.level(var);
        if level > 0 {
            branch.seen[var.index()] = true;
            branch.depth[var.index()] = 1;
            branch.path_count[level] += 1;
            if level < min_level {
                min_level = level;
            }
        }
    }

    let mut limit = trail.level_start(min_level);
    let mut index = trail.trail().len();
    while index > limit {
        index -= 1;
        let lit = trail.lit_at(index);
        let var = lit.var();
        if !branch.seen[var.index()] {
            continue;
        }
        branch.seen[var.index()] = false;
        let level = impl_graph.level(var);
        branch.path_count[level] -= 1;
        if branch.path_count[level] != 0 {
            let reason_depth = branch.depth[var.index()] + 1;
            if reason_depth > max_depth {
                max_depth = reason_depth;
            }
            for &reason_lit in impl_graph.reason(var).lits(&lit_ctx) {
                let reason_var = reason_lit.var();
                let reason_level = impl_graph.level(reason_var);
                if reason_level > 0 {
                    if reason_level < min_level {
                        min_level = reason_level;
                        limit = trail.level_start(min_level);
                    }
                    if branch.seen[reason_var.index()] {
                        if branch.depth[reason_var.index()] < reason_depth {
                            branch.depth[reason_var.index()] = reason_depth;
                        }
                    } else {
                        branch.seen[reason_var.index()] = true;
                        branch.depth[reason_var.index()] = reason_depth;
                        branch.path_count[reason_level] += 1;
                    }
                }
            }
        }
        branch.involved.push(lit);
    }

    let mut inc = branch.dist_inc;
    branch.level_incs.clear();
    for _ in 0..max_depth {
        branch.level_incs.push(inc);
        inc /= branch.dist_decay;
    }

    for i in 0..branch.involved.len() {
        let var = branch.involved[i].var();
        let depth = branch.depth[var.index()] as usize;
        let activity = branch.act_dist[var.index()].0 + depth as f64 * branch.level_incs[depth - 1];
        branch.act_dist[var.index()] = OrderedFloat(activity);

        if activity > RESCALE_LIMIT {
            for value in branch.act_dist.iter_mut() {
                value.0 *= 1.0 / RESCALE_LIMIT;
            }
            branch.dist_inc *= 1.0 / RESCALE_LIMIT;
            for value in branch.level_incs.iter_mut() {
                *value *= 1.0 / RESCALE_LIMIT;
            }
        }
        branch.heap_dist.update(var, &branch.act_dist);
    }
    branch.dist_inc = *branch.level_incs.last().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn vsids_prefers_bumped_vars() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);
        ctx.part_mut(BranchP).mode = BranchMode::Vsids;
        ctx.part_mut(BranchP).apply_mode();

        ctx.part_mut(BranchP).bump_vsids(var!(3), 1.0);
        ctx.part_mut(BranchP).bump_vsids(var!(3), 1.0);
        ctx.part_mut(BranchP).bump_vsids(var!(2), 1.0);

        let lit = Branch::pick_branch_lit(ctx.borrow()).unwrap();
        assert_eq!(lit.var(), var!(3));
    }

    #[test]
    fn phase_saving_repeats_last_value() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);
        ctx.part_mut(BranchP).mode = BranchMode::Vsids;
        ctx.part_mut(BranchP).apply_mode();

        ctx.part_mut(BranchP).bump_vsids(var!(1), 1.0);
        ctx.part_mut(BranchP).on_var_assigned(var!(1));
        ctx.part_mut(BranchP).on_var_unassigned(var!(1), true);

        let lit = Branch::pick_branch_lit(ctx.borrow()).unwrap();
        assert_eq!(lit, lit!(1));

        ctx.part_mut(BranchP).on_var_assigned(var!(1));
        ctx.part_mut(BranchP).on_var_unassigned(var!(1), false);

        let lit = Branch::pick_branch_lit(ctx.borrow()).unwrap();
        assert_eq!(lit, lit!(-1));
    }

    #[test]
    fn rescale_keeps_order() {
        let mut branch = Branch::default();
        branch.mode = BranchMode::Vsids;
        branch.apply_mode();
        branch.set_var_count(3);

        branch.vsids_inc = RESCALE_LIMIT / 2.0;
        branch.bump_vsids(var!(1), 1.0);
        branch.bump_vsids(var!(2), 1.0);
        branch.bump_vsids(var!(2), 1.0);

        assert!(branch.act_vsids[1] > branch.act_vsids[0]);
        assert!(branch.act_vsids[1].0 <= RESCALE_LIMIT);
    }
}
