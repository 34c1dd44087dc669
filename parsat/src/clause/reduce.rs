//! Clause database reduction.
//!
//! Two policies bound the number of learned clauses. The Chanseok Oh policy keeps three tiers:
//! core clauses (small LBD) are never reduced, mid tier clauses fall back to the local tier when
//! they stay unused for too long, and the local tier is halved periodically by activity. The
//! Glucose policy keeps a single pool and periodically deletes the half with the worst LBD.
use std::mem::replace;

use ordered_float::OrderedFloat;
use partial_ref::{partial, PartialRef};

use vec_mut_scan::VecMutScan;

use crate::config::{ReduceMode, SolverConfig};
use crate::context::{parts::*, Context};
use crate::glue::compute_glue_of_clause;

use super::activity::bump_clause_activity;
use super::db::{self, set_clause_tier, try_delete_clause, Tier};
use super::{assess, ClauseRef};

/// Reduction policy state.
pub struct Reduce {
    mode: ReduceMode,
    core_lbd_cut: usize,
    max_protectable_lbd: usize,
    mid_tier_lifetime: u64,
    reduce_mid_interval: u64,
    reduce_local_interval: u64,
    next_reduce_mid: u64,
    next_reduce_local: u64,
    // Glucose style single pool reduction.
    first_reduce: u64,
    inc_reduce: u64,
    special_inc_reduce: u64,
    next_reduce: u64,
    reductions: u64,
}

impl Default for Reduce {
    fn default() -> Reduce {
        let config = SolverConfig::default();
        let mut reduce = Reduce {
            mode: config.reduce,
            core_lbd_cut: config.core_lbd_cut,
            max_protectable_lbd: config.max_protectable_lbd,
            mid_tier_lifetime: config.mid_tier_lifetime,
            reduce_mid_interval: config.first_reduce_mid,
            reduce_local_interval: config.first_reduce_local,
            next_reduce_mid: 0,
            next_reduce_local: 0,
            first_reduce: config.first_reduce_db,
            inc_reduce: config.inc_reduce_db,
            special_inc_reduce: config.special_inc_reduce_db,
            next_reduce: 0,
            reductions: 0,
        };
        reduce.reset_schedule();
        reduce
    }
}

impl Reduce {
    /// Apply a configuration.
    pub fn configure(&mut self, config: &SolverConfig) {
        self.mode = config.reduce;
        self.core_lbd_cut = config.core_lbd_cut;
        self.max_protectable_lbd = config.max_protectable_lbd;
        self.mid_tier_lifetime = config.mid_tier_lifetime;
        self.reduce_mid_interval = config.first_reduce_mid;
        self.reduce_local_interval = config.first_reduce_local;
        self.first_reduce = config.first_reduce_db;
        self.inc_reduce = config.inc_reduce_db;
        self.special_inc_reduce = config.special_inc_reduce_db;
        self.reset_schedule();
    }

    fn reset_schedule(&mut self) {
        self.next_reduce_mid = self.reduce_mid_interval;
        self.next_reduce_local = self.reduce_local_interval;
        self.next_reduce = self.first_reduce;
        self.reductions = 0;
    }

    /// The tier a learned clause with the given glue starts in.
    ///
    /// The Glucose policy manages a single pool, so everything is local there.
    pub fn select_tier(&self, glue: usize) -> Tier {
        match self.mode {
            ReduceMode::ChanseokOh => assess::select_tier(glue, self.core_lbd_cut),
            ReduceMode::Glucose => Tier::Local,
        }
    }
}

/// Register a freshly learned long clause with the reduction policy.
pub fn register_learnt(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        ReduceP,
        StatsP
    ),
    cref: ClauseRef,
) {
    let conflicts = ctx.part(StatsP).conflicts;
    let header = ctx.part_mut(ClauseAllocP).header_mut(cref);
    match header.tier() {
        Tier::Mid => header.set_touched(conflicts),
        Tier::Local => bump_clause_activity(ctx.borrow(), cref),
        _ => (),
    }
}

/// Widen the core tier when it stays almost empty.
pub fn adjust_on_conflict(mut ctx: partial!(Context, mut ReduceP, ClauseDbP, StatsP)) {
    if ctx.part(StatsP).conflicts == 100_000
        && ctx.part(ClauseDbP).count_by_tier(Tier::Core) < 100
    {
        ctx.part_mut(ReduceP).core_lbd_cut = 5;
    }
}

/// A learned clause participated in a conflict.
///
/// Recomputes the LBD and promotes the clause when it improved. An improvement below the
/// protectable bound shields the clause from the next reduction once.
pub fn clause_used_in_conflict(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        ReduceP,
        StatsP
    ),
    cref: ClauseRef,
) {
    let tier = ctx.part(ClauseAllocP).header(cref).tier();
    if tier == Tier::Irred || tier == Tier::Core {
        return;
    }

    let conflicts = ctx.part(StatsP).conflicts;
    let core_lbd_cut = ctx.part(ReduceP).core_lbd_cut;
    let max_protectable_lbd = ctx.part(ReduceP).max_protectable_lbd;

    let glue = compute_glue_of_clause(ctx.borrow(), cref);

    let old_glue = ctx.part(ClauseAllocP).header(cref).glue();
    if glue < old_glue {
        if old_glue <= max_protectable_lbd {
            // Protect once from reduction.
            ctx.part_mut(ClauseAllocP).header_mut(cref).set_protected(true);
        }
        ctx.part_mut(ClauseAllocP).header_mut(cref).set_glue(glue);

        if ctx.part(ReduceP).mode == ReduceMode::ChanseokOh {
            let tier = ctx.part(ClauseAllocP).header(cref).tier();
            if glue <= core_lbd_cut {
                set_clause_tier(ctx.borrow(), cref, Tier::Core);
            } else if glue <= 6 && tier == Tier::Local {
                set_clause_tier(ctx.borrow(), cref, Tier::Mid);
            }
        }
    }

    match ctx.part(ClauseAllocP).header(cref).tier() {
        Tier::Mid => ctx
            .part_mut(ClauseAllocP)
            .header_mut(cref)
            .set_touched(conflicts),
        Tier::Local => bump_clause_activity(ctx.borrow(), cref),
        _ => (),
    }
}

/// Remove deleted and duplicate entries from the by_tier clause lists.
///
/// This has the side effect of setting the mark bit on all clauses of the tier.
fn dedup_and_mark_by_tier(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP),
    tier: Tier,
) {
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
    let by_tier = &mut ctx.part_mut(ClauseDbP).by_tier[tier as usize];

    by_tier.retain(|&cref| {
        let header = alloc.header_mut(cref);
        let retain = !header.deleted() && !header.mark() && header.tier() == tier;
        if retain {
            header.set_mark(true);
        }
        retain
    })
}

/// Perform any reductions that are due. Returns true when clauses were deleted.
pub fn reduce_check(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ReduceP,
        mut StatsP,
        AssignmentP,
        ImplGraphP
    ),
) -> bool {
    let conflicts = ctx.part(StatsP).conflicts;
    match ctx.part(ReduceP).mode {
        ReduceMode::ChanseokOh => {
            let mut deleted = false;
            if conflicts >= ctx.part(ReduceP).next_reduce_mid {
                let interval = ctx.part(ReduceP).reduce_mid_interval;
                ctx.part_mut(ReduceP).next_reduce_mid = conflicts + interval;
                reduce_mids(ctx.borrow());
            }
            if conflicts >= ctx.part(ReduceP).next_reduce_local {
                let interval = ctx.part(ReduceP).reduce_local_interval;
                ctx.part_mut(ReduceP).next_reduce_local = conflicts + interval;
                reduce_locals(ctx.borrow());
                ctx.part_mut(StatsP).reductions += 1;
                deleted = true;
            }
            deleted
        }
        ReduceMode::Glucose => {
            if conflicts >= ctx.part(ReduceP).next_reduce {
                reduce_glucose(ctx.borrow());
                ctx.part_mut(StatsP).reductions += 1;
                true
            } else {
                false
            }
        }
    }
}

/// Reduce the number of local tier clauses by deleting the less active half.
fn reduce_locals(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        AssignmentP,
        ImplGraphP
    ),
) {
    dedup_and_mark_by_tier(ctx.borrow(), Tier::Local);

    let mut locals = replace(
        &mut ctx.part_mut(ClauseDbP).by_tier[Tier::Local as usize],
        vec![],
    );

    locals.sort_unstable_by_key(|&cref| OrderedFloat(ctx.part(ClauseAllocP).header(cref).activity()));

    let mut limit = locals.len() / 2;

    let mut scan = VecMutScan::new(&mut locals);
    let mut index = 0;

    while let Some(cref) = scan.next() {
        let header = ctx.part_mut(ClauseAllocP).header_mut(*cref);
        header.set_mark(false);

        if header.protected() {
            header.set_protected(false);
            limit += 1;
            index += 1;
            continue;
        }

        if index < limit && try_delete_clause(ctx.borrow(), *cref) {
            cref.remove();
        }
        index += 1;
    }

    drop(scan);

    ctx.part_mut(ClauseDbP).count_by_tier[Tier::Local as usize] = locals.len();
    ctx.part_mut(ClauseDbP).by_tier[Tier::Local as usize] = locals;
}

/// Demote mid tier clauses that did not participate in recent conflicts.
fn reduce_mids(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ReduceP,
        AssignmentP,
        ImplGraphP,
        StatsP
    ),
) {
    dedup_and_mark_by_tier(ctx.borrow(), Tier::Mid);

    let conflicts = ctx.part(StatsP).conflicts;
    let lifetime = ctx.part(ReduceP).mid_tier_lifetime;

    let mut mids = replace(
        &mut ctx.part_mut(ClauseDbP).by_tier[Tier::Mid as usize],
        vec![],
    );

    let mut scan = VecMutScan::new(&mut mids);

    while let Some(cref) = scan.next() {
        ctx.part_mut(ClauseAllocP).header_mut(*cref).set_mark(false);

        let stale = ctx.part(ClauseAllocP).header(*cref).touched() + lifetime < conflicts;
        if stale && !db::is_locked(ctx.borrow(), *cref) {
            set_clause_tier(ctx.borrow(), *cref, Tier::Local);
            ctx.part_mut(ClauseAllocP).header_mut(*cref).set_activity(0.0);
            bump_clause_activity(ctx.borrow(), *cref);
            cref.remove();
        }
    }

    drop(scan);

    ctx.part_mut(ClauseDbP).count_by_tier[Tier::Mid as usize] = mids.len();
    ctx.part_mut(ClauseDbP).by_tier[Tier::Mid as usize] = mids;
}

/// Glucose style reduction: delete the half with the worst LBD.
fn reduce_glucose(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ReduceP,
        AssignmentP,
        ImplGraphP,
        StatsP
    ),
) {
    dedup_and_mark_by_tier(ctx.borrow(), Tier::Local);

    let conflicts = ctx.part(StatsP).conflicts;

    let mut pool = replace(
        &mut ctx.part_mut(ClauseDbP).by_tier[Tier::Local as usize],
        vec![],
    );

    // Worst clauses first: largest LBD, ties broken by lowest activity.
    pool.sort_unstable_by_key(|&cref| {
        let header = ctx.part(ClauseAllocP).header(cref);
        (
            std::cmp::Reverse(header.glue()),
            OrderedFloat(header.activity()),
        )
    });

    let limit = pool.len() / 2;

    // When even the deletion boundary holds good clauses, reductions are too frequent.
    let mut special = false;
    if let Some(&boundary) = pool.get(limit) {
        special = ctx.part(ClauseAllocP).header(boundary).glue() <= 3;
    }

    let mut scan = VecMutScan::new(&mut pool);
    let mut index = 0;

    while let Some(cref) = scan.next() {
        let header = ctx.part_mut(ClauseAllocP).header_mut(*cref);
        header.set_mark(false);

        if header.protected() {
            header.set_protected(false);
            index += 1;
            continue;
        }

        if index < limit && try_delete_clause(ctx.borrow(), *cref) {
            cref.remove();
        }
        index += 1;
    }

    drop(scan);

    ctx.part_mut(ClauseDbP).count_by_tier[Tier::Local as usize] = pool.len();
    ctx.part_mut(ClauseDbP).by_tier[Tier::Local as usize] = pool;

    let reduce = ctx.part_mut(ReduceP);
    reduce.reductions += 1;
    reduce.next_reduce = conflicts + reduce.first_reduce + reduce.inc_reduce * reduce.reductions;
    if special {
        reduce.next_reduce += reduce.special_inc_reduce;
    }
}
