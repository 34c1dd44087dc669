//! A reduced propagation engine for vivification.
//!
//! This mirrors the regular propagation but skips all heuristic callbacks and keeps its own
//! statistics. Assignments made here are temporary and are undone with [`cancel_to_mark`], which
//! bypasses phase saving and heuristic notifications as well.

use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::{Lit, LitIdx};

use super::{Conflict, Reason, Watch};

/// Level recorded for temporary assignments.
///
/// Distinguishes trial assignments from real level 0 assignments, which can share the `Unit`
/// reason.
pub const TRIAL_LEVEL: usize = LitIdx::max_value() as usize;

/// Enqueue a temporary assignment without notifying the branching heuristic.
pub fn simple_enqueue(
    mut ctx: partial!(Context, mut AssignmentP, mut ImplGraphP, mut TrailP),
    lit: Lit,
    reason: Reason,
) {
    let assignment = ctx.part_mut(AssignmentP);
    debug_assert!(assignment.lit_value(lit) == None);
    assignment.assign_lit(lit);

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);
    trail.push_lit(lit);

    let node = &mut ctx.part_mut(ImplGraphP).nodes[lit.index()];
    node.reason = reason;
    node.level = TRIAL_LEVEL as LitIdx;
}

/// Undo all temporary assignments past the given trail length.
pub fn cancel_to_mark(
    mut ctx: partial!(Context, mut AssignmentP, mut TrailP),
    mark: usize,
) {
    let (trail, mut ctx) = ctx.split_part_mut(TrailP);
    let assignment = ctx.part_mut(AssignmentP);

    for &lit in &trail.trail()[mark..] {
        assignment.unassign_var(lit.var());
    }
    trail.truncate(mark);
}

/// Propagate to fixpoint like [`propagate`](super::propagate), without heuristic callbacks.
pub fn simple_propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
        BinaryClausesP,
    ),
) -> Result<(), Conflict> {
    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        ctx.part_mut(StatsP).simple_propagations += 1;

        {
            let (binary_clauses, mut ctx) = ctx.split_part(BinaryClausesP);
            for &implied in binary_clauses.implied(lit) {
                if ctx.part(AssignmentP).lit_is_false(implied) {
                    return Err(Conflict::Binary([implied, !lit]));
                } else if !ctx.part(AssignmentP).lit_is_true(implied) {
                    simple_enqueue(ctx.borrow(), implied, Reason::Binary([!lit]));
                }
            }
        }

        simple_propagate_long(ctx.borrow(), lit)?;
    }
    Ok(())
}

fn simple_propagate_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let false_lit = !lit;

    let mut read = 0;
    let mut write = 0;

    'watchers: while read < ctx.part(WatchlistsP).watch_count(lit) {
        let watch = ctx.part(WatchlistsP).watch(lit, read);
        read += 1;

        if ctx.part(AssignmentP).lit_is_true(watch.blocking) {
            ctx.part_mut(WatchlistsP).set_watch(lit, write, watch);
            write += 1;
            continue;
        }

        let cref = watch.cref;

        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }

        let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
        if lits[0] == false_lit {
            lits.swap(0, 1);
        }
        let first = lits[0];

        let new_watch = Watch {
            cref,
            blocking: first,
        };

        if first != watch.blocking && ctx.part(AssignmentP).lit_is_true(first) {
            ctx.part_mut(WatchlistsP).set_watch(lit, write, new_watch);
            write += 1;
            continue;
        }

        let clause_len = ctx.part(ClauseAllocP).header(cref).len();
        for k in 2..clause_len {
            let rest_lit = ctx.part(ClauseAllocP).clause(cref).lits()[k];
            if !ctx.part(AssignmentP).lit_is_false(rest_lit) {
                let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
                lits[1] = rest_lit;
                lits[k] = false_lit;
                ctx.part_mut(WatchlistsP).add_watch(!rest_lit, new_watch);
                continue 'watchers;
            }
        }

        ctx.part_mut(WatchlistsP).set_watch(lit, write, new_watch);
        write += 1;

        if ctx.part(AssignmentP).lit_is_false(first) {
            while read < ctx.part(WatchlistsP).watch_count(lit) {
                let watch = ctx.part(WatchlistsP).watch(lit, read);
                read += 1;
                ctx.part_mut(WatchlistsP).set_watch(lit, write, watch);
                write += 1;
            }
            ctx.part_mut(WatchlistsP).truncate(lit, write);
            return Err(Conflict::Long(cref));
        }

        simple_enqueue(ctx.borrow(), first, Reason::Long(cref));
    }

    ctx.part_mut(WatchlistsP).truncate(lit, write);
    Ok(())
}
