//! Unit propagation.
pub mod assignment;
pub mod attach;
pub mod binary;
pub mod graph;
pub mod long;
pub mod simple;
pub mod watch;

pub use assignment::{backtrack, enqueue_assignment, restart, Assignment, Trail};
pub use attach::{attach_level, safe_attach_clause};
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use watch::{Watch, Watchlists};

use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};

/// Propagate all enqueued assignments to fixpoint.
///
/// On conflict the clause propagating the conflicting assignment is returned and the remaining
/// queue is left in place. It is discarded by the following backtrack.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
        BinaryClausesP,
        ClauseDbP,
    ),
) -> Result<(), Conflict> {
    ensure_watchlists(ctx.borrow());

    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        ctx.part_mut(StatsP).propagations += 1;
        binary::propagate_binary(ctx.borrow(), lit)?;
        long::propagate_long(ctx.borrow(), lit)?;
    }

    Ok(())
}

/// Check the watchlist invariant: every live long clause is watched exactly once from each of
/// the complements of its first two literals.
#[cfg(test)]
pub fn check_watches(
    ctx: partial!(Context, ClauseAllocP, ClauseDbP, WatchlistsP),
) -> bool {
    let watchlists = ctx.part(WatchlistsP);
    if !watchlists.enabled() {
        return true;
    }
    let alloc = ctx.part(ClauseAllocP);

    for &cref in ctx.part(ClauseDbP).clauses() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        for &lit in clause.lits()[..2].iter() {
            let watch_list = !lit;
            let count = (0..watchlists.watch_count(watch_list))
                .filter(|&index| watchlists.watch(watch_list, index).cref == cref)
                .count();
            if count != 1 {
                return false;
            }
        }
    }
    true
}

/// Rebuild the watchlists if they were invalidated by a garbage collection.
pub fn ensure_watchlists(
    mut ctx: partial!(Context, mut WatchlistsP, ClauseAllocP, ClauseDbP),
) {
    if ctx.part(WatchlistsP).enabled() {
        return;
    }

    let (watchlists, mut ctx) = ctx.split_part_mut(WatchlistsP);
    let (db, ctx) = ctx.split_part(ClauseDbP);
    let alloc = ctx.part(ClauseAllocP);

    for &cref in db.clauses() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        let lits = clause.lits();
        watchlists.watch_clause(cref, [lits[0], lits[1]]);
    }

    watchlists.enable();
}
