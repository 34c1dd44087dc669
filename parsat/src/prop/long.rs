//! Propagation of long clauses.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::Lit;

use super::enqueue_assignment;
use super::{Conflict, Reason, Watch};

/// Propagate all literals implied by long clauses watched by the given literal.
///
/// On conflict return the clause propagating the conflicting assignment.
///
/// See [`prop::watch`](crate::prop::watch) for the invariants that this has to uphold.
///
/// The watchlist of the literal is compacted in place: watches of deleted clauses are dropped and
/// watches that moved to another literal are removed.
pub fn propagate_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let false_lit = !lit;
    let current_level = ctx.part(ImplGraphP).level(lit.var());
    let decision_level = ctx.part(TrailP).current_level();

    let mut read = 0;
    let mut write = 0;

    'watchers: while read < ctx.part(WatchlistsP).watch_count(lit) {
        let watch = ctx.part(WatchlistsP).watch(lit, read);
        read += 1;

        // If the blocking literal (which is part of the watched clause) is already true, the
        // watched clause is satisfied and we don't even have to look at it.
        if ctx.part(AssignmentP).lit_is_true(watch.blocking) {
            ctx.part_mut(WatchlistsP).set_watch(lit, write, watch);
            write += 1;
            continue;
        }

        let cref = watch.cref;

        // Deleted clauses keep their watches until the list is next scanned, which is now.
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }

        // Ensure that the falsified literal is at index 1. This establishes the precondition of
        // later propagations, which expect the propagating literal at index 0, and saves the same
        // check when the clause turns out to be satisfied by its other watched literal.
        let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
        if lits[0] == false_lit {
            lits.swap(0, 1);
        }
        debug_assert_eq!(lits[1], false_lit);
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

        // Look for a non-false unwatched literal to take over the watch.
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

        // No replacement found, so the clause is unit or in conflict.
        ctx.part_mut(WatchlistsP).set_watch(lit, write, new_watch);
        write += 1;

        if ctx.part(AssignmentP).lit_is_false(first) {
            // Move the unprocessed watches down and truncate before reporting the conflict.
            while read < ctx.part(WatchlistsP).watch_count(lit) {
                let watch = ctx.part(WatchlistsP).watch(lit, read);
                read += 1;
                ctx.part_mut(WatchlistsP).set_watch(lit, write, watch);
                write += 1;
            }
            ctx.part_mut(WatchlistsP).truncate(lit, write);
            return Err(Conflict::Long(cref));
        }

        if current_level == decision_level {
            enqueue_assignment(ctx.borrow(), first, Reason::Long(cref), current_level);
        } else {
            // After chronological backtracking the remaining falsified literals can come from
            // levels above the propagating one. The implied literal belongs to the highest of
            // those levels, and the literal attaining it takes over the watch so that
            // backtracking to any level in between keeps the watch invariant intact.
            let mut max_level = current_level;
            let mut max_index = 1;
            for k in 2..clause_len {
                let k_lit = ctx.part(ClauseAllocP).clause(cref).lits()[k];
                let k_level = ctx.part(ImplGraphP).level(k_lit.var());
                if k_level > max_level {
                    max_level = k_level;
                    max_index = k;
                }
            }

            if max_index != 1 {
                let lits = ctx.part_mut(ClauseAllocP).clause_mut(cref).lits_mut();
                lits.swap(1, max_index);
                // The watch moves along with the swapped literal.
                write -= 1;
                let moved_to = !ctx.part(ClauseAllocP).clause(cref).lits()[1];
                ctx.part_mut(WatchlistsP).add_watch(moved_to, new_watch);
            }

            enqueue_assignment(ctx.borrow(), first, Reason::Long(cref), max_level);
        }
    }

    ctx.part_mut(WatchlistsP).truncate(lit, write);
    Ok(())
}
