//! Attaching clauses under a partial assignment.
//!
//! Clauses learned by the local solver are always attached right after backtracking, when they are
//! either unit or free. Imported clauses arrive at arbitrary points of the search and can be
//! falsified or propagating under the current assignment. The functions here order the watched
//! literals so that the watch invariant holds regardless, and report the level at which the clause
//! starts to interact with the search.

use partial_ref::{partial, PartialRef};

use crate::clause::ClauseRef;
use crate::context::{parts::*, Context};

/// The level at which a clause would propagate or conflict.
///
/// Returns the variable count when the clause has at least two non-false literals under the
/// current assignment and therefore does not interact with it at all.
pub fn attach_level(
    ctx: partial!(Context, AssignmentP, ClauseAllocP, ImplGraphP),
    cref: ClauseRef,
) -> usize {
    let free_level = ctx.part(AssignmentP).assignment().len();
    let assignment = ctx.part(AssignmentP);
    let impl_graph = ctx.part(ImplGraphP);
    let lits = ctx.part(ClauseAllocP).clause(cref).lits();

    let mut unassigned = 0;
    for &lit in lits {
        match assignment.lit_value(lit) {
            None => unassigned += 1,
            Some(true) => unassigned += 2,
            Some(false) => (),
        }
        if unassigned > 1 {
            return free_level;
        }
    }

    let mut highest = 0;
    let mut second_highest = 0;
    for &lit in lits {
        if unassigned == 1 && assignment.lit_value(lit).is_none() {
            continue;
        }
        let level = impl_graph.level(lit.var());
        if level > highest {
            second_highest = highest;
            highest = level;
        } else if level > second_highest {
            second_highest = level;
        }
    }

    let conflicting = unassigned == 0;
    let level = if conflicting { second_highest } else { highest };
    level.saturating_sub(1)
}

/// Order the watched literals of a clause for the current assignment and attach it.
///
/// Unassigned literals are preferred as watches. When fewer than two exist, the falsified
/// literals with the highest decision levels take the watch positions so that backtracking
/// reactivates the clause as late as possible.
///
/// Returns the variable count when the clause was attached without interacting with the current
/// assignment, otherwise the level at which it propagates or conflicts.
pub fn safe_attach_clause(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut WatchlistsP,
        AssignmentP,
        ImplGraphP
    ),
    cref: ClauseRef,
) -> usize {
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
    let assignment = ctx.part(AssignmentP);
    let impl_graph = ctx.part(ImplGraphP);

    let lits = alloc.clause_mut(cref).lits_mut();
    let len = lits.len();

    let mut i = 1;
    while i < len && (assignment.lit_is_false(lits[0]) || assignment.lit_is_false(lits[1])) {
        if !assignment.lit_is_false(lits[i]) {
            if assignment.lit_is_false(lits[0]) {
                lits.swap(0, i);
            } else if assignment.lit_is_false(lits[1]) {
                lits.swap(1, i);
            }
        }
        i += 1;
    }

    let mut result = assignment.assignment().len();
    if assignment.lit_is_false(lits[0]) || assignment.lit_is_false(lits[1]) {
        for j in 0..2 {
            if !assignment.lit_is_false(lits[j]) {
                continue;
            }
            for k in j + 1..len {
                if impl_graph.level(lits[j].var()) < impl_graph.level(lits[k].var()) {
                    lits.swap(j, k);
                    if !assignment.lit_is_false(lits[j]) {
                        break;
                    }
                }
            }
        }
        result = impl_graph.level(lits[1].var());
    }

    let watched = [lits[0], lits[1]];
    ctx.part_mut(WatchlistsP).watch_clause(cref, watched);

    result
}
