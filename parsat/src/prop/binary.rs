//! Propagation of binary clauses.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::Lit;

use super::enqueue_assignment;
use super::{Conflict, Reason};

/// Propagate all literals implied by the given literal via binary clauses.
///
/// On conflict return the binary clause propagating the conflicting assignment.
pub fn propagate_binary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ImplGraphP,
        mut TrailP,
        BinaryClausesP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    // With chronological backtracking the propagating literal can sit below the current decision
    // level. The implied literal is then assigned at that same level.
    let level = ctx.part(ImplGraphP).level(lit.var());

    let (binary_clauses, mut ctx) = ctx.split_part(BinaryClausesP);

    for &implied in binary_clauses.implied(lit) {
        let assignment = ctx.part(AssignmentP);

        if assignment.lit_is_false(implied) {
            return Err(Conflict::Binary([implied, !lit]));
        } else if !assignment.lit_is_true(implied) {
            enqueue_assignment(ctx.borrow(), implied, Reason::Binary([!lit]), level);
        }
    }

    Ok(())
}
