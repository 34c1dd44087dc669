//! Simplification using unit clauses.

use partial_ref::{partial, PartialRef};

use crate::binary::simplify_binary;
use crate::clause::db;
use crate::context::{parts::*, Context};
use crate::lit::Lit;
use crate::prop::Reason;

/// Harvest top-level assignments as unit clauses.
///
/// Removes them from the trail, so backtracking and conflict analysis never have to look at
/// them again. Returns true when new units were found since the last call.
pub fn prove_units<'a>(
    mut ctx: partial!(Context<'a>, mut ImplGraphP, mut ProofP<'a>, mut TrailP),
) -> bool {
    if ctx.part(TrailP).current_level() != 0 {
        return false;
    }

    let mut new_unit = false;

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);
    let (impl_graph, mut ctx) = ctx.split_part_mut(ImplGraphP);

    for &lit in trail.trail() {
        new_unit = true;
        if !impl_graph.reason(lit.var()).is_unit() {
            ctx.part_mut(ProofP).add_clause(&[lit]);
        }
        // The reason clause may be deleted or collected later; a unit needs none.
        impl_graph.update_reason(lit.var(), Reason::Unit);
    }

    trail.clear();

    new_unit
}

/// Remove satisfied clauses and false literals.
///
/// Requires a fully propagated trail at level 0.
pub fn simplify<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP<'a>,
        AssignmentP,
        TrailP,
    ),
) {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    simplify_binary(ctx.borrow());

    let mut new_lits: Vec<Lit> = vec![];

    for index in 0..ctx.part(ClauseDbP).clauses().len() {
        let cref = ctx.part(ClauseDbP).clauses()[index];
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }

        let satisfied = {
            let assignment = ctx.part(AssignmentP);
            let lits = ctx.part(ClauseAllocP).clause(cref).lits();
            new_lits.clear();
            let mut satisfied = false;
            for &lit in lits {
                match assignment.lit_value(lit) {
                    None => new_lits.push(lit),
                    Some(true) => {
                        satisfied = true;
                        break;
                    }
                    Some(false) => (),
                }
            }
            satisfied
        };

        if satisfied {
            let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
            ctx.part_mut(ProofP).delete_clause(&lits);
            db::delete_clause(ctx.borrow(), cref);
            continue;
        }

        let old_len = ctx.part(ClauseAllocP).header(cref).len();
        if new_lits.len() == old_len {
            continue;
        }

        {
            let lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
            let proof = ctx.part_mut(ProofP);
            proof.add_clause(&new_lits);
            proof.delete_clause(&lits);
        }

        match new_lits[..] {
            // Cannot have empty or unit clauses after full propagation. An empty clause would
            // have been a conflict and a unit clause must be satisfied and thus would have been
            // dropped above.
            [] | [_] => unreachable!(),
            [lit_0, lit_1] => {
                ctx.part_mut(BinaryClausesP)
                    .add_binary_clause([lit_0, lit_1]);
                db::delete_clause(ctx.borrow(), cref);
            }
            ref lits => {
                // The watched literals are never false here, so they stay in front and the
                // watches remain intact.
                let new_len = lits.len();
                let clause = ctx.part_mut(ClauseAllocP).clause_mut(cref);
                clause.lits_mut()[..new_len].copy_from_slice(lits);
                clause.header_mut().set_len(new_len);
                ctx.part_mut(ClauseDbP).add_garbage(old_len - new_len);
            }
        }
    }
}
