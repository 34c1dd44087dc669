//! Compute glue levels of clauses.
//!
//! The glue level of a propagating clause is the number of distinct decision levels of the
//! clause's variables. This is also called the literal block distance (LBD). For each clause the
//! smallest glue level observed is used as an indicator of how useful that clause is.

use partial_ref::{partial, PartialRef};

use crate::clause::ClauseRef;
use crate::context::{parts::*, Context};
use crate::lit::Lit;

/// Compute the glue level of a clause.
///
/// Level 0 literals are not counted. Uses the implication graph's epoch marks, so repeated calls
/// are cheap and no per-call clearing is needed.
pub fn compute_glue(mut ctx: partial!(Context, mut ImplGraphP), lits: &[Lit]) -> usize {
    let impl_graph = ctx.part_mut(ImplGraphP);
    impl_graph.new_epoch();

    let mut glue = 0;

    for &lit in lits {
        let level = impl_graph.level(lit.var());
        if level != 0 && !impl_graph.is_marked(level) {
            impl_graph.mark(level);
            glue += 1;
        }
    }

    glue
}

/// Compute the glue level of a stored clause.
pub fn compute_glue_of_clause(
    mut ctx: partial!(Context, mut ImplGraphP, ClauseAllocP),
    cref: ClauseRef,
) -> usize {
    let (alloc, mut ctx) = ctx.split_part(ClauseAllocP);
    compute_glue(ctx.borrow(), alloc.clause(cref).lits())
}
