//! Binary clauses.
//!
//! Binary clauses are kept out of the clause arena. For each literal we store the literals implied
//! by it, so propagating binary clauses touches no clause memory at all.

use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::Lit;

/// Binary clauses.
#[derive(Default)]
pub struct BinaryClauses {
    by_lit: Vec<Vec<Lit>>,
    count: usize,
}

impl BinaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Add a binary clause.
    pub fn add_binary_clause(&mut self, lits: [Lit; 2]) {
        for i in 0..2 {
            self.by_lit[(!lits[i]).code()].push(lits[i ^ 1]);
        }
        self.count += 1;
    }

    /// Implications of a given literal
    pub fn implied(&self, lit: Lit) -> &[Lit] {
        &self.by_lit[lit.code()]
    }

    /// Number of binary clauses.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Remove binary clauses that have a literal assigned at level 0.
///
/// After full propagation at level 0 such a clause is always satisfied: either one of its literals
/// is true, or the falsified literal forced the other one.
pub fn simplify_binary(mut ctx: partial!(Context, mut BinaryClausesP, AssignmentP, TrailP)) {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let (binary_clauses, ctx) = ctx.split_part_mut(BinaryClausesP);
    let assignment = ctx.part(AssignmentP);

    let mut removed = 0;

    for (code, implied) in binary_clauses.by_lit.iter_mut().enumerate() {
        let watched = !Lit::from_code(code);
        if assignment.var_value(watched.var()).is_some() {
            removed += implied.len();
            implied.clear();
        } else {
            implied.retain(|&lit| {
                let keep = assignment.var_value(lit.var()).is_none();
                removed += !keep as usize;
                keep
            });
        }
    }

    // Every binary clause is indexed from both sides.
    binary_clauses.count -= removed / 2;
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;
    use crate::prop::{enqueue_assignment, Reason};

    #[test]
    fn simplify_drops_assigned() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 6);

        for &lits in [[1, 2], [-2, 3], [4, 5]].iter() {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([lit!(lits[0] as isize), lit!(lits[1] as isize)]);
        }
        assert_eq!(ctx.part(BinaryClausesP).count(), 3);

        enqueue_assignment(ctx.borrow(), lit!(2), Reason::Unit, 0);

        simplify_binary(ctx.borrow());

        assert_eq!(ctx.part(BinaryClausesP).count(), 1);
        assert!(ctx.part(BinaryClausesP).implied(lit!(-4)).contains(&lit!(5)));
        assert!(ctx.part(BinaryClausesP).implied(lit!(-1)).is_empty());
    }
}
