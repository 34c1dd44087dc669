//! Conflict core analysis.
//!
//! A resolution over the conflict that refuses to pull in literals from decision levels strictly
//! between the top level and the conflict level. Whenever a reason clause would introduce such a
//! literal, the resolution skips the clause and collects the negated trail literal instead. The
//! resulting clause captures which parts of the conflict belong to the conflict level itself; it
//! is not necessarily asserting.

use partial_ref::{partial, split_borrow, PartialRef};

use super::{minimize, LearntClause};
use crate::context::{parts::*, Context};
use crate::lit::Lit;
use crate::prop::{Conflict, Reason};

/// Run the conflict core analysis for the given conflict.
///
/// Expects the analyzer's variable flags to be clear and leaves them clear.
pub(super) fn run_conflict_core(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        SolverConfigP,
        TrailP,
    ),
    conflict: Conflict,
) -> Option<LearntClause> {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

    let conflict_level = ctx.part(AnalyzeConflictP).conflict_level;
    let flags_top = ctx.part(AnalyzeConflictP).to_clean.len();

    let mut out: Vec<Lit> = vec![];
    let mut path_count = 0usize;
    let mut resolvents = 0usize;
    let mut binary_resolvents = 0usize;
    let mut skipped = 0usize;

    let mut index = ctx.part(TrailP).trail().len();
    let mut current: Option<Lit> = None;
    let mut current_reason = Reason::Unit;

    loop {
        // The literals resolved in this step: the conflicting clause first, later the reason of
        // the selected trail literal.
        let (lits, clause_len): (&[Lit], usize) = match current {
            None => {
                let lits = conflict.lits(&lit_ctx);
                (lits, lits.len())
            }
            Some(_) => {
                let lits = current_reason.lits(&lit_ctx);
                (lits, lits.len() + 1)
            }
        };

        // Skip resolvents that would introduce literals from intermediate levels. The negated
        // trail literal stands in for everything implied through it.
        let mut usable = true;
        if let Some(p) = current {
            for &lit in lits {
                let level = ctx.part(ImplGraphP).level(lit.var());
                if !ctx.part(AnalyzeConflictP).var_flags[lit.index()]
                    && level > 0
                    && level < conflict_level
                {
                    out.push(!p);
                    skipped += 1;
                    usable = false;
                    break;
                }
            }
        }

        if usable {
            resolvents += 1;
            binary_resolvents += (clause_len == 2) as usize;

            for i in 0..lits.len() {
                let lit = lits[i];
                let level = ctx.part(ImplGraphP).level(lit.var());
                if level > 0 && !ctx.part(AnalyzeConflictP).var_flags[lit.index()] {
                    let analyze = ctx.part_mut(AnalyzeConflictP);
                    analyze.var_flags[lit.index()] = true;
                    analyze.to_clean.push(lit.var());
                    if level >= conflict_level {
                        path_count += 1;
                    }
                }
            }
        }

        if path_count == 0 {
            break;
        }

        // Select the next trail literal to resolve on.
        let p = loop {
            index -= 1;
            let lit = ctx.part(TrailP).lit_at(index);
            if ctx.part(AnalyzeConflictP).var_flags[lit.index()]
                && ctx.part(ImplGraphP).level(lit.var()) >= conflict_level
            {
                break lit;
            }
        };

        path_count -= 1;
        current_reason = *ctx.part(ImplGraphP).reason(p.var());
        current = Some(p);

        if current_reason.is_unit() {
            break;
        }
    }

    let result = if skipped > 0 && resolvents > 1 && resolvents > binary_resolvents {
        if let Some(p) = current {
            if ctx.part(ImplGraphP).reason(p.var()).is_unit() {
                out.push(!p);
            }
        }

        // Add the low level literals of the conflicting clause.
        for i in 0..conflict.lits(&lit_ctx).len() {
            let lit = conflict.lits(&lit_ctx)[i];
            let level = ctx.part(ImplGraphP).level(lit.var());
            if level > 0 && level < conflict_level {
                out.push(lit);
            }
        }

        let glue = minimize::run(ctx.borrow(), &mut out, 1);

        // Asserting iff the first literal is the only one left at the conflict level.
        let asserting = out[1..]
            .iter()
            .all(|lit| ctx.part(ImplGraphP).level(lit.var()) < conflict_level);

        if asserting && out.len() > 2 {
            let impl_graph = ctx.part(ImplGraphP);
            let (prefix, rest) = out.split_at_mut(2);
            let lit_1 = &mut prefix[1];
            let mut max_level = impl_graph.level(lit_1.var());
            for lit in rest.iter_mut() {
                let lit_level = impl_graph.level(lit.var());
                if lit_level > max_level {
                    max_level = lit_level;
                    std::mem::swap(lit_1, lit);
                }
            }
        }

        Some(LearntClause {
            lits: out,
            glue,
            asserting,
        })
    } else {
        None
    };

    ctx.part_mut(AnalyzeConflictP).clear_flags_from(flags_top);

    result
}
