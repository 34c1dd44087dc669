//! Multi-UIP analysis.
//!
//! After the first UIP is found the resolution can be continued: starting from the reason of the
//! first UIP, resolve until the next UIP of the conflict level is reached. Each segment yields a
//! clause of the form `(uip ∨ ¬next_uip ∨ tail)` relating consecutive UIPs. Segments that mostly
//! resolve binary clauses are skipped, their clauses add nothing over the binary implications
//! already present.

use partial_ref::{partial, split_borrow, PartialRef};

use super::{minimize, LearntClause};
use crate::context::{parts::*, Context};
use crate::lit::Lit;
use crate::prop::Reason;

/// Collect additional clauses from the UIPs past the first one.
///
/// A candidate that is asserting and shorter than the primary clause replaces it, the displaced
/// clause joins the supplementary clauses. All other candidates are appended as supplementary
/// clauses; the caller decides their fate.
pub(super) fn collect_multi_uips(
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
) {
    let mut index = ctx.part(AnalyzeConflictP).uip_index;
    let conflict_level = ctx.part(AnalyzeConflictP).conflict_level;

    loop {
        let prev_uip = ctx.part(TrailP).lit_at(index);
        if ctx.part(ImplGraphP).reason(prev_uip.var()).is_unit() {
            break;
        }

        let (candidate, next_index) = match analyze_segment(ctx.borrow(), index, conflict_level) {
            Some(result) => result,
            None => break,
        };

        if let Some(mut candidate) = candidate {
            let analyze = ctx.part_mut(AnalyzeConflictP);
            if candidate.asserting && candidate.lits.len() < analyze.clause.len() {
                std::mem::swap(&mut analyze.clause, &mut candidate.lits);
                std::mem::swap(&mut analyze.glue, &mut candidate.glue);
            }
            analyze.supplementary.push(candidate);
        }

        index = next_index;
    }
}

/// Resolve from the reason of the UIP at `index` to the next UIP.
///
/// Returns the learned clause of this segment (if it is worth keeping) and the trail index of the
/// next UIP.
fn analyze_segment(
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
    index: usize,
    conflict_level: usize,
) -> Option<(Option<LearntClause>, usize)> {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

    let prev_uip = ctx.part(TrailP).lit_at(index);
    let flags_top = ctx.part(AnalyzeConflictP).to_clean.len();

    // Mark the previous UIP so the resolution will not pass through it.
    ctx.part_mut(AnalyzeConflictP).mark_var(prev_uip.var());

    // Positions 0 and 1 are reserved for the UIP pair.
    let mut out = vec![prev_uip, prev_uip];

    let mut path_count = 0usize;
    let mut resolvents = 0usize;
    let mut binary_resolvents = 0usize;

    {
        let reason = *ctx.part(ImplGraphP).reason(prev_uip.var());
        resolvents += 1;
        binary_resolvents += matches!(reason, Reason::Binary(_)) as usize;
        for i in 0..reason.lits(&lit_ctx).len() {
            let lit = reason.lits(&lit_ctx)[i];
            add_segment_literal(
                ctx.borrow(),
                lit,
                conflict_level,
                &mut path_count,
                &mut out,
            );
        }
    }

    if path_count == 0 {
        // The reason holds no further literal of the conflict level, so there is no next UIP to
        // connect to. This happens when chronological backtracking moved the UIP's assignment
        // below its propagation context.
        ctx.part_mut(AnalyzeConflictP).clear_flags_from(flags_top);
        return None;
    }

    let mut scan_index = index;
    let next_uip = loop {
        let lit = loop {
            scan_index -= 1;
            let lit = ctx.part(TrailP).lit_at(scan_index);
            if ctx.part(AnalyzeConflictP).var_flags[lit.index()]
                && ctx.part(ImplGraphP).level(lit.var()) >= conflict_level
            {
                break lit;
            }
        };

        ctx.part_mut(AnalyzeConflictP).var_flags[lit.index()] = false;
        path_count -= 1;
        if path_count == 0 {
            break lit;
        }

        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        if !reason.is_unit() {
            resolvents += 1;
            binary_resolvents += matches!(reason, Reason::Binary(_)) as usize;
        }
        for i in 0..reason.lits(&lit_ctx).len() {
            let reason_lit = reason.lits(&lit_ctx)[i];
            add_segment_literal(
                ctx.borrow(),
                reason_lit,
                conflict_level,
                &mut path_count,
                &mut out,
            );
        }
    };

    let result = if resolvents > 1 && resolvents > binary_resolvents {
        out[1] = !next_uip;

        // Minimization expects all clause variables to be flagged.
        ctx.part_mut(AnalyzeConflictP).mark_var(next_uip.var());
        let glue = minimize::run(ctx.borrow(), &mut out, 2);

        // Asserting iff the UIP literal is the only one left at the conflict level.
        let asserting = out[1..].iter().all(|lit| {
            ctx.part(ImplGraphP).level(lit.var()) < conflict_level
        });

        if out.len() > 2 {
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

    Some((result, scan_index))
}

/// Add a literal of a resolved reason to the segment clause.
fn add_segment_literal(
    mut ctx: partial!(Context, mut AnalyzeConflictP, ImplGraphP),
    lit: Lit,
    conflict_level: usize,
    path_count: &mut usize,
    out: &mut Vec<Lit>,
) {
    let (analyze, ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let lit_level = ctx.part(ImplGraphP).level(lit.var());
    if lit_level > 0 && !analyze.var_flags[lit.index()] {
        analyze.var_flags[lit.index()] = true;
        analyze.to_clean.push(lit.var());
        if lit_level >= conflict_level {
            *path_count += 1;
        } else {
            out.push(lit);
        }
    }
}
