//! Level aware analysis policy.
//!
//! Tracks a sliding window average of recent conflict levels. Conflicts close to or below that
//! average are the ones worth investing extra work in: the search is near the trail prefix it
//! keeps coming back to, so additional clauses relating its UIPs are likely to be useful again.
//! For those conflicts the conflict core analysis and the multi-UIP analysis run in addition to
//! the first UIP analysis, and the shortest asserting clause of all of them drives the backjump.

use partial_ref::{partial, PartialRef};

use super::{conflict_core, multi_uip};
use crate::context::{parts::*, Context};
use crate::prop::Conflict;

pub(super) fn run(
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
) {
    let conflict_level = ctx.part(AnalyzeConflictP).conflict_level;
    let level_diff_enforce = ctx.part(SolverConfigP).level_diff_enforce;

    let add_clauses = level_diff_enforce > 0 && {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.initial_budget -= 1;
        analyze.initial_budget >= 0
            || !analyze.level_queue.full()
            || analyze.level_queue.avg() - conflict_level as f64 >= level_diff_enforce as f64
    };

    if ctx.part(AnalyzeConflictP).clause.len() > 1 && add_clauses {
        if let Some(mut candidate) = conflict_core::run_conflict_core(ctx.borrow(), conflict) {
            let analyze = ctx.part_mut(AnalyzeConflictP);
            if candidate.asserting {
                if candidate.lits.len() < analyze.clause.len() {
                    // The conflict core clause is the better backjump driver.
                    std::mem::swap(&mut analyze.clause, &mut candidate.lits);
                    std::mem::swap(&mut analyze.glue, &mut candidate.glue);
                    analyze.supplementary.push(candidate);
                } else if candidate.lits[0] == analyze.clause[0] {
                    // Very likely the same clause, adding it again is useless.
                } else {
                    analyze.supplementary.push(candidate);
                }
            } else if candidate.lits.len() > analyze.clause.len() {
                // Longer and not asserting, certainly meaningless.
            } else {
                // The glue of a non-asserting clause is not meaningful, use a pessimistic value.
                candidate.glue = candidate.lits.len().saturating_sub(1);
                analyze.supplementary.push(candidate);
            }
        }

        multi_uip::collect_multi_uips(ctx.borrow());
    }

    ctx.part_mut(AnalyzeConflictP)
        .level_queue
        .push(conflict_level as i64);
}
