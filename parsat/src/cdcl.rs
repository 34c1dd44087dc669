//! Conflict driven clause learning.

use partial_ref::{partial, PartialRef};

use crate::analyze::{analyze_conflict, LearntClause};
use crate::branch::{self, Branch};
use crate::clause::{
    assess_learned_clause, bump_clause_activity, db, decay_clause_activities, reduce,
};
use crate::context::{parts::*, Context};
use crate::exchange;
use crate::prop::{
    backtrack, enqueue_assignment, propagate, safe_attach_clause, Reason,
};
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;

/// Find a conflict, learn clauses and backtrack.
pub fn conflict_step<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut ReduceP,
        mut RestartP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut WatchlistsP,
        SolverConfigP,
    ),
) {
    let conflict = match find_conflict(ctx.borrow()) {
        Ok(()) => {
            if ctx.part(SolverStateP).sat_state == SatState::Unknown {
                ctx.part_mut(SolverStateP).sat_state = SatState::Sat;
            }
            return;
        }
        Err(conflict) => conflict,
    };

    ctx.part_mut(StatsP).conflicts += 1;
    ctx.part_mut(BranchP).on_conflict_found();
    ctx.part_mut(RestartP).on_conflict_found();
    reduce::adjust_on_conflict(ctx.borrow());
    exchange::on_conflict_found(ctx.borrow());
    branch::on_conflict_pre_analyze(ctx.borrow(), conflict);

    if ctx.part(TrailP).current_level() == 0 {
        // Conflict without decisions: the formula is unsatisfiable.
        ctx.part_mut(ProofP).add_clause(&[]);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return;
    }

    let backjump_level = analyze_conflict(ctx.borrow(), conflict);

    {
        // Bump every clause that was resolved in the analysis and feed the usage based policies.
        let involved_count = ctx.part(AnalyzeConflictP).involved().len();
        for index in 0..involved_count {
            let cref = ctx.part(AnalyzeConflictP).involved()[index];
            bump_clause_activity(ctx.borrow(), cref);
            reduce::clause_used_in_conflict(ctx.borrow(), cref);
            exchange::on_clause_used_in_conflict(ctx.borrow(), cref);
        }
    }

    decay_clause_activities(ctx.borrow());
    exchange::drain_promotions(ctx.borrow());

    {
        let clause = std::mem::take(&mut ctx.part_mut(TmpDataP).lits);
        let mut clause = {
            let mut buffer = clause;
            buffer.clear();
            buffer.extend_from_slice(ctx.part(AnalyzeConflictP).clause());
            buffer
        };
        Branch::on_learnt_created(ctx.borrow(), &clause);
        clause.clear();
        ctx.part_mut(TmpDataP).lits = clause;
    }

    ctx.part_mut(BranchP).on_conflict_resolved();

    let glue = ctx.part(AnalyzeConflictP).glue();
    ctx.part_mut(RestartP).on_conflict_resolved(glue);

    // Chronological backtracking keeps the work of the levels between the assertion level and
    // the conflict when the jump would be long.
    let conflict_level = ctx.part(AnalyzeConflictP).conflict_level();
    let chrono = ctx.part(SolverConfigP).chrono;
    let confl_to_chrono = ctx.part(SolverConfigP).confl_to_chrono;
    let backtrack_to = if chrono >= 0
        && ctx.part(StatsP).conflicts > confl_to_chrono
        && (conflict_level - backjump_level) as i64 > chrono
    {
        conflict_level - 1
    } else {
        backjump_level
    };

    backtrack(ctx.borrow(), backtrack_to);

    install_primary_clause(ctx.borrow(), backjump_level);

    if ctx.part(SolverStateP).sat_state != SatState::Unknown || ctx.part(SolverStateP).stopped {
        return;
    }

    let supplementary = ctx.part_mut(AnalyzeConflictP).take_supplementary();
    for learnt in supplementary {
        install_supplementary_clause(ctx.borrow(), learnt);
    }
}

/// Install the primary learned clause and enqueue its asserting literal.
fn install_primary_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
        ReduceP,
        SolverConfigP,
    ),
    backjump_level: usize,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let clause = analyze.clause();
    let glue = analyze.glue();

    ctx.part_mut(ProofP).add_clause(clause);

    let reason = match clause.len() {
        0 => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            return;
        }
        1 => {
            ctx.part_mut(StatsP).learnt_units += 1;
            exchange::on_learnt_unit(ctx.borrow(), clause[0]);
            Reason::Unit
        }
        2 => {
            ctx.part_mut(StatsP).learnt_binaries += 1;
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([clause[0], clause[1]]);
            exchange::on_learnt_binary(ctx.borrow(), [clause[0], clause[1]], glue);
            Reason::Binary([clause[1]])
        }
        _ => {
            if !ctx.part_mut(ClauseAllocP).try_reserve(clause.len()) {
                // Memory exhausted: this instance gives up, others may still finish.
                log::warn!("clause allocation failed, stopping this solver instance");
                ctx.part_mut(SolverStateP).out_of_memory = true;
                ctx.part_mut(SolverStateP).stopped = true;
                return;
            }
            ctx.part_mut(StatsP).learnt_longs += 1;
            let header = assess_learned_clause(ctx.borrow(), clause, glue);
            let cref = db::add_clause(ctx.borrow(), header, clause);
            ctx.part_mut(WatchlistsP)
                .watch_clause(cref, [clause[0], clause[1]]);
            reduce::register_learnt(ctx.borrow(), cref);
            exchange::on_learnt_long(ctx.borrow(), cref);
            Reason::Long(cref)
        }
    };

    enqueue_assignment(ctx.borrow(), clause[0], reason, backjump_level);
}

/// Install an additional clause learned from the same conflict.
///
/// The clause may or may not be asserting under the current assignment; `safe_attach_clause`
/// orders its watches either way and a resulting propagation is enqueued directly.
fn install_supplementary_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
        ReduceP,
        SolverConfigP,
    ),
    learnt: LearntClause,
) {
    let clause = &learnt.lits;
    if clause.len() < 3 {
        // Units and binaries of the extended analyses are rare and always also derivable by the
        // primary analysis of a later conflict; skip the special casing they would need.
        return;
    }
    if !ctx.part_mut(ClauseAllocP).try_reserve(clause.len()) {
        return;
    }

    ctx.part_mut(StatsP).supplementary_learnts += 1;
    ctx.part_mut(ProofP).add_clause(clause);

    let header = assess_learned_clause(ctx.borrow(), clause, learnt.glue);
    let cref = db::add_clause(ctx.borrow(), header, clause);
    safe_attach_clause(ctx.borrow(), cref);
    reduce::register_learnt(ctx.borrow(), cref);
    exchange::on_learnt_long(ctx.borrow(), cref);

    let lits = [
        ctx.part(ClauseAllocP).clause(cref).lits()[0],
        ctx.part(ClauseAllocP).clause(cref).lits()[1],
    ];
    if ctx.part(AssignmentP).lit_value(lits[0]).is_none()
        && ctx.part(AssignmentP).lit_is_false(lits[1])
    {
        let level = ctx.part(ImplGraphP).level(lits[1].var());
        enqueue_assignment(ctx.borrow(), lits[0], Reason::Long(cref), level);
    }
}

/// Find a conflict.
///
/// Returns `Err` if a conflict was found and `Ok` if a satisfying assignment was found instead.
fn find_conflict<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
    ),
) -> Result<(), crate::prop::Conflict> {
    loop {
        propagate(ctx.borrow())?;

        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return Ok(());
        }

        if prove_units(ctx.borrow()) {
            simplify(ctx.borrow());
        }

        exchange::drain_imports(ctx.borrow());
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return Ok(());
        }
        if !ctx.part(TrailP).fully_propagated() {
            continue;
        }

        match Branch::pick_branch_lit(ctx.borrow()) {
            None => return Ok(()),
            Some(decision) => {
                ctx.part_mut(StatsP).decisions += 1;
                ctx.part_mut(TrailP).new_decision_level();
                let level = ctx.part(TrailP).current_level();
                enqueue_assignment(ctx.borrow(), decision, Reason::Unit, level);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    use crate::test::{sat_formula, sgen_unsat_formula};

    #[test]
    fn chronological_backtracking_keeps_intermediate_levels() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 7);
        {
            let config = ctx.part_mut(SolverConfigP);
            config.chrono = 2;
            config.confl_to_chrono = 0;
        }

        // Implied at level 1; part of the later conflict.
        load_clause(ctx.borrow(), &lits![-1, 6]);
        // Deciding 5 propagates 7 and falsifies the long clause.
        load_clause(ctx.borrow(), &lits![-5, 7]);
        load_clause(ctx.borrow(), &lits![-6, -5, -7]);

        for dimacs in 1..=4 {
            ctx.part_mut(TrailP).new_decision_level();
            let level = ctx.part(TrailP).current_level();
            enqueue_assignment(
                ctx.borrow(),
                crate::lit::Lit::from_dimacs(dimacs),
                Reason::Unit,
                level,
            );
            propagate(ctx.borrow()).unwrap();
        }

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(5), Reason::Unit, 5);

        // The analysis backjump level is 1, but the gap to the conflict level exceeds the
        // chrono threshold, so only the conflict level is undone.
        conflict_step(ctx.borrow());

        assert_eq!(ctx.part(TrailP).current_level(), 4);
        for dimacs in 1..=4 {
            assert!(ctx
                .part(AssignmentP)
                .lit_is_true(crate::lit::Lit::from_dimacs(dimacs)));
        }
        assert!(ctx.part(AssignmentP).lit_is_false(lit!(5)));
        assert_eq!(ctx.part(ImplGraphP).level(var!(5)), 1);
    }

    #[test]
    fn level_0_unsat() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        let formula = cnf_formula![
            1, 2, 3;
            -1;
            1, -2;
            2, -3;
        ];

        set_var_count(ctx.borrow(), formula.var_count());

        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }

        while ctx.part(SolverStateP).sat_state == SatState::Unknown {
            conflict_step(ctx.borrow());
        }

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut ctx = Context::default();
            let mut ctx = ctx.into_partial_ref_mut();

            set_var_count(ctx.borrow(), formula.var_count());

            for clause in formula.iter() {
                load_clause(ctx.borrow(), clause);
            }

            while ctx.part(SolverStateP).sat_state == SatState::Unknown {
                conflict_step(ctx.borrow());
            }

            prop_assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut ctx = Context::default();
            let mut ctx = ctx.into_partial_ref_mut();

            set_var_count(ctx.borrow(), formula.var_count());

            for clause in formula.iter() {
                load_clause(ctx.borrow(), clause);
            }

            while ctx.part(SolverStateP).sat_state == SatState::Unknown {
                conflict_step(ctx.borrow());
                prop_assert!(crate::prop::check_watches(ctx.borrow()));
                prop_assert!(reasons_consistent(ctx.borrow()));
            }

            prop_assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Sat);

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|&lit| ctx.part(AssignmentP).lit_is_true(lit)));
            }
        }
    }

    /// Reason clauses propagate their first literal: everything else is false at or below the
    /// propagated literal's level.
    fn reasons_consistent(
        ctx: partial!(Context, AssignmentP, ClauseAllocP, ImplGraphP, TrailP),
    ) -> bool {
        let impl_graph = ctx.part(ImplGraphP);
        let assignment = ctx.part(AssignmentP);
        ctx.part(TrailP).trail().iter().all(|&lit| {
            if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
                let lits = ctx.part(ClauseAllocP).clause(cref).lits();
                lits[0] == lit
                    && lits[1..].iter().all(|&other| {
                        assignment.lit_is_false(other)
                            && impl_graph.level(other.var()) <= impl_graph.level(lit.var())
                    })
            } else {
                true
            }
        })
    }
}
