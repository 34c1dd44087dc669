//! Learns new clauses by analyzing conflicts.
//!
//! The first unique implication point analysis resolves the conflicting clause against the
//! reasons of its literals, in reverse trail order, until a single literal of the conflict level
//! remains. Two optional extensions produce additional clauses from the same conflict: the
//! multi-UIP analysis continues past the first UIP, and the conflict core analysis stops at
//! resolvents that would pull in literals from intermediate decision levels. The level aware
//! policy decides per conflict whether the extensions are worth running.

use std::mem::swap;

use partial_ref::{partial, split_borrow, PartialRef};

use crate::avg_queue::AvgQueue;
use crate::clause::ClauseRef;
use crate::config::{AnalyzeMode, SolverConfig};
use crate::context::{parts::*, Context};
use crate::lit::{Lit, Var};
use crate::prop::{Conflict, Reason};

pub mod conflict_core;
pub mod level_aware;
pub mod minimize;
pub mod multi_uip;

/// A clause produced by conflict analysis.
#[derive(Default)]
pub struct LearntClause {
    /// The literals; for asserting clauses the asserting literal is at index 0 and the literal
    /// with the highest remaining level at index 1.
    pub lits: Vec<Lit>,
    pub glue: usize,
    pub asserting: bool,
}

/// Temporaries and outputs of conflict analysis.
pub struct AnalyzeConflict {
    /// This is the primary learned clause after analysis finishes.
    clause: Vec<Lit>,
    /// Glue of the primary clause.
    glue: usize,
    /// Number of literals in the current clause at the conflict level.
    current_level_count: usize,
    /// Variables in the current clause.
    var_flags: Vec<bool>,
    /// Entries to clean in `var_flags`.
    to_clean: Vec<Var>,
    /// Long clauses involved in the conflict.
    involved: Vec<ClauseRef>,
    /// Stack for recursive minimization.
    stack: Vec<Lit>,
    /// Additional clauses learned from the same conflict.
    supplementary: Vec<LearntClause>,
    /// Trail position of the first UIP.
    uip_index: usize,
    /// Level of the conflict, the maximal level in the conflicting clause.
    conflict_level: usize,
    /// Sliding window over recent conflict levels for the level aware policy.
    level_queue: AvgQueue,
    /// Conflicts during which the level aware policy always adds extra clauses.
    initial_budget: i64,
}

impl Default for AnalyzeConflict {
    fn default() -> AnalyzeConflict {
        let config = SolverConfig::default();
        AnalyzeConflict {
            clause: vec![],
            glue: 0,
            current_level_count: 0,
            var_flags: vec![],
            to_clean: vec![],
            involved: vec![],
            stack: vec![],
            supplementary: vec![],
            uip_index: 0,
            conflict_level: 0,
            level_queue: AvgQueue::new(config.level_aware_window),
            initial_budget: config.initial_conflicts,
        }
    }
}

impl AnalyzeConflict {
    /// Apply a configuration.
    pub fn configure(&mut self, config: &SolverConfig) {
        self.level_queue = AvgQueue::new(config.level_aware_window);
        self.initial_budget = config.initial_conflicts;
    }

    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.var_flags.resize(count, false);
    }

    /// The primary learned clause.
    pub fn clause(&self) -> &[Lit] {
        &self.clause
    }

    /// Glue of the primary learned clause.
    pub fn glue(&self) -> usize {
        self.glue
    }

    /// Long clauses involved in the conflict.
    pub fn involved(&self) -> &[ClauseRef] {
        &self.involved
    }

    /// Take the additional clauses learned from this conflict.
    pub fn take_supplementary(&mut self) -> Vec<LearntClause> {
        std::mem::take(&mut self.supplementary)
    }

    /// The level of the analyzed conflict.
    pub fn conflict_level(&self) -> usize {
        self.conflict_level
    }

    /// A restart happened; the recent conflict levels lose their meaning.
    pub fn on_restart(&mut self) {
        self.level_queue.clear();
    }

    fn mark_var(&mut self, var: Var) {
        self.var_flags[var.index()] = true;
        self.to_clean.push(var);
    }

    fn clear_flags(&mut self) {
        for var in self.to_clean.drain(..) {
            self.var_flags[var.index()] = false;
        }
    }

    fn clear_flags_from(&mut self, top: usize) {
        for var in self.to_clean.drain(top..) {
            self.var_flags[var.index()] = false;
        }
    }
}

/// Learns clauses by analyzing a conflict.
///
/// Returns the lowest decision level that makes the primary learned clause asserting.
pub fn analyze_conflict(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut BranchP,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        SolverConfigP,
        TrailP,
    ),
    conflict: Conflict,
) -> usize {
    {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.clause.clear();
        analyze.involved.clear();
        analyze.supplementary.clear();
        analyze.current_level_count = 0;
        analyze.glue = 0;
    }

    if ctx.part(TrailP).current_level() == 0 {
        // Conflict with no decisions, generate the empty clause
        return 0;
    }

    analyze_first_uip(ctx.borrow(), conflict);

    if ctx.part(AnalyzeConflictP).clause.is_empty() {
        // The conflict involved only top level assignments, which can happen after
        // chronological backtracking. It stands for the empty clause.
        ctx.part_mut(AnalyzeConflictP).clear_flags();
        return 0;
    }

    match ctx.part(SolverConfigP).analyze {
        AnalyzeMode::FirstUip => {
            let analyze = ctx.part_mut(AnalyzeConflictP);
            analyze.clear_flags();
        }
        AnalyzeMode::MultiUip => {
            ctx.part_mut(AnalyzeConflictP).clear_flags();
            multi_uip::collect_multi_uips(ctx.borrow());
            // Without the level aware policy only asserting extra clauses are kept.
            let analyze = ctx.part_mut(AnalyzeConflictP);
            analyze.supplementary.retain(|candidate| candidate.asserting);
        }
        AnalyzeMode::LevelAware => {
            ctx.part_mut(AnalyzeConflictP).clear_flags();
            level_aware::run(ctx.borrow(), conflict);
        }
    }

    debug_assert!(ctx.part(AnalyzeConflictP).to_clean.is_empty());

    // The backjump level is the highest level of the primary clause's tail.
    let analyze = ctx.part(AnalyzeConflictP);
    if analyze.clause.len() > 1 {
        ctx.part(ImplGraphP).level(analyze.clause[1].var())
    } else {
        0
    }
}

/// First UIP analysis, producing the primary learned clause.
///
/// Leaves the variable flags of the clause literals set; the caller clears them once all
/// extensions are done with them.
fn analyze_first_uip(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut BranchP,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        SolverConfigP,
        TrailP,
    ),
    conflict: Conflict,
) {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

    let conflict_level = conflict
        .lits(&lit_ctx)
        .iter()
        .map(|lit| ctx.part(ImplGraphP).level(lit.var()))
        .max()
        .unwrap_or(0);

    ctx.part_mut(AnalyzeConflictP).conflict_level = conflict_level;

    if conflict_level == 0 {
        // All conflict literals are forced at the top level; the clause stays empty.
        return;
    }

    // Reserve index 0 for the asserting literal.
    ctx.part_mut(AnalyzeConflictP).clause.push(Lit::from_code(0));

    let mut path_count = 0;
    for i in 0..conflict.lits(&lit_ctx).len() {
        let lit = conflict.lits(&lit_ctx)[i];
        add_literal(ctx.borrow(), lit, conflict_level, &mut path_count);
    }

    if let Conflict::Long(cref) = conflict {
        ctx.part_mut(AnalyzeConflictP).involved.push(cref);
    }

    // To get rid of all but one literal of the conflict level, we resolve the clause with the
    // reasons of those literals. The correct order for this is reverse chronological. With
    // chronological backtracking the trail can hold literals above the conflict level, those are
    // skipped.
    let mut index = ctx.part(TrailP).trail().len();
    let uip = loop {
        debug_assert!(path_count > 0);
        let lit = loop {
            index -= 1;
            let lit = ctx.part(TrailP).lit_at(index);
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
        if let Reason::Long(cref) = reason {
            ctx.part_mut(AnalyzeConflictP).involved.push(cref);
        }
        for i in 0..reason.lits(&lit_ctx).len() {
            let reason_lit = reason.lits(&lit_ctx)[i];
            add_literal(ctx.borrow(), reason_lit, conflict_level, &mut path_count);
        }
    };

    {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        analyze.clause[0] = !uip;
        analyze.uip_index = index;
    }

    // The asserting literal's own flag stays set while minimization runs, it must never be
    // dropped.
    ctx.part_mut(AnalyzeConflictP).var_flags[uip.index()] = true;

    let glue = minimize::run_primary(ctx.borrow());
    ctx.part_mut(AnalyzeConflictP).var_flags[uip.index()] = false;

    // The clause is still in conflict, so the computed glue is one higher than it will be once
    // the clause asserts after backtracking.
    ctx.part_mut(AnalyzeConflictP).glue = glue.saturating_sub(1);

    move_max_level_to_front(ctx.borrow());
}

/// Add a literal to the primary clause.
fn add_literal(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut BranchP,
        ImplGraphP,
        TrailP
    ),
    lit: Lit,
    conflict_level: usize,
    path_count: &mut usize,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let lit_level = ctx.part(ImplGraphP).level(lit.var());
    // No need to add literals that are set by unit clauses or already present
    if lit_level > 0 && !analyze.var_flags[lit.index()] {
        ctx.part_mut(BranchP).on_var_seen_in_conflict(lit.var());

        analyze.var_flags[lit.index()] = true;
        if lit_level >= conflict_level {
            *path_count += 1;
        } else {
            analyze.clause.push(lit);
            analyze.to_clean.push(lit.var());
        }
    }
}

/// Move the highest level literal of the primary clause's tail into position 1.
///
/// This is important to ensure the watchlist constraints are not violated on backtracking.
fn move_max_level_to_front(
    mut ctx: partial!(Context, mut AnalyzeConflictP, ImplGraphP),
) {
    let (analyze, ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let impl_graph = ctx.part(ImplGraphP);

    if analyze.clause.len() > 2 {
        let (prefix, rest) = analyze.clause.split_at_mut(2);
        let lit_1 = &mut prefix[1];
        let mut max_level = impl_graph.level(lit_1.var());
        for lit in rest.iter_mut() {
            let lit_level = impl_graph.level(lit.var());
            if lit_level > max_level {
                max_level = lit_level;
                swap(lit_1, lit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::prop::{enqueue_assignment, propagate};

    #[test]
    fn first_uip_of_textbook_conflict() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 6);
        ctx.part_mut(SolverConfigP).analyze = AnalyzeMode::FirstUip;

        let formula = cnf_formula![
            -1, -2, 3;
            -1, -3, 4;
            -1, -4, 5;
            -1, -4, -5;
        ];

        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(1), Reason::Unit, 1);
        propagate(ctx.borrow()).unwrap();
        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(2), Reason::Unit, 2);

        let conflict = propagate(ctx.borrow()).unwrap_err();

        let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

        assert_eq!(backtrack_to, 1);
        let mut clause: Vec<Lit> = ctx.part(AnalyzeConflictP).clause().to_vec();
        clause.sort();
        assert_eq!(clause, vec![lit!(-4), lit!(-1)]);
        assert_eq!(ctx.part(AnalyzeConflictP).clause()[0], lit!(-4));
    }
}
