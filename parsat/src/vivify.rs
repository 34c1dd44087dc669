//! Clause vivification.
//!
//! Vivification shortens a clause by trial propagation: assert the negation of its literals one
//! by one under the reduced propagation engine. When this derives a conflict or satisfies a
//! remaining literal, a backwards scan over the temporary trail extracts an implied subclause,
//! which replaces the original clause. Runs at restart boundaries on the better clause tiers.

use partial_ref::{partial, split_borrow, PartialRef};

use crate::clause::{db, ClauseRef, Tier};
use crate::context::{parts::*, Context};
use crate::lit::{Lit, Var};
use crate::prop::simple::{cancel_to_mark, simple_enqueue, simple_propagate, TRIAL_LEVEL};
use crate::prop::{safe_attach_clause, Conflict, Reason};
use crate::state::SatState;

/// Vivification scheduling and scratch space.
pub struct Vivify {
    next_run: u64,
    queue: Vec<ClauseRef>,
    seen: Vec<bool>,
    to_clear: Vec<Var>,
    simp_clause: Vec<Lit>,
    lits: Vec<Lit>,
    trail_mark: usize,
}

impl Default for Vivify {
    fn default() -> Vivify {
        Vivify {
            next_run: crate::config::SolverConfig::default().vivify_interval,
            queue: vec![],
            seen: vec![],
            to_clear: vec![],
            simp_clause: vec![],
            lits: vec![],
            trail_mark: 0,
        }
    }
}

impl Vivify {
    /// Apply a configuration.
    pub fn configure(&mut self, config: &crate::config::SolverConfig) {
        self.next_run = config.vivify_interval;
    }

    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.seen.resize(count, false);
    }

    fn mark(&mut self, var: Var) {
        if !self.seen[var.index()] {
            self.seen[var.index()] = true;
            self.to_clear.push(var);
        }
    }

    fn clear_marks(&mut self) {
        for var in self.to_clear.drain(..) {
            self.seen[var.index()] = false;
        }
    }
}

/// Run a vivification pass if one is due.
///
/// Requires a fully propagated trail at level 0.
pub fn vivify_due(mut ctx: partial!(Context, mut VivifyP, SolverConfigP, StatsP)) -> bool {
    let interval = ctx.part(SolverConfigP).vivify_interval;
    if interval == 0 {
        return false;
    }
    if ctx.part(StatsP).conflicts < ctx.part(VivifyP).next_run {
        return false;
    }
    let conflicts = ctx.part(StatsP).conflicts;
    ctx.part_mut(VivifyP).next_run = conflicts + interval;
    true
}

/// Vivify the clauses of the core and mid tiers, within the configured budget.
pub fn vivify_round<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut BinaryClausesP,
        mut BranchP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VivifyP,
        mut WatchlistsP,
        SolverConfigP,
    ),
) {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);
    debug_assert!(ctx.part(TrailP).fully_propagated());

    crate::prop::ensure_watchlists(ctx.borrow());

    let budget = ctx.part(SolverConfigP).vivify_budget;

    let mut queue = std::mem::take(&mut ctx.part_mut(VivifyP).queue);
    queue.clear();
    for &tier in [Tier::Core, Tier::Mid].iter() {
        for &cref in ctx.part(ClauseDbP).by_tier(tier) {
            if queue.len() >= budget {
                break;
            }
            let header = ctx.part(ClauseAllocP).header(cref);
            if !header.deleted() && !header.simplified() && header.tier() == tier {
                queue.push(cref);
            }
        }
    }

    for index in 0..queue.len() {
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            break;
        }
        let cref = queue[index];
        if db::is_locked(ctx.borrow(), cref) {
            continue;
        }
        if vivify_clause(ctx.borrow(), cref) {
            ctx.part_mut(StatsP).vivified_clauses += 1;
        }
        if !ctx.part(ClauseAllocP).header(cref).deleted() {
            ctx.part_mut(ClauseAllocP).header_mut(cref).set_simplified(true);
        }

        // Deriving a unit leaves it enqueued; settle it before the next trial propagation.
        if !ctx.part(TrailP).fully_propagated()
            && crate::prop::propagate(ctx.borrow()).is_err()
        {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            break;
        }
    }

    ctx.part_mut(VivifyP).queue = queue;
}

/// Vivify a single clause. Returns true when the clause shrank.
fn vivify_clause<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut BinaryClausesP,
        mut BranchP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut VivifyP,
        mut WatchlistsP,
    ),
    cref: ClauseRef,
) -> bool {
    let trail_mark = ctx.part(TrailP).trail().len();
    ctx.part_mut(VivifyP).trail_mark = trail_mark;

    // Propagation permutes clause literals, work on a copy.
    let mut lits = std::mem::take(&mut ctx.part_mut(VivifyP).lits);
    lits.clear();
    lits.extend_from_slice(ctx.part(ClauseAllocP).clause(cref).lits());

    let mut conflict = None;
    let mut true_lit = None;
    let mut saw_true = false;
    let mut propagated = 0usize;

    for &lit in lits.iter() {
        match ctx.part(AssignmentP).lit_value(lit) {
            None => {
                propagated += 1;
                simple_enqueue(ctx.borrow(), !lit, Reason::Unit);
                if let Err(found) = simple_propagate(ctx.borrow()) {
                    conflict = Some(found);
                    break;
                }
            }
            Some(true) => {
                // The clause is entailed by a strict subset of its negated literals ending in
                // this one; analyze from the reason of the satisfied literal.
                saw_true = true;
                if let &Reason::Long(reason_cref) = ctx.part(ImplGraphP).reason(lit.var()) {
                    true_lit = Some((lit, reason_cref));
                }
                break;
            }
            Some(false) => (),
        }
    }

    let mut shrunken = false;

    if let Some(found) = conflict {
        ctx.part_mut(VivifyP).simp_clause.clear();
        simple_analyze(ctx.borrow(), found, false);
        shrunken = replace_if_shorter(ctx.borrow(), cref);
    } else if let Some((lit, reason_cref)) = true_lit {
        ctx.part_mut(VivifyP).simp_clause.clear();
        ctx.part_mut(VivifyP).simp_clause.push(lit);
        simple_analyze(ctx.borrow(), Conflict::Long(reason_cref), true);
        shrunken = replace_if_shorter(ctx.borrow(), cref);
    } else if !saw_true && propagated < lits.len() {
        // Some literals were already false when their turn came; they are implied false by the
        // negations of the other literals and can be dropped. Only the trial assignments stay.
        let mut simp_clause = std::mem::take(&mut ctx.part_mut(VivifyP).simp_clause);
        simp_clause.clear();
        for &lit in lits.iter() {
            debug_assert!(ctx.part(AssignmentP).lit_is_false(lit));
            let impl_graph = ctx.part(ImplGraphP);
            if impl_graph.reason(lit.var()).is_unit()
                && impl_graph.level(lit.var()) == TRIAL_LEVEL
            {
                simp_clause.push(lit);
            }
        }
        ctx.part_mut(VivifyP).simp_clause = simp_clause;
        shrunken = replace_if_shorter(ctx.borrow(), cref);
    }

    let trail_mark = ctx.part(VivifyP).trail_mark;
    cancel_to_mark(ctx.borrow(), trail_mark);

    if !ctx.part(ClauseAllocP).header(cref).deleted() {
        let header = ctx.part_mut(ClauseAllocP).header_mut(cref);
        if propagated < header.glue() {
            header.set_glue(propagated);
        }
    }

    lits.clear();
    ctx.part_mut(VivifyP).lits = lits;

    shrunken
}

/// Replace the clause with the extracted subclause when it is shorter.
///
/// The clause is detached, rewritten in place and reattached; shrinking to a binary or unit
/// clause moves it out of the arena.
fn replace_if_shorter<'a>(
    mut ctx: partial!(
        Context<'a>,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP<'a>,
        mut SolverStateP,
        mut TrailP,
        mut VivifyP,
        mut WatchlistsP,
    ),
    cref: ClauseRef,
) -> bool {
    let new_len = ctx.part(VivifyP).simp_clause.len();
    let old_len = ctx.part(ClauseAllocP).header(cref).len();
    if new_len == 0 || new_len >= old_len {
        return false;
    }

    {
        let old_lits = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        let (vivify, mut ctx) = ctx.split_part(VivifyP);
        let proof = ctx.part_mut(ProofP);
        proof.add_clause(&vivify.simp_clause);
        proof.delete_clause(&old_lits);
    }

    // Detach the old watches; the rewrite changes which literals are watched.
    for i in 0..2 {
        let watched = !ctx.part(ClauseAllocP).clause(cref).lits()[i];
        ctx.part_mut(WatchlistsP).remove_watch(watched, cref);
    }

    let mut simp_clause = std::mem::take(&mut ctx.part_mut(VivifyP).simp_clause);

    match simp_clause[..] {
        [lit] => {
            db::delete_clause(ctx.borrow(), cref);
            let trail_mark = ctx.part(VivifyP).trail_mark;
            cancel_to_mark(ctx.borrow(), trail_mark);
            match ctx.part(AssignmentP).lit_value(lit) {
                Some(true) => (),
                Some(false) => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
                None => crate::prop::enqueue_assignment(ctx.borrow(), lit, Reason::Unit, 0),
            }
            // Everything up to here is a permanent level 0 assignment now.
            let new_mark = ctx.part(TrailP).trail().len();
            ctx.part_mut(VivifyP).trail_mark = new_mark;
        }
        [lit_0, lit_1] => {
            db::delete_clause(ctx.borrow(), cref);
            ctx.part_mut(BinaryClausesP).add_binary_clause([lit_0, lit_1]);
        }
        _ => {
            {
                let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
                let clause = alloc.clause_mut(cref);
                clause.lits_mut()[..new_len].copy_from_slice(&simp_clause);
                clause.header_mut().set_len(new_len);
                // The dropped literal words become garbage within the arena.
                ctx.part_mut(ClauseDbP).add_garbage(old_len - new_len);
            }
            safe_attach_clause(ctx.borrow(), cref);
        }
    }

    simp_clause.clear();
    ctx.part_mut(VivifyP).simp_clause = simp_clause;
    true
}

/// Backwards scan extracting the subclause justified by the temporary propagation.
///
/// Follows the implication graph from the conflict back to the trial assignments. Trial
/// assignments have no reason and end up in the extracted clause (negated); everything else is
/// expanded further.
fn simple_analyze(
    mut ctx: partial!(
        Context,
        mut VivifyP,
        ClauseAllocP,
        ImplGraphP,
        TrailP,
    ),
    conflict: Conflict,
    true_conflict: bool,
) {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let (vivify, mut ctx) = ctx.split_part_mut(VivifyP);
    let (trail, ctx) = ctx.split_part(TrailP);
    let impl_graph = ctx.part(ImplGraphP);

    let mut path_count = 0usize;
    let mut index = trail.trail().len();

    // Seed with the conflicting clause, skipping the satisfied literal for a true conflict.
    let skip = true_conflict as usize;
    for &lit in conflict.lits(&lit_ctx).iter().skip(skip) {
        vivify.mark(lit.var());
        path_count += 1;
    }

    loop {
        if path_count == 0 {
            break;
        }

        // Scan only the trial region; everything marked below it (or no longer on the trail at
        // all) is implied at level 0 and contributes nothing to the extracted clause.
        let found = loop {
            if index <= vivify.trail_mark {
                break None;
            }
            index -= 1;
            let lit = trail.lit_at(index);
            if vivify.seen[lit.index()] {
                break Some(lit);
            }
        };
        let lit = match found {
            Some(lit) => lit,
            None => break,
        };

        vivify.seen[lit.index()] = false;
        path_count -= 1;

        let reason = impl_graph.reason(lit.var());
        if reason.is_unit() {
            // A trial assignment, it becomes part of the extracted clause.
            vivify.simp_clause.push(!lit);
        } else {
            for &reason_lit in reason.lits(&lit_ctx) {
                if !vivify.seen[reason_lit.index()] {
                    vivify.mark(reason_lit.var());
                    path_count += 1;
                }
            }
        }
    }

    vivify.clear_marks();
}
