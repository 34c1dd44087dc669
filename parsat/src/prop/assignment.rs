//! Partial assignment and backtracking.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::{Lit, LitIdx, Var};

use super::Reason;

/// Current partial assignment.
#[derive(Default)]
pub struct Assignment {
    assignment: Vec<Option<bool>>,
}

/// This compares two `Option<bool>` values as bytes. Workaround for bad code generation.
pub fn fast_option_eq(a: Option<bool>, b: Option<bool>) -> bool {
    unsafe { std::mem::transmute::<_, u8>(a) == std::mem::transmute::<_, u8>(b) }
}

impl Assignment {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.assignment.resize(count, None);
    }

    /// Current partial assignment as slice.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Value assigned to a variable.
    pub fn var_value(&self, var: Var) -> Option<bool> {
        self.assignment[var.index()]
    }

    /// Value assigned to a literal.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.index()].map(|b| b ^ lit.is_negative())
    }

    pub fn lit_is_true(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_positive()))
    }

    pub fn lit_is_false(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_negative()))
    }

    pub fn lit_is_unk(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], None)
    }

    pub fn assign_lit(&mut self, lit: Lit) {
        self.assignment[lit.index()] = lit.is_positive().into()
    }

    pub fn unassign_var(&mut self, var: Var) {
        self.assignment[var.index()] = None;
    }
}

/// Decision and propagation history.
#[derive(Default)]
pub struct Trail {
    /// Stack of all propagated and all enqueued assignments
    trail: Vec<Lit>,
    /// Next assignment in trail to propagate
    queue_head_pos: usize,
    /// Decision levels as trail indices.
    decisions: Vec<LitIdx>,
    /// Number of unit clauses removed from the trail.
    units_removed: usize,
    /// Reusable buffer for literals preserved across chronological backtracking.
    kept_low_lits: Vec<Lit>,
}

impl Trail {
    /// Return the next assigned literal to propagate.
    pub fn queue_head(&self) -> Option<Lit> {
        self.trail.get(self.queue_head_pos).cloned()
    }

    ///  Return the next assigned literal to propagate and remove it from the queue.
    pub fn pop_queue(&mut self) -> Option<Lit> {
        let head = self.queue_head();
        if head.is_some() {
            self.queue_head_pos += 1;
        }
        head
    }

    /// Re-enqueue all assigned literals.
    pub fn reset_queue(&mut self) {
        self.queue_head_pos = 0;
    }

    /// Assigned literals in assignment order.
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    /// The literal at a given trail position.
    pub fn lit_at(&self, index: usize) -> Lit {
        self.trail[index]
    }

    /// Clear the trail.
    ///
    /// This simply removes all entries without performing any backtracking. Can only be called
    /// with no active decisions.
    pub fn clear(&mut self) {
        assert!(self.decisions.is_empty());
        self.units_removed += self.trail.len();
        self.trail.clear();
        self.queue_head_pos = 0;
    }

    /// Start a new decision level.
    ///
    /// Does not enqueue the decision itself.
    pub fn new_decision_level(&mut self) {
        self.decisions.push(self.trail.len() as LitIdx)
    }

    /// Current decision level.
    pub fn current_level(&self) -> usize {
        self.decisions.len()
    }

    /// Trail index at which the given decision level starts.
    pub fn level_start(&self, level: usize) -> usize {
        if level == 0 {
            0
        } else {
            self.decisions[level - 1] as usize
        }
    }

    /// The number of assignments at level 0.
    pub fn top_level_assignment_count(&self) -> usize {
        self.decisions
            .get(0)
            .map(|&len| len as usize)
            .unwrap_or(self.trail.len())
            + self.units_removed
    }

    /// Whether all assignments are processed.
    pub fn fully_propagated(&self) -> bool {
        self.queue_head_pos == self.trail.len()
    }

    /// Append a literal without bookkeeping, used by the vivification sub-search.
    pub(crate) fn push_lit(&mut self, lit: Lit) {
        self.trail.push(lit);
    }

    /// Drop all literals past the given length and stop propagating them.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.trail.truncate(len);
        self.queue_head_pos = len;
    }
}

/// Enqueues the assignment of true to a literal.
///
/// This updates the assignment and trail, but does not perform any propagation. The literal has
/// to be unassigned when calling this.
///
/// The level is the decision level the assignment belongs to. With chronological backtracking
/// enabled this can be below the current decision level.
pub fn enqueue_assignment(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ImplGraphP,
        mut TrailP
    ),
    lit: Lit,
    reason: Reason,
    level: usize,
) {
    let assignment = ctx.part_mut(AssignmentP);
    debug_assert!(assignment.lit_value(lit) == None);

    assignment.assign_lit(lit);

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    trail.trail.push(lit);

    let node = &mut ctx.part_mut(ImplGraphP).nodes[lit.index()];
    node.reason = reason;
    node.level = level as LitIdx;

    ctx.part_mut(BranchP).on_var_assigned(lit.var());
}

/// Undo all assignments in decision levels deeper than the given level.
///
/// Literals in the removed suffix of the trail that were assigned at a level at or below the
/// target level are kept. They are re-appended to the trail in their original order and queued
/// for re-propagation. Such out-of-order literals only exist after chronological backtracking.
pub fn backtrack(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut TrailP,
        ImplGraphP
    ),
    level: usize,
) {
    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    if level >= trail.decisions.len() {
        return;
    }

    let new_trail_len = trail.decisions[level] as usize;

    let (assignment, mut ctx) = ctx.split_part_mut(AssignmentP);
    let (branch, ctx) = ctx.split_part_mut(BranchP);
    let impl_graph = ctx.part(ImplGraphP);

    let mut kept = std::mem::take(&mut trail.kept_low_lits);

    for &lit in &trail.trail[new_trail_len..] {
        if impl_graph.level(lit.var()) <= level {
            kept.push(lit);
        } else {
            branch.on_var_unassigned(lit.var(), assignment.var_value(lit.var()) == Some(true));
            assignment.unassign_var(lit.var());
        }
    }

    trail.trail.truncate(new_trail_len);
    trail.trail.extend_from_slice(&kept);
    trail.queue_head_pos = new_trail_len;
    trail.decisions.truncate(level);

    kept.clear();
    trail.kept_low_lits = kept;
}

/// Undo all decisions.
pub fn restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut TrailP,
        ImplGraphP
    ),
) {
    backtrack(ctx.borrow(), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use crate::context::set_var_count;

    #[test]
    fn enqueue_and_backtrack() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        enqueue_assignment(ctx.borrow(), lit!(1), Reason::Unit, 0);
        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(-2), Reason::Unit, 1);
        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(3), Reason::Unit, 2);

        assert_eq!(ctx.part(TrailP).trail(), &lits![1, -2, 3]);
        assert_eq!(ctx.part(TrailP).current_level(), 2);
        assert!(ctx.part(AssignmentP).lit_is_true(lit!(3)));

        backtrack(ctx.borrow(), 1);

        assert_eq!(ctx.part(TrailP).trail(), &lits![1, -2]);
        assert_eq!(ctx.part(TrailP).current_level(), 1);
        assert!(ctx.part(AssignmentP).lit_is_unk(lit!(3)));
        assert!(ctx.part(AssignmentP).lit_is_true(lit!(-2)));

        backtrack(ctx.borrow(), 0);
        assert_eq!(ctx.part(TrailP).trail(), &lits![1]);
        assert_eq!(ctx.part(TrailP).current_level(), 0);
    }

    #[test]
    fn backtrack_keeps_out_of_order_assignments() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 5);

        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(1), Reason::Unit, 1);
        ctx.part_mut(TrailP).new_decision_level();
        enqueue_assignment(ctx.borrow(), lit!(2), Reason::Unit, 2);
        // Chronological backtracking can assign literals below the current decision level.
        enqueue_assignment(ctx.borrow(), lit!(3), Reason::Unit, 1);
        enqueue_assignment(ctx.borrow(), lit!(4), Reason::Unit, 2);

        backtrack(ctx.borrow(), 1);

        assert_eq!(ctx.part(TrailP).trail(), &lits![1, 3]);
        assert!(ctx.part(AssignmentP).lit_is_true(lit!(3)));
        assert!(ctx.part(AssignmentP).lit_is_unk(lit!(2)));
        assert!(ctx.part(AssignmentP).lit_is_unk(lit!(4)));
        // The preserved literal is queued for re-propagation.
        assert_eq!(ctx.part(TrailP).queue_head(), Some(lit!(3)));
    }
}
