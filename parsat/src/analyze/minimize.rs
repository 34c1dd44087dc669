//! Minimization of learned clauses.
//!
//! Three techniques are combined: recursive self-subsuming resolution (literals whose reasons are
//! fully implied by the rest of the clause are dropped), a cheap non-recursive variant of the
//! same, and resolution against binary clauses (a literal of the clause that is the implication
//! of another, negated clause literal via a binary clause is redundant).

use partial_ref::{partial, split_borrow, PartialRef};

use vec_mut_scan::VecMutScan;

use crate::context::{parts::*, Context};
use crate::glue::compute_glue;
use crate::lit::Lit;
use crate::prop::Reason;

/// Minimize the primary learned clause and return its glue.
pub(super) fn run_primary(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        SolverConfigP,
    ),
) -> usize {
    let mut lits = std::mem::take(&mut ctx.part_mut(AnalyzeConflictP).clause);
    let glue = run(ctx.borrow(), &mut lits, 1);
    ctx.part_mut(AnalyzeConflictP).clause = lits;
    glue
}

/// Minimize a learned clause, keeping the first `start_idx` literals, and return its glue.
///
/// Requires the variable flags of all clause literals to be set. More flags may be set on return,
/// they are recorded in the analyzer's clean list.
pub(super) fn run(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        SolverConfigP,
    ),
    lits: &mut Vec<Lit>,
    start_idx: usize,
) -> usize {
    let mut glue = compute_glue(ctx.borrow(), lits);

    let ccmin_mode = ctx.part(SolverConfigP).ccmin_mode;
    if ccmin_mode == 2 {
        let full = glue <= ctx.part(SolverConfigP).max_full_implication_min_lbd;
        if full {
            minimize_recursive(ctx.borrow(), lits, start_idx);
        } else {
            minimize_local(ctx.borrow(), lits, start_idx);
        }
    } else if ccmin_mode == 1 {
        minimize_local(ctx.borrow(), lits, start_idx);
    }

    if lits.len() <= ctx.part(SolverConfigP).max_ext_bin_res_size {
        let probe_count = lits.len().saturating_sub(1);
        if bin_res_minimize(ctx.borrow(), lits, start_idx, probe_count) {
            glue = compute_glue(ctx.borrow(), lits).min(glue + 1);
        }
    } else if glue <= 6 && lits.len() <= 30 {
        // Try further minimization with the first literal only.
        if bin_res_minimize(ctx.borrow(), lits, start_idx, 1) {
            glue = compute_glue(ctx.borrow(), lits).min(glue + 1);
        }
    }

    glue
}

/// A Bloom filter of levels.
#[derive(Default)]
struct LevelAbstraction {
    bits: u64,
}

impl LevelAbstraction {
    /// Add a level to the Bloom filter.
    pub fn add(&mut self, level: usize) {
        self.bits |= 1 << (level % 64)
    }

    /// Test whether a level could be in the Bloom filter.
    pub fn test(&self, level: usize) -> bool {
        self.bits & (1 << (level % 64)) != 0
    }
}

/// Performs recursive clause minimization.
///
/// This routine tries to remove some redundant literals of the learned clause. The idea is to
/// detect literals of the learned clause that are already implied by other literals of the
/// clause.
///
/// This is done by performing a DFS in the implication graph (following edges in reverse) for
/// each literal (apart from the first `start_idx` ones). The search doesn't expand literals
/// already known to be implied by literals of the clause. When a decision literal that is not in
/// the clause is found, it means that the literal is not redundant.
///
/// There are two optimizations used here: The first one is to stop the search as soon as a
/// literal of a decision level not present in the clause is found. If the DFS would be continued
/// it would at some point reach the decision of that level. That decision belongs to a level not
/// in the clause and thus itself can't be in the clause. Checking whether the decision level is
/// among the clause's decision levels is done approximately using a Bloom filter.
///
/// The other optimization is to avoid duplicating work during the DFS searches. When one literal
/// is found to be redundant that means the whole search stayed within the implied literals. We
/// remember this and will not expand any of these literals for the following DFS searches.
///
/// The var flags array here has two purposes. At the beginning it is set for all the literals of
/// the clause. It is also used to mark the literals visited during the DFS. This allows us to
/// combine the already-visited-check with the literal-present-in-clause check. It also allows for
/// a neat implementation of the second optimization. When the search finds the literal to be
/// non-redundant, we clear the flags for the literals we visited, resetting them to the state at
/// the beginning of the DFS. When the literal was redundant we keep them as is. This means the
/// following DFS will not expand these literals.
fn minimize_recursive(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        ClauseAllocP,
        ImplGraphP,
    ),
    lits: &mut Vec<Lit>,
    start_idx: usize,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let impl_graph = ctx.part(ImplGraphP);

    let mut involved_levels = LevelAbstraction::default();

    for &lit in lits.iter() {
        involved_levels.add(impl_graph.level(lit.var()));
    }

    let mut scan = VecMutScan::new(lits);

    for _ in 0..start_idx {
        scan.next();
    }

    'next_lit: while let Some(lit) = scan.next() {
        if impl_graph.reason(lit.var()) == &Reason::Unit {
            continue;
        }

        // Start the DFS
        analyze.stack.clear();
        analyze.stack.push(!*lit);

        // Used to remember which var flags are set during this DFS
        let top = analyze.to_clean.len();

        while let Some(lit) = analyze.stack.pop() {
            let reason = impl_graph.reason(lit.var());

            for &reason_lit in reason.lits(&lit_ctx) {
                let reason_level = impl_graph.level(reason_lit.var());

                if !analyze.var_flags[reason_lit.index()] && reason_level > 0 {
                    // We haven't established reason_lit to be redundant, haven't visited it yet
                    // and it's not implied by unit clauses.

                    if impl_graph.reason(reason_lit.var()) == &Reason::Unit
                        || !involved_levels.test(reason_level)
                    {
                        // reason_lit is a decision not in the clause or in a decision level known
                        // not to be in the clause. Abort the search.

                        // Reset the var flags set during _this_ DFS.
                        for var in analyze.to_clean.drain(top..) {
                            analyze.var_flags[var.index()] = false;
                        }
                        continue 'next_lit;
                    } else {
                        analyze.var_flags[reason_lit.index()] = true;
                        analyze.to_clean.push(reason_lit.var());
                        analyze.stack.push(!reason_lit);
                    }
                }
            }
        }

        lit.remove();
    }
}

/// Non-recursive clause minimization.
///
/// A literal is dropped when every literal of its reason is either in the clause or assigned at
/// level 0. This is the depth one special case of the recursive variant, used when the clause
/// quality does not justify full searches.
fn minimize_local(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        ClauseAllocP,
        ImplGraphP,
    ),
    lits: &mut Vec<Lit>,
    start_idx: usize,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let impl_graph = ctx.part(ImplGraphP);

    let mut scan = VecMutScan::new(lits);

    for _ in 0..start_idx {
        scan.next();
    }

    while let Some(lit) = scan.next() {
        let reason = impl_graph.reason(lit.var());
        if reason == &Reason::Unit {
            continue;
        }

        let redundant = reason.lits(&lit_ctx).iter().all(|&reason_lit| {
            analyze.var_flags[reason_lit.index()] || impl_graph.level(reason_lit.var()) == 0
        });

        if redundant {
            lit.remove();
        }
    }
}

/// Resolution of clause literals against binary clauses.
///
/// For each of the first `probe_count` literals `l`, look at all binary clauses `(l ∨ r)`. When
/// `r` is true and a literal of the clause, the clause can be resolved with the binary clause to
/// drop `r`. Returns true when any literal was removed.
fn bin_res_minimize(
    mut ctx: partial!(
        Context,
        mut ImplGraphP,
        AssignmentP,
        BinaryClausesP,
    ),
    lits: &mut Vec<Lit>,
    start_idx: usize,
    probe_count: usize,
) -> bool {
    let (impl_graph, ctx) = ctx.split_part_mut(ImplGraphP);
    let assignment = ctx.part(AssignmentP);
    let binary_clauses = ctx.part(BinaryClausesP);

    impl_graph.new_epoch();
    for &lit in lits.iter() {
        impl_graph.mark(lit.index());
    }

    let mut removed_some = false;

    for i in 0..probe_count.min(lits.len()) {
        for &other in binary_clauses.implied(!lits[i]) {
            if impl_graph.is_marked(other.index()) && assignment.lit_is_true(other) {
                impl_graph.unmark(other.index());
                removed_some = true;
            }
        }
    }

    if removed_some {
        let mut index = 0;
        lits.retain(|lit| {
            let keep = index < start_idx || impl_graph.is_marked(lit.index());
            index += 1;
            keep
        });
    }

    removed_some
}
