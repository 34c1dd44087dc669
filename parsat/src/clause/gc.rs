//! Garbage collection of long clauses.
use partial_ref::{partial, PartialRef};

use rustc_hash::FxHashMap;

use crate::context::{parts::*, Context};
use crate::prop::Reason;

use super::{ClauseAlloc, Tier};

/// Perform a garbage collection of long clauses if necessary.
///
/// Collecting when a fixed fraction of the allocation is garbage amortizes collection costs.
pub fn collect_garbage(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut StatsP,
        mut WatchlistsP,
        SolverConfigP,
        TrailP,
    ),
) {
    let alloc = ctx.part(ClauseAllocP);
    let db = ctx.part(ClauseDbP);
    let garbage_frac = ctx.part(SolverConfigP).garbage_frac;

    if db.garbage_size as f64 > alloc.buffer_size() as f64 * garbage_frac {
        collect_garbage_now(ctx.borrow());
    }
}

/// Unconditionally perform a garbage collection of long clauses.
///
/// Every clause moves to a fresh allocator. All clause reference holders are rewritten: the
/// database lists, the trail reasons and the exchanger queues. The watchlists are invalidated
/// wholesale and rebuilt before the next propagation.
pub fn collect_garbage_now(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut StatsP,
        mut WatchlistsP,
        TrailP,
    ),
) {
    ctx.part_mut(WatchlistsP).disable();

    let (db, mut ctx) = ctx.split_part_mut(ClauseDbP);
    let alloc = ctx.part(ClauseAllocP);

    assert!(
        db.garbage_size <= alloc.buffer_size(),
        "Inconsistent garbage tracking in ClauseDb"
    );
    let current_size = alloc.buffer_size() - db.garbage_size;

    // Allocating just the current size would lead to an immediate growing when new clauses are
    // learned, overallocating here avoids that.
    let mut new_alloc = ClauseAlloc::with_capacity(current_size * 2);

    let mut forward = FxHashMap::default();
    let mut new_clauses = vec![];
    let mut new_by_tier: [Vec<_>; Tier::count()] = Default::default();

    for &cref in db.clauses.iter() {
        let clause = alloc.clause(cref);
        let mut header = clause.header().clone();
        if header.deleted() {
            continue;
        }
        header.set_mark(false);

        let new_cref = new_alloc.add_clause(header.clone(), clause.lits());
        forward.insert(cref, new_cref);

        new_clauses.push(new_cref);
        new_by_tier[header.tier() as usize].push(new_cref);
    }

    // Trail reasons survive the collection.
    {
        let (trail, mut ctx) = ctx.split_part(TrailP);
        let impl_graph = ctx.part_mut(ImplGraphP);
        for &lit in trail.trail().iter() {
            if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
                let new_cref = forward[&cref];
                impl_graph.update_reason(lit.var(), Reason::Long(new_cref));
            }
        }
    }

    // The exchanger queues are the remaining root set.
    for root in ctx.part_mut(ExchangeP).cref_roots_mut().iter_mut() {
        root.retain(|cref| forward.contains_key(cref));
        for cref in root.iter_mut() {
            *cref = forward[cref];
        }
    }

    *ctx.part_mut(ClauseAllocP) = new_alloc;
    db.clauses = new_clauses;
    db.by_tier = new_by_tier;
    db.garbage_size = 0;

    ctx.part_mut(StatsP).collections += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cmp::max;

    use partial_ref::IntoPartialRefMut;
    use proptest::*;

    use crate::clause::{db, ClauseHeader};
    use crate::cnf::strategy::*;
    use crate::context::set_var_count;
    use crate::lit::Lit;
    use crate::prop::enqueue_assignment;

    proptest! {
        #[test]
        fn garbage_collection(
            input_a in cnf_formula(2..100usize, 500..1000, 3..30),
            input_b in cnf_formula(2..100usize, 10..500, 4..20),
        ) {
            let mut ctx = Context::default();
            let mut ctx = ctx.into_partial_ref_mut();

            set_var_count(ctx.borrow(), max(input_a.var_count(), input_b.var_count()));

            let mut crefs_a = vec![];
            let mut crefs_b = vec![];

            for lits in input_a.iter() {
                let header = ClauseHeader::new();
                let cref = db::add_clause(ctx.borrow(), header, lits);
                crefs_a.push(cref);
            }

            for lits in input_b.iter() {
                let header = ClauseHeader::new();
                let cref = db::add_clause(ctx.borrow(), header, lits);
                crefs_b.push(cref);

                if ctx.part(AssignmentP).lit_value(lits[0]) == None {
                    // This isn't consistent, as the clause isn't actually propagating, but that
                    // isn't checked during garbage collection
                    enqueue_assignment(ctx.borrow(), lits[0], Reason::Long(cref), 0);
                }
            }

            for cref in crefs_a {
                db::delete_clause(ctx.borrow(), cref);
                prop_assert!(ctx.part(ClauseDbP).garbage_size() > 0);
            }

            let old_buffer_size = ctx.part(ClauseAllocP).buffer_size();

            collect_garbage_now(ctx.borrow());

            prop_assert_eq!(ctx.part(ClauseDbP).garbage_size(), 0);
            prop_assert!(old_buffer_size > ctx.part(ClauseAllocP).buffer_size());
            prop_assert!(!ctx.part(WatchlistsP).enabled());

            let mut output_clauses: Vec<Vec<Lit>> = vec![];

            for &cref in ctx.part(ClauseDbP).clauses().iter() {
                let clause = ctx.part(ClauseAllocP).clause(cref);
                if clause.header().deleted() {
                    continue;
                }
                output_clauses.push(clause.lits().to_vec());
            }

            let mut input_clauses: Vec<Vec<Lit>> = input_b
                .iter()
                .map(|c| c.to_vec())
                .collect();

            output_clauses.sort();
            input_clauses.sort();

            prop_assert_eq!(input_clauses, output_clauses);

            for &lit in ctx.part(TrailP).trail() {
                if let &Reason::Long(cref) = ctx.part(ImplGraphP).reason(lit.var()) {
                    prop_assert_eq!(ctx.part(ClauseAllocP).clause(cref).lits()[0], lit)
                }
            }
        }
    }
}
