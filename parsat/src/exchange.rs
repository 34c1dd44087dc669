//! Learned clause exchange between solver instances.
//!
//! Exported clauses are serialized into the shared ring as `(size, glue, origin, literals)`
//! records. Importing translates a record against the importer's top-level assignment: satisfied
//! records are dropped, falsified literals are removed and shrunken units are enqueued
//! separately.
//!
//! Two policies build on this. The simple exchanger imports everything into the regular learnt
//! clause pool. The conflict gated exchanger attaches imports but parks them in a probation set:
//! only once an import participates in a conflict is it promoted to the learnt pool, and parked
//! clauses that stay unused for long are deleted again. Imported clauses are never re-exported,
//! promotion takes the place of an export.

use std::sync::Arc;

use partial_ref::{partial, PartialRef};

use crate::clause::header::{EXPORT_FRESH, EXPORT_SENT, EXPORT_USED};
use crate::clause::{db, ClauseHeader, ClauseRef};
use crate::config::{ExchangeMode, SolverConfig};
use crate::connector::Connector;
use crate::context::{parts::*, Context};
use crate::exchange::ring::RingPos;
use crate::glue::compute_glue_of_clause;
use crate::lit::Lit;
use crate::prop::{attach_level, backtrack, enqueue_assignment, safe_attach_clause, Reason};
use crate::state::SatState;

pub mod ring;

/// Conflicts between periodic import sweeps of the gated exchanger.
const FETCH_INTERVAL: u64 = 100;

/// Clause exchange state of one solver instance.
#[derive(Default)]
pub struct Exchange {
    mode: ExchangeMode,
    conn: Option<Arc<Connector>>,
    origin: u32,
    cursor: RingPos,

    max_export_glue: usize,
    max_export_size: usize,
    minimize_import: bool,
    only_export_minimized: bool,
    confl_to_delete: u64,

    /// Translated units waiting to be enqueued at level 0.
    import_units: Vec<Lit>,
    /// Translated binary clauses waiting to be added.
    import_binaries: Vec<[Lit; 2]>,
    /// Allocated long imports waiting to be attached.
    import_clauses: Vec<ClauseRef>,
    /// Attached but unvetted imports (conflict gated mode).
    parked: Vec<ClauseRef>,
    /// Imports that participated in a conflict, to be promoted.
    ready: Vec<ClauseRef>,

    last_cleanup: u64,
    last_fetch: u64,

    record: Vec<i32>,
    tmp_lits: Vec<Lit>,
}

impl Exchange {
    /// Apply a configuration.
    pub fn configure(&mut self, config: &SolverConfig) {
        self.mode = config.exchange;
        self.max_export_glue = config.max_export_lbd;
        self.max_export_size = config.max_export_sz;
        self.minimize_import = config.minimize_import;
        self.only_export_minimized = config.only_export_minimized;
        self.confl_to_delete = config.confl_to_delete;
    }

    /// Connect this instance to the shared ring.
    pub fn connect(&mut self, conn: Arc<Connector>) {
        self.origin = conn.unique_id();
        self.conn = Some(conn);
    }

    /// Whether clauses are exchanged at all.
    pub fn is_active(&self) -> bool {
        self.conn.is_some() && self.mode != ExchangeMode::None
    }

    /// The shared run state, if this instance is part of a parallel solve.
    pub fn connector(&self) -> Option<&Arc<Connector>> {
        self.conn.as_ref()
    }

    /// Whether imports are waiting to be attached.
    pub fn has_pending_imports(&self) -> bool {
        !self.import_units.is_empty()
            || !self.import_binaries.is_empty()
            || !self.import_clauses.is_empty()
    }

    /// The clause exchange lists that hold clause references across garbage collections.
    pub(crate) fn cref_roots_mut(&mut self) -> [&mut Vec<ClauseRef>; 3] {
        [
            &mut self.import_clauses,
            &mut self.parked,
            &mut self.ready,
        ]
    }

    fn serialize(&mut self, lits: &[Lit], glue: usize) {
        self.record.clear();
        self.record.push(lits.len() as i32);
        self.record.push(glue as i32);
        self.record.push(self.origin as i32);
        for &lit in lits {
            self.record.push(lit.code() as i32);
        }
    }
}

/// Export a learned unit clause.
pub fn on_learnt_unit(mut ctx: partial!(Context, mut ExchangeP, mut StatsP), lit: Lit) {
    if !ctx.part(ExchangeP).is_active() {
        return;
    }
    let exchange = ctx.part_mut(ExchangeP);
    exchange.serialize(&[lit], 0);
    let conn = Arc::clone(exchange.conn.as_ref().unwrap());
    conn.ring().push(&ctx.part(ExchangeP).record);
    ctx.part_mut(StatsP).exported_clauses += 1;
}

/// Export a learned binary clause.
pub fn on_learnt_binary(
    mut ctx: partial!(Context, mut ExchangeP, mut StatsP),
    lits: [Lit; 2],
    glue: usize,
) {
    if !ctx.part(ExchangeP).is_active() || glue > ctx.part(ExchangeP).max_export_glue {
        return;
    }
    let exchange = ctx.part_mut(ExchangeP);
    exchange.serialize(&lits, glue);
    let conn = Arc::clone(exchange.conn.as_ref().unwrap());
    conn.ring().push(&ctx.part(ExchangeP).record);
    ctx.part_mut(StatsP).exported_clauses += 1;
}

/// A long clause was learned; export it or queue it for conflict gating.
pub fn on_learnt_long(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ExchangeP, mut StatsP),
    cref: ClauseRef,
) {
    if !ctx.part(ExchangeP).is_active() {
        return;
    }

    let (glue, size) = {
        let header = ctx.part(ClauseAllocP).header(cref);
        (header.glue(), header.len())
    };

    match ctx.part(ExchangeP).mode {
        ExchangeMode::Simple => {
            if glue <= ctx.part(ExchangeP).max_export_glue
                && size <= ctx.part(ExchangeP).max_export_size
            {
                export_clause(ctx.borrow(), cref);
            }
        }
        ExchangeMode::ConflictGated => {
            let only_minimized = ctx.part(ExchangeP).only_export_minimized;
            if !only_minimized && glue < 3 && size <= ctx.part(ExchangeP).max_export_size {
                export_clause(ctx.borrow(), cref);
            } else {
                // Held back until the clause proves itself in a conflict.
                let conflicts = ctx.part(StatsP).conflicts;
                let header = ctx.part_mut(ClauseAllocP).header_mut(cref);
                header.set_export_state(EXPORT_FRESH);
                header.set_touched(conflicts);
            }
        }
        ExchangeMode::None => (),
    }
}

/// Serialize a stored clause into the ring, unless it was already sent.
fn export_clause(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ExchangeP, mut StatsP),
    cref: ClauseRef,
) {
    let glue = {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.export_state() == EXPORT_SENT || header.imported() {
            return;
        }
        header.glue()
    };

    ctx.part_mut(ClauseAllocP)
        .header_mut(cref)
        .set_export_state(EXPORT_SENT);

    let (exchange, mut ctx) = ctx.split_part_mut(ExchangeP);
    let (alloc, mut ctx) = ctx.split_part(ClauseAllocP);
    exchange.serialize(alloc.clause(cref).lits(), glue);
    let conn = exchange.conn.as_ref().unwrap();
    conn.ring().push(&exchange.record);
    ctx.part_mut(StatsP).exported_clauses += 1;
}

/// A clause participated in a conflict; drive the gated export and promotion state machine.
pub fn on_clause_used_in_conflict(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ExchangeP,
        mut ImplGraphP,
        mut StatsP
    ),
    cref: ClauseRef,
) {
    if ctx.part(ExchangeP).mode != ExchangeMode::ConflictGated
        || !ctx.part(ExchangeP).is_active()
    {
        return;
    }

    let (imported, state, size, glue, simplified) = {
        let header = ctx.part(ClauseAllocP).header(cref);
        (
            header.imported(),
            header.export_state(),
            header.len(),
            header.glue(),
            header.simplified(),
        )
    };

    if state == EXPORT_SENT {
        return;
    }

    if imported {
        if state == EXPORT_FRESH {
            // First conflict participation: promote out of the probation set.
            let new_glue = compute_glue_of_clause(ctx.borrow(), cref);
            ctx.part_mut(ClauseAllocP).header_mut(cref).set_glue(new_glue);
            ctx.part_mut(ExchangeP).ready.push(cref);
            ctx.part_mut(StatsP).promoted_imports += 1;
        }
        ctx.part_mut(ClauseAllocP)
            .header_mut(cref)
            .set_export_state(EXPORT_USED);
    } else if state == EXPORT_FRESH {
        ctx.part_mut(ClauseAllocP)
            .header_mut(cref)
            .set_export_state(EXPORT_USED);
    } else if state == EXPORT_USED {
        let exchange = ctx.part(ExchangeP);
        let exportable = (!exchange.only_export_minimized || simplified)
            && size <= exchange.max_export_size
            && glue <= exchange.max_export_glue;
        if exportable {
            export_clause(ctx.borrow(), cref);
        }
    }
}

/// Periodic work at each conflict: cleanup of stale parked imports and import sweeps.
pub fn on_conflict_found(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut SolverStateP,
        mut StatsP,
        AssignmentP,
        ImplGraphP,
        ReduceP
    ),
) {
    if !ctx.part(ExchangeP).is_active() {
        return;
    }

    let conflicts = ctx.part(StatsP).conflicts;

    match ctx.part(ExchangeP).mode {
        ExchangeMode::Simple => {
            let should_fetch = {
                let exchange = ctx.part(ExchangeP);
                let conn = exchange.conn.as_ref().unwrap();
                conn.ring().should_import(exchange.cursor)
            };
            if should_fetch {
                fetch_clauses(ctx.borrow());
            }
        }
        ExchangeMode::ConflictGated => {
            if conflicts - ctx.part(ExchangeP).last_cleanup
                > ctx.part(ExchangeP).confl_to_delete / 2
            {
                cleanup_parked(ctx.borrow());
            }
            if conflicts - ctx.part(ExchangeP).last_fetch > FETCH_INTERVAL {
                fetch_clauses(ctx.borrow());
            }
        }
        ExchangeMode::None => (),
    }
}

/// Read all pending records from the ring and translate them.
pub fn fetch_clauses(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut SolverStateP,
        mut StatsP,
        AssignmentP,
        ImplGraphP,
        ReduceP
    ),
) {
    let var_count = ctx.part(AssignmentP).assignment().len();
    let conn = Arc::clone(ctx.part(ExchangeP).conn.as_ref().unwrap());

    loop {
        let cursor = ctx.part(ExchangeP).cursor;
        if !conn.ring().is_valid(cursor) {
            break;
        }

        let mut record = std::mem::take(&mut ctx.part_mut(ExchangeP).record);
        conn.ring().read_record(cursor, &mut record);
        ctx.part_mut(ExchangeP).cursor = conn.ring().next_pos(cursor);

        // A mangled record means a producer lapped us; skip it, the remaining records up to the
        // write end are still intact.
        let intact = record.len() >= 3
            && record[0] as usize + 3 == record.len()
            && record
                .iter()
                .skip(3)
                .all(|&code| code >= 0 && (code as usize) < var_count * 2);
        let foreign = intact && record[2] as u32 != ctx.part(ExchangeP).origin;

        ctx.part_mut(ExchangeP).record = record;

        if foreign {
            import_record(ctx.borrow());
        }
    }

    let conflicts = ctx.part(StatsP).conflicts;
    ctx.part_mut(ExchangeP).last_fetch = conflicts;
}

/// Translate the current record against the top-level assignment and queue it for import.
fn import_record(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut SolverStateP,
        mut StatsP,
        AssignmentP,
        ImplGraphP,
        ReduceP
    ),
) {
    let glue = ctx.part(ExchangeP).record[1] as usize;

    let record = std::mem::take(&mut ctx.part_mut(ExchangeP).record);
    let mut lits = std::mem::take(&mut ctx.part_mut(ExchangeP).tmp_lits);
    lits.clear();

    let mut satisfied = false;
    for &code in record.iter().skip(3) {
        let lit = Lit::from_code(code as usize);
        match ctx.part(AssignmentP).lit_value(lit) {
            None => lits.push(lit),
            Some(value) => {
                if ctx.part(ImplGraphP).level(lit.var()) > 0 {
                    lits.push(lit);
                } else if value {
                    satisfied = true;
                    break;
                }
            }
        }
    }
    ctx.part_mut(ExchangeP).record = record;

    if !satisfied && lits.len() >= 3 && !ctx.part_mut(ClauseAllocP).try_reserve(lits.len()) {
        // Better to drop an import than to run out of memory over it.
        lits.clear();
        ctx.part_mut(ExchangeP).tmp_lits = lits;
        return;
    }

    if !satisfied {
        ctx.part_mut(StatsP).imported_clauses += 1;

        match lits[..] {
            [] => {
                // The imported clause is falsified by the top-level assignment; since it is
                // implied by the formula, the formula is unsatisfiable.
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            }
            [lit] => ctx.part_mut(ExchangeP).import_units.push(lit),
            [lit_0, lit_1] => ctx
                .part_mut(ExchangeP)
                .import_binaries
                .push([lit_0, lit_1]),
            _ => {
                let conflicts = ctx.part(StatsP).conflicts;
                let minimize_import = ctx.part(ExchangeP).minimize_import;

                let mut header = ClauseHeader::new();
                header.set_glue(glue);
                header.set_tier(ctx.part(ReduceP).select_tier(glue));
                header.set_imported(true);
                header.set_export_state(EXPORT_FRESH);
                header.set_simplified(!minimize_import);
                header.set_touched(conflicts);

                let cref = db::add_clause(ctx.borrow(), header, &lits);
                ctx.part_mut(ExchangeP).import_clauses.push(cref);
            }
        }
    }

    lits.clear();
    ctx.part_mut(ExchangeP).tmp_lits = lits;
}

/// Attach all pending imports, backtracking as far as necessary to do so consistently.
///
/// Called with a fully propagated trail, typically right before a decision.
pub fn drain_imports(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut SolverStateP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
    ),
) {
    if !ctx.part(ExchangeP).is_active() || !ctx.part(ExchangeP).has_pending_imports() {
        return;
    }

    // Units assert at level 0.
    if !ctx.part(ExchangeP).import_units.is_empty() {
        backtrack(ctx.borrow(), 0);
        while let Some(lit) = ctx.part_mut(ExchangeP).import_units.pop() {
            match ctx.part(AssignmentP).lit_value(lit) {
                Some(true) => (),
                Some(false) => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
                None => enqueue_assignment(ctx.borrow(), lit, Reason::Unit, 0),
            }
        }
    }

    while let Some(lits) = ctx.part_mut(ExchangeP).import_binaries.pop() {
        ctx.part_mut(BinaryClausesP).add_binary_clause(lits);
        attach_imported_binary(ctx.borrow(), lits);
    }

    while let Some(cref) = ctx.part_mut(ExchangeP).import_clauses.pop() {
        attach_imported_long(ctx.borrow(), cref);
    }
}

/// Reconcile the current assignment with a freshly added binary clause.
fn attach_imported_binary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ImplGraphP,
        mut SolverStateP,
        mut TrailP,
    ),
    lits: [Lit; 2],
) {
    let values = [
        ctx.part(AssignmentP).lit_value(lits[0]),
        ctx.part(AssignmentP).lit_value(lits[1]),
    ];

    if values.iter().any(|&value| value == Some(true)) {
        return;
    }

    if values == [Some(false), Some(false)] {
        let level_0 = ctx.part(ImplGraphP).level(lits[0].var());
        let level_1 = ctx.part(ImplGraphP).level(lits[1].var());
        if level_0 == level_1 {
            if level_0 == 0 {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                return;
            }
            backtrack(ctx.borrow(), level_0 - 1);
        } else {
            backtrack(ctx.borrow(), level_0.min(level_1));
        }
    }

    // At most one literal is still false, the other asserts at its level.
    for i in 0..2 {
        if ctx.part(AssignmentP).lit_value(lits[i]) == Some(false)
            && ctx.part(AssignmentP).lit_value(lits[i ^ 1]).is_none()
        {
            let level = ctx.part(ImplGraphP).level(lits[i].var());
            enqueue_assignment(ctx.borrow(), lits[i ^ 1], Reason::Binary([lits[i]]), level);
        }
    }
}

/// Attach a long import, parking it when the gated policy applies.
fn attach_imported_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BranchP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
    ),
    cref: ClauseRef,
) {
    let free_level = ctx.part(AssignmentP).assignment().len();
    let level = attach_level(ctx.borrow(), cref);

    if ctx.part(ExchangeP).mode == ExchangeMode::ConflictGated && level == free_level {
        // Inert under the current assignment: park it until it proves useful in a conflict.
        safe_attach_clause(ctx.borrow(), cref);
        ctx.part_mut(ExchangeP).parked.push(cref);
        ctx.part_mut(StatsP).parked_imports += 1;
        return;
    }

    if level < ctx.part(TrailP).current_level() {
        backtrack(ctx.borrow(), level);
    }

    safe_attach_clause(ctx.borrow(), cref);
    ctx.part_mut(ClauseAllocP).header_mut(cref).set_imported(false);

    let lits = [
        ctx.part(ClauseAllocP).clause(cref).lits()[0],
        ctx.part(ClauseAllocP).clause(cref).lits()[1],
    ];
    if ctx.part(AssignmentP).lit_value(lits[0]).is_none()
        && ctx.part(AssignmentP).lit_is_false(lits[1])
    {
        let assert_level = ctx.part(ImplGraphP).level(lits[1].var());
        enqueue_assignment(ctx.borrow(), lits[0], Reason::Long(cref), assert_level);
    }
}

/// Move imports that proved useful into the regular learnt pool.
pub fn drain_promotions(
    mut ctx: partial!(
        Context,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        ReduceP,
        StatsP
    ),
) {
    while let Some(cref) = ctx.part_mut(ExchangeP).ready.pop() {
        if ctx.part(ClauseAllocP).header(cref).deleted() {
            continue;
        }
        let glue = ctx.part(ClauseAllocP).header(cref).glue();
        let tier = ctx.part(ReduceP).select_tier(glue);
        ctx.part_mut(ClauseAllocP).header_mut(cref).set_imported(false);
        db::set_clause_tier(ctx.borrow(), cref, tier);
        crate::clause::reduce::register_learnt(ctx.borrow(), cref);
    }
}

/// Drop parked imports that did not participate in any conflict for too long.
fn cleanup_parked(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ExchangeP,
        AssignmentP,
        ImplGraphP,
        StatsP
    ),
) {
    let conflicts = ctx.part(StatsP).conflicts;
    let confl_to_delete = ctx.part(ExchangeP).confl_to_delete;

    let mut parked = std::mem::take(&mut ctx.part_mut(ExchangeP).parked);

    parked.retain(|&cref| {
        let (deleted, imported, state, glue, touched) = {
            let header = ctx.part(ClauseAllocP).header(cref);
            (
                header.deleted(),
                header.imported(),
                header.export_state(),
                header.glue(),
                header.touched(),
            )
        };
        if deleted {
            return false;
        }
        if !(imported && state == EXPORT_FRESH) {
            // Promoted in the meantime, it lives in the learnt pool now.
            return false;
        }

        let age = conflicts.saturating_sub(touched);
        let keep = age < confl_to_delete
            || (glue < 4 && age < (5 - glue as u64) * confl_to_delete)
            || db::is_locked(ctx.borrow(), cref);

        if !keep {
            db::delete_clause(ctx.borrow(), cref);
        }
        keep
    });

    ctx.part_mut(ExchangeP).parked = parked;
    ctx.part_mut(ExchangeP).last_cleanup = conflicts;
}
