//! Central solver data structure.
//!
//! This module defines the `Context` data structure which holds all data used by the solver. It
//! also contains global notification functions that likely need to be extended when new parts are
//! added to the solver.
use partial_ref::{part, partial, PartialRef, PartialRefTarget};

use crate::analyze::AnalyzeConflict;
use crate::binary::BinaryClauses;
use crate::branch::Branch;
use crate::clause::{ClauseActivity, ClauseAlloc, ClauseDb, Reduce};
use crate::config::SolverConfig;
use crate::exchange::Exchange;
use crate::proof::Proof;
use crate::prop::{Assignment, ImplGraph, Trail, Watchlists};
use crate::restart::Restart;
use crate::schedule::Schedule;
use crate::state::SolverState;
use crate::stats::Stats;
use crate::tmp::TmpData;
use crate::vivify::Vivify;

/// Part declarations for the [`Context`] struct.
pub mod parts {
    use super::*;

    part!(pub AnalyzeConflictP: AnalyzeConflict);
    part!(pub AssignmentP: Assignment);
    part!(pub BinaryClausesP: BinaryClauses);
    part!(pub BranchP: Branch);
    part!(pub ClauseActivityP: ClauseActivity);
    part!(pub ClauseAllocP: ClauseAlloc);
    part!(pub ClauseDbP: ClauseDb);
    part!(pub ExchangeP: Exchange);
    part!(pub ImplGraphP: ImplGraph);
    part!(pub ProofP<'a>: Proof<'a>);
    part!(pub ReduceP: Reduce);
    part!(pub RestartP: Restart);
    part!(pub ScheduleP: Schedule);
    part!(pub SolverConfigP: SolverConfig);
    part!(pub SolverStateP: SolverState);
    part!(pub StatsP: Stats);
    part!(pub TmpDataP: TmpData);
    part!(pub TrailP: Trail);
    part!(pub VivifyP: Vivify);
    part!(pub WatchlistsP: Watchlists);
}

use parts::*;

/// Central solver data structure.
///
/// This struct contains all data kept by the solver. Most functions operating on multiple fields
/// of the context use partial references provided by the `partial_ref` crate. This documents the
/// data dependencies and makes the borrow checker happy without the overhead of passing
/// individual references.
#[derive(PartialRefTarget, Default)]
pub struct Context<'a> {
    #[part(AnalyzeConflictP)]
    pub analyze_conflict: AnalyzeConflict,
    #[part(AssignmentP)]
    pub assignment: Assignment,
    #[part(BinaryClausesP)]
    pub binary_clauses: BinaryClauses,
    #[part(BranchP)]
    pub branch: Branch,
    #[part(ClauseActivityP)]
    pub clause_activity: ClauseActivity,
    #[part(ClauseAllocP)]
    pub clause_alloc: ClauseAlloc,
    #[part(ClauseDbP)]
    pub clause_db: ClauseDb,
    #[part(ExchangeP)]
    pub exchange: Exchange,
    #[part(ImplGraphP)]
    pub impl_graph: ImplGraph,
    #[part(ProofP<'a>)]
    pub proof: Proof<'a>,
    #[part(ReduceP)]
    pub reduce: Reduce,
    #[part(RestartP)]
    pub restart: Restart,
    #[part(ScheduleP)]
    pub schedule: Schedule,
    #[part(SolverConfigP)]
    pub solver_config: SolverConfig,
    #[part(SolverStateP)]
    pub solver_state: SolverState,
    #[part(StatsP)]
    pub stats: Stats,
    #[part(TmpDataP)]
    pub tmp_data: TmpData,
    #[part(TrailP)]
    pub trail: Trail,
    #[part(VivifyP)]
    pub vivify: Vivify,
    #[part(WatchlistsP)]
    pub watchlists: Watchlists,
}

/// Update structures for a new variable count.
pub fn set_var_count(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ImplGraphP,
        mut VivifyP,
        mut WatchlistsP,
    ),
    count: usize,
) {
    ctx.part_mut(AnalyzeConflictP).set_var_count(count);
    ctx.part_mut(AssignmentP).set_var_count(count);
    ctx.part_mut(BinaryClausesP).set_var_count(count);
    ctx.part_mut(BranchP).set_var_count(count);
    ctx.part_mut(ImplGraphP).set_var_count(count);
    ctx.part_mut(VivifyP).set_var_count(count);
    ctx.part_mut(WatchlistsP).set_var_count(count);
}

/// Increases the variable count to at least the given value.
pub fn ensure_var_count(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut BinaryClausesP,
        mut BranchP,
        mut ImplGraphP,
        mut VivifyP,
        mut WatchlistsP,
    ),
    count: usize,
) {
    if count > ctx.part(AssignmentP).assignment().len() {
        set_var_count(ctx.borrow(), count)
    }
}

/// Propagate the active configuration into all policy components.
///
/// Must be called before any variables are added.
pub fn apply_config(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut BranchP,
        mut ClauseActivityP,
        mut ExchangeP,
        mut ReduceP,
        mut RestartP,
        mut VivifyP,
        SolverConfigP,
    ),
) {
    let (config, mut ctx) = ctx.split_part(SolverConfigP);
    ctx.part_mut(AnalyzeConflictP).configure(config);
    ctx.part_mut(BranchP).configure(config);
    ctx.part_mut(ClauseActivityP).set_decay(config.clause_decay);
    ctx.part_mut(ExchangeP).configure(config);
    ctx.part_mut(ReduceP).configure(config);
    ctx.part_mut(RestartP).configure(config);
    ctx.part_mut(VivifyP).configure(config);
}
