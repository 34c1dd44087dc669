//! Scheduling of processing and solving steps.
//!
//! One step handles everything that happens between two conflicts: polling the shared run state
//! at restart boundaries, restarting, reducing the clause database, vivification and finally the
//! search for the next conflict.
use log::info;

use partial_ref::{partial, PartialRef};

use crate::branch::Branch;
use crate::cdcl::conflict_step;
use crate::clause::{gc, reduce, Tier};
use crate::connector;
use crate::context::{parts::*, Context};
use crate::prop::restart;
use crate::state::SatState;
use crate::vivify;

/// Scheduling state.
#[derive(Default)]
pub struct Schedule {
    last_progress: u64,
}

/// Perform one step of the schedule.
///
/// Returns false when the search is finished or was stopped.
pub fn schedule_step<'a>(
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
        mut ScheduleP,
        mut SolverStateP,
        mut StatsP,
        mut TmpDataP,
        mut TrailP,
        mut VivifyP,
        mut WatchlistsP,
        SolverConfigP,
    ),
) -> bool {
    if ctx.part(SolverStateP).sat_state != SatState::Unknown || ctx.part(SolverStateP).stopped {
        return false;
    }

    let conflicts = ctx.part(StatsP).conflicts;
    if conflicts > 0
        && conflicts % 5000 == 0
        && ctx.part(ScheduleP).last_progress != conflicts
    {
        ctx.part_mut(ScheduleP).last_progress = conflicts;
        let db = ctx.part(ClauseDbP);
        let units = ctx.part(TrailP).top_level_assignment_count();
        info!(
            "confl: {}k rest: {} vars: {} bin: {} irred: {} core: {} mid: {} local: {}",
            conflicts / 1000,
            ctx.part(StatsP).restarts,
            ctx.part(AssignmentP).assignment().len() - units,
            ctx.part(BinaryClausesP).count(),
            db.count_by_tier(Tier::Irred),
            db.count_by_tier(Tier::Core),
            db.count_by_tier(Tier::Mid),
            db.count_by_tier(Tier::Local)
        );
    }

    if ctx.part_mut(RestartP).should_restart() {
        // Restart boundaries are the only points where the shared run state is polled.
        let finished = connector::abort_requested()
            || ctx
                .part(ExchangeP)
                .connector()
                .map(|conn| conn.is_finished())
                .unwrap_or(false);
        if finished {
            ctx.part_mut(SolverStateP).stopped = true;
            return false;
        }

        restart(ctx.borrow());
        ctx.part_mut(StatsP).restarts += 1;

        Branch::on_restart(ctx.borrow());
        let lrb_active = ctx.part(BranchP).lrb_active();
        ctx.part_mut(RestartP).on_restart(lrb_active);
        ctx.part_mut(AnalyzeConflictP).on_restart();

        if vivify::vivify_due(ctx.borrow()) {
            // Literals kept across chronological backtracking may still await re-propagation.
            if !ctx.part(TrailP).fully_propagated()
                && crate::prop::propagate(ctx.borrow()).is_err()
            {
                ctx.part_mut(ProofP).add_clause(&[]);
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                return false;
            }
            vivify::vivify_round(ctx.borrow());
            gc::collect_garbage(ctx.borrow());
        }
    }

    if reduce::reduce_check(ctx.borrow()) {
        gc::collect_garbage(ctx.borrow());
    }

    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return false;
    }

    conflict_step(ctx.borrow());
    true
}
