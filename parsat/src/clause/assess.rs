//! Clause assessment.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::lit::Lit;

use super::header::EXPORT_FRESH;
use super::{ClauseHeader, Tier};

/// Assess a newly learned clause and generate a clause header.
///
/// The glue value has to be the one computed at learning time.
pub fn assess_learned_clause(
    ctx: partial!(Context, ReduceP),
    _lits: &[Lit],
    glue: usize,
) -> ClauseHeader {
    let reduce = ctx.part(ReduceP);

    let mut header = ClauseHeader::new();

    header.set_glue(glue);
    header.set_tier(reduce.select_tier(glue));
    header.set_export_state(EXPORT_FRESH);

    header
}

/// Compute the tier for a redundant clause with a given glue level.
pub fn select_tier(glue: usize, core_lbd_cut: usize) -> Tier {
    if glue <= core_lbd_cut {
        Tier::Core
    } else if glue <= 6 {
        Tier::Mid
    } else {
        Tier::Local
    }
}
