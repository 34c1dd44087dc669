//! Boolean satisfiability solver.
use std::io::{self, Write};
use std::sync::Arc;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use anyhow::Error;
use log::info;

use crate::cnf::CnfFormula;
use crate::config::SolverConfig;
use crate::connector::Connector;
use crate::context::{apply_config, ensure_var_count, parts::*, Context};
use crate::dimacs::DimacsParser;
use crate::lit::{Lit, Var};
use crate::load::load_clause;
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::stats::Stats;

/// A boolean satisfiability solver.
#[derive(Default)]
pub struct Solver<'a> {
    ctx: Box<Context<'a>>,
}

impl<'a> Solver<'a> {
    /// Create a new solver with the default configuration.
    pub fn new() -> Solver<'a> {
        Solver::with_config(SolverConfig::default())
    }

    /// Create a new solver with the given configuration.
    pub fn with_config(config: SolverConfig) -> Solver<'a> {
        let mut solver = Solver::default();
        solver.ctx.solver_config = config;
        let mut ctx = solver.ctx.into_partial_ref_mut();
        apply_config(ctx.borrow());
        solver
    }

    /// Connect the solver to a shared run state for parallel solving.
    pub fn connect(&mut self, connector: Arc<Connector>) {
        self.ctx.exchange.connect(connector);
    }

    /// Add a formula to the solver.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ensure_var_count(ctx.borrow(), formula.var_count());
        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }
    }

    /// Reads and adds a formula in DIMACS CNF format.
    ///
    /// Using this avoids creating a temporary [`CnfFormula`].
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        let parser = DimacsParser::parse_incremental(input, |parser| {
            self.add_formula(&parser.take_formula());
            Ok(())
        })?;

        info!(
            "parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Check the satisfiability of the current formula.
    ///
    /// Returns `None` when the search was stopped from the outside before a result was found.
    pub fn solve(&mut self) -> Option<bool> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        while schedule_step(ctx.borrow()) {}
        match ctx.part(SolverStateP).sat_state {
            SatState::Unknown => None,
            SatState::Sat => Some(true),
            SatState::Unsat => Some(false),
        }
    }

    /// Set of literals that satisfy the formula.
    pub fn model(&self) -> Option<Vec<Lit>> {
        let ctx = self.ctx.into_partial_ref();
        if ctx.part(SolverStateP).sat_state == SatState::Sat {
            Some(
                ctx.part(AssignmentP)
                    .assignment()
                    .iter()
                    .enumerate()
                    .flat_map(|(index, assignment)| {
                        assignment.map(|value| Lit::from_var(Var::from_index(index), !value))
                    })
                    .collect(),
            )
        } else {
            None
        }
    }

    /// The full assignment as a vector indexed by variable.
    pub fn assignment_vec(&self) -> Vec<Option<bool>> {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(AssignmentP).assignment().to_vec()
    }

    /// Generate a DRAT proof while solving.
    ///
    /// Only meaningful for a sequential solve of an unsatisfiable formula.
    pub fn write_proof(&mut self, target: impl Write + 'a, binary: bool) {
        self.ctx.proof.write_proof(target, binary);
    }

    /// Stop writing the proof and report any IO error encountered.
    pub fn close_proof(&mut self) -> io::Result<()> {
        self.ctx.proof.close_proof();
        match self.ctx.proof.take_error() {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Search statistics of this instance.
    pub fn stats(&self) -> &Stats {
        &self.ctx.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::dimacs::write_dimacs;

    use crate::test::{sat_formula, sgen_unsat_formula};

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), Some(false));
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];

            write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            prop_assert_eq!(solver.solve(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn unsat_with_recorded_proof(formula in sgen_unsat_formula(1..5usize)) {
            let mut proof = vec![];
            {
                let mut solver = Solver::new();
                solver.write_proof(&mut proof, false);
                solver.add_formula(&formula);
                prop_assert_eq!(solver.solve(), Some(false));
                solver.close_proof().unwrap();
            }

            // The proof ends with the empty clause.
            let text = std::str::from_utf8(&proof).unwrap();
            prop_assert!(text.lines().last().unwrap().trim() == "0");
        }

        #[test]
        fn sat_on_all_analyzers(formula in sat_formula(4..15usize, 10..80usize, 0.05..0.2, 0.9..1.0)) {
            use crate::config::AnalyzeMode;

            for &analyze in [AnalyzeMode::FirstUip, AnalyzeMode::MultiUip, AnalyzeMode::LevelAware].iter() {
                let mut config = SolverConfig::default();
                config.analyze = analyze;
                let mut solver = Solver::with_config(config);

                solver.add_formula(&formula);

                prop_assert_eq!(solver.solve(), Some(true));

                let model = solver.model().unwrap();
                for clause in formula.iter() {
                    prop_assert!(clause.iter().any(|lit| model.contains(lit)));
                }
            }
        }

        #[test]
        fn unsat_with_chrono_disabled(formula in sgen_unsat_formula(1..6usize)) {
            let mut config = SolverConfig::default();
            config.chrono = -1;
            let mut solver = Solver::with_config(config);

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), Some(false));
        }
    }
}
