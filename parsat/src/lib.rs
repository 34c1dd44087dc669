//! Parsat is a CDCL based SAT solver that can run multiple cooperating solver instances in
//! parallel, exchanging learned clauses through a lock-free in-process ring buffer.

#[macro_use]
pub mod lit;
pub mod cnf;
pub mod config;
pub mod connector;
pub mod dimacs;
pub mod elim;
pub mod runner;
pub mod solver;
pub mod stats;

mod analyze;
mod avg_queue;
mod binary;
mod branch;
mod cdcl;
mod clause;
mod context;
mod exchange;
mod glue;
mod load;
mod proof;
mod prop;
mod restart;
mod schedule;
mod simplify;
mod state;
mod tmp;
mod vivify;

#[cfg(test)]
mod test;

pub use cnf::CnfFormula;
pub use config::SolverConfig;
pub use connector::{request_abort, SolveResult};
pub use lit::{Lit, Var};
pub use runner::{solve_parallel, ParallelResult};
pub use solver::Solver;
