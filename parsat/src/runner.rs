//! Parallel solve runner.
//!
//! Spawns one solver instance per thread on copies of the same formula. The instances share
//! nothing but the connector: its result atom and the clause exchange ring. Thread
//! configurations are jittered so the instances explore different parts of the search space.

use std::sync::Arc;
use std::thread;

use log::info;

use crate::cnf::CnfFormula;
use crate::config::SolverConfig;
use crate::connector::{self, Connector, SolveResult};
use crate::solver::Solver;
use crate::stats::Stats;

/// Outcome of a parallel solve.
pub struct ParallelResult {
    pub result: SolveResult,
    /// Assignment indexed by variable, present iff the result is [`SolveResult::Sat`].
    pub model: Option<Vec<Option<bool>>>,
    /// Counters aggregated over all instances.
    pub stats: Stats,
}

/// Solve a formula with multiple solver threads.
///
/// The first instance to find a result wins and, for a satisfiable formula, commits its model.
/// The remaining instances observe the shared result at their next restart boundary and stop.
pub fn solve_parallel(formula: &CnfFormula, config: &SolverConfig) -> ParallelResult {
    let threads = config.n_threads.max(1);
    let connector = Arc::new(Connector::new(
        config.exchange_buffer_mb * 1024 * 1024,
    ));

    let mut stats = Stats::default();

    thread::scope(|scope| {
        let mut handles = vec![];
        for thread_id in 0..threads {
            let connector = Arc::clone(&connector);
            let thread_config = config.thread_config(thread_id);
            handles.push(scope.spawn(move || run_worker(formula, thread_config, connector)));
        }

        connector.wait_initialized(threads);
        info!("{} solver threads running", threads);

        while connector.running_threads() > 0 && !connector.is_finished() {
            connector.sleep();
        }
        if connector::abort_requested() {
            connector.abort();
        }

        for handle in handles {
            stats.add(&handle.join().unwrap());
        }
    });

    let result = connector.result();
    let model = if result == SolveResult::Sat {
        Some(connector.model())
    } else {
        None
    };

    ParallelResult {
        result,
        model,
        stats,
    }
}

fn run_worker(formula: &CnfFormula, config: SolverConfig, connector: Arc<Connector>) -> Stats {
    connector.notify_thread_start();

    let mut solver = Solver::with_config(config);
    solver.connect(Arc::clone(&connector));
    solver.add_formula(formula);

    connector.notify_thread_initialized();

    let result = solver.solve();

    if let Some(sat) = result {
        if connector.set_finished(sat) && sat {
            connector.commit_model(solver.assignment_vec());
        }
    }

    let mut stats = Stats::default();
    stats.add(solver.stats());

    connector.notify_thread_end();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::config::ExchangeMode;
    use crate::test::{sat_formula, sgen_unsat_formula};

    fn parallel_config(exchange: ExchangeMode) -> SolverConfig {
        SolverConfig {
            n_threads: 4,
            exchange,
            exchange_buffer_mb: 1,
            // Small intervals so the test exercises restarts and the exchange cadence.
            restart_first: 16,
            ..SolverConfig::default()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(4))]

        #[test]
        fn parallel_agreement_unsat(formula in sgen_unsat_formula(2..5usize)) {
            for &exchange in
                [ExchangeMode::None, ExchangeMode::Simple, ExchangeMode::ConflictGated].iter()
            {
                let outcome = solve_parallel(&formula, &parallel_config(exchange));
                prop_assert_eq!(outcome.result, SolveResult::Unsat);
            }
        }

        #[test]
        fn parallel_sat_model(formula in sat_formula(4..20usize, 20..100usize, 0.05..0.2, 0.9..1.0)) {
            let outcome = solve_parallel(&formula, &parallel_config(ExchangeMode::ConflictGated));
            prop_assert_eq!(outcome.result, SolveResult::Sat);

            let model = outcome.model.unwrap();
            for clause in formula.iter() {
                prop_assert!(clause.iter().any(
                    |&lit| model[lit.index()] == Some(lit.is_positive())
                ));
            }
        }
    }
}
