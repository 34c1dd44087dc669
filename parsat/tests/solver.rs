use std::collections::HashSet;

use parsat::config::{AnalyzeMode, ExchangeMode, SolverConfig};
use parsat::dimacs::DimacsParser;
use parsat::lit::{Lit, Var};
use parsat::solver::Solver;
use parsat::{solve_parallel, CnfFormula, SolveResult};

/// Pigeonhole formula: `pigeons` pigeons into `pigeons - 1` holes, unsatisfiable.
fn pigeonhole(pigeons: usize) -> CnfFormula {
    let holes = pigeons - 1;
    let var = |pigeon: usize, hole: usize| Var::from_index(pigeon * holes + hole);

    let mut formula = CnfFormula::new();

    for pigeon in 0..pigeons {
        let clause: Vec<Lit> = (0..holes).map(|hole| var(pigeon, hole).positive()).collect();
        formula.add_clause(clause);
    }

    for hole in 0..holes {
        for pigeon_a in 0..pigeons {
            for pigeon_b in 0..pigeon_a {
                formula.add_clause(
                    [
                        var(pigeon_a, hole).negative(),
                        var(pigeon_b, hole).negative(),
                    ]
                    .iter()
                    .cloned(),
                );
            }
        }
    }

    formula
}

fn check_model(formula: &CnfFormula, model: &[Lit]) {
    let model: HashSet<Lit> = model.iter().cloned().collect();
    for clause in formula.iter() {
        assert!(clause.iter().any(|lit| model.contains(lit)));
    }
}

#[test]
fn unit_chain_propagates_to_sat() {
    let cnf = b"p cnf 3 3\n1 0\n-1 2 0\n-2 3 0\n";
    let formula = DimacsParser::parse(&cnf[..]).expect("parsing failed");

    let mut solver = Solver::new();
    solver.add_formula(&formula);

    assert_eq!(solver.solve(), Some(true));

    let model = solver.model().unwrap();
    assert!(model.contains(&Lit::from_dimacs(1)));
    assert!(model.contains(&Lit::from_dimacs(2)));
    assert!(model.contains(&Lit::from_dimacs(3)));
}

#[test]
fn contradicting_units_are_unsat() {
    let cnf = b"p cnf 1 2\n1 0\n-1 0\n";
    let formula = DimacsParser::parse(&cnf[..]).expect("parsing failed");

    let mut solver = Solver::new();
    solver.add_formula(&formula);

    assert_eq!(solver.solve(), Some(false));
}

#[test]
fn pigeonhole_unsat_all_analyzers() {
    let formula = pigeonhole(5);

    for &analyze in [
        AnalyzeMode::FirstUip,
        AnalyzeMode::MultiUip,
        AnalyzeMode::LevelAware,
    ]
    .iter()
    {
        let mut config = SolverConfig::default();
        config.analyze = analyze;

        let mut solver = Solver::with_config(config);
        solver.add_formula(&formula);
        assert_eq!(solver.solve(), Some(false));
    }
}

#[test]
fn restarts_happen_and_learnts_accumulate() {
    let mut config = SolverConfig::default();
    config.restart_first = 10;

    let mut solver = Solver::with_config(config);
    solver.add_formula(&pigeonhole(6));

    assert_eq!(solver.solve(), Some(false));

    let stats = solver.stats();
    assert!(stats.conflicts > 0);
    assert!(stats.restarts >= 1);
    assert!(stats.learnt_units + stats.learnt_binaries + stats.learnt_longs > 0);
}

#[test]
fn drat_proof_is_written() {
    let mut proof = vec![];
    {
        let mut solver = Solver::new();
        solver.write_proof(&mut proof, false);
        solver.add_formula(&pigeonhole(4));
        assert_eq!(solver.solve(), Some(false));
        solver.close_proof().unwrap();
    }

    let text = std::str::from_utf8(&proof).unwrap();
    assert!(!text.is_empty());
    // Every step is zero terminated, the proof ends with the empty clause.
    for line in text.lines() {
        assert!(line.trim_end().ends_with('0'));
    }
    assert_eq!(text.lines().last().unwrap().trim(), "0");
}

#[test]
fn proof_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proof.drat");

    {
        let file = std::fs::File::create(&path).unwrap();
        let mut solver = Solver::new();
        solver.write_proof(file, true);
        solver.add_formula(&pigeonhole(4));
        assert_eq!(solver.solve(), Some(false));
        solver.close_proof().unwrap();
    }

    let proof = std::fs::read(&path).unwrap();
    assert!(!proof.is_empty());
    // Binary DRAT steps start with an add or delete prefix.
    assert!(proof[0] == b'a' || proof[0] == b'd');
    assert_eq!(*proof.last().unwrap(), 0);
}

#[test]
fn parallel_agreement_on_unsat() {
    let formula = pigeonhole(6);

    for &exchange in [
        ExchangeMode::None,
        ExchangeMode::Simple,
        ExchangeMode::ConflictGated,
    ]
    .iter()
    {
        let mut config = SolverConfig::default();
        config.n_threads = 4;
        config.exchange = exchange;
        config.exchange_buffer_mb = 1;
        config.restart_first = 16;

        let outcome = solve_parallel(&formula, &config);
        assert_eq!(outcome.result, SolveResult::Unsat);
    }
}

#[test]
fn parallel_sat_with_exchange() {
    // Satisfiable: as many holes as pigeons.
    let pigeons = 6;
    let var = |pigeon: usize, hole: usize| Var::from_index(pigeon * pigeons + hole);

    let mut formula = CnfFormula::new();
    for pigeon in 0..pigeons {
        let clause: Vec<Lit> = (0..pigeons).map(|hole| var(pigeon, hole).positive()).collect();
        formula.add_clause(clause);
    }
    for hole in 0..pigeons {
        for pigeon_a in 0..pigeons {
            for pigeon_b in 0..pigeon_a {
                formula.add_clause(
                    [
                        var(pigeon_a, hole).negative(),
                        var(pigeon_b, hole).negative(),
                    ]
                    .iter()
                    .cloned(),
                );
            }
        }
    }

    let mut config = SolverConfig::default();
    config.n_threads = 4;
    config.exchange = ExchangeMode::ConflictGated;
    config.exchange_buffer_mb = 1;

    let outcome = solve_parallel(&formula, &config);
    assert_eq!(outcome.result, SolveResult::Sat);

    let assignment = outcome.model.unwrap();
    let model: Vec<Lit> = assignment
        .iter()
        .enumerate()
        .flat_map(|(index, value)| value.map(|value| Lit::from_index(index, !value)))
        .collect();
    check_model(&formula, &model);
}
