use std::env;
use std::fs;
use std::io::{self, BufRead, Read, Write};

use clap::{value_t, App, AppSettings, Arg};
use env_logger::{fmt, Builder, Target};
use flate2::bufread::GzDecoder;
use log::{error, info};
use log::{Level, LevelFilter, Record};

use anyhow::Error;

use parsat::config::SolverConfig;
use parsat::dimacs::DimacsParser;
use parsat::elim::write_model;
use parsat::solver::Solver;
use parsat::{solve_parallel, SolveResult};

mod limits;

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            error!("{}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

fn init_logging() {
    let format = |buf: &mut fmt::Formatter, record: &Record| {
        if record.level() == Level::Info {
            writeln!(buf, "c {}", record.args())
        } else {
            writeln!(buf, "c {}: {}", record.level(), record.args())
        }
    };

    let mut builder = Builder::new();
    builder
        .target(Target::Stdout)
        .format(format)
        .filter(None, LevelFilter::Info);

    if let Ok(ref env_var) = env::var("PARSAT_LOG") {
        builder.parse_filters(env_var);
    }

    builder.init();
}

fn banner() {
    info!("This is parsat {}", env!("CARGO_PKG_VERSION"));
}

fn main_with_err() -> Result<i32, Error> {
    let matches = App::new("parsat")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::DisableHelpSubcommand)
        .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'")
        .arg_from_usage("[threads] -t --threads=[N] 'Number of solver threads'")
        .arg(
            Arg::from_usage("[branch] --branch=[HEURISTIC] 'Branching heuristic'")
                .possible_values(&["dist", "lrb", "vsids", "dist_mixed"])
                .default_value("dist_mixed"),
        )
        .arg(
            Arg::from_usage("[restart] --restart=[HEURISTIC] 'Restart heuristic'")
                .possible_values(&["luby", "glucose", "mixed"])
                .default_value("mixed"),
        )
        .arg(
            Arg::from_usage("[reduce] --reduce=[HEURISTIC] 'Clause reduction heuristic'")
                .possible_values(&["chanseok", "glucose"])
                .default_value("chanseok"),
        )
        .arg(
            Arg::from_usage("[exchange] --exchange=[HEURISTIC] 'Clause exchange heuristic'")
                .possible_values(&["none", "simple", "importbuff"])
                .default_value("importbuff"),
        )
        .arg(
            Arg::from_usage("[analyze] --analyze=[HEURISTIC] 'Conflict analysis variant'")
                .possible_values(&["firstuip", "multiuip", "levelaware"])
                .default_value("levelaware"),
        )
        .arg_from_usage(
            "[chrono] --chrono=[N] 'Conflict level delta for chronological backtracking, -1 \
             disables'",
        )
        .arg_from_usage(
            "[confl-to-chrono] --confl-to-chrono=[N] 'Conflicts before chronological \
             backtracking is used'",
        )
        .arg(
            Arg::from_usage("[ccmin-mode] --ccmin-mode=[N] 'Conflict clause minimization'")
                .possible_values(&["0", "1", "2"]),
        )
        .arg_from_usage("[restart-first] --restart-first=[N] 'Base restart interval'")
        .arg_from_usage("[restart-inc] --restart-inc=[F] 'Restart interval growth factor'")
        .arg_from_usage("[max-export-lbd] --max-export-lbd=[N] 'Maximal LBD of shared clauses'")
        .arg_from_usage("[max-export-sz] --max-export-sz=[N] 'Maximal size of shared clauses'")
        .arg_from_usage(
            "[exchange-buffer] --exchange-buffer=[MB] 'Size of the clause exchange buffer'",
        )
        .arg_from_usage("[proof-file] --proof=[FILE] 'Write a DRAT proof to the specified file'")
        .arg_from_usage("[binary-proof] --binary-proof 'Write the proof in binary DRAT format'")
        .arg_from_usage("[no-model] --no-model 'Do not print a model for satisfiable formulas'")
        .arg_from_usage("[cpu-limit] --cpu-limit=[SECONDS] 'Soft CPU time limit'")
        .arg_from_usage("[mem-limit] --mem-limit=[MB] 'Soft memory limit'")
        .get_matches();

    init_logging();
    banner();

    limits::install_signal_handlers();
    if let Ok(seconds) = value_t!(matches, "cpu-limit", u64) {
        limits::set_cpu_limit(seconds);
    }
    if let Ok(megabytes) = value_t!(matches, "mem-limit", u64) {
        limits::set_mem_limit(megabytes);
    }

    let mut config = SolverConfig::default();
    config.branch = matches.value_of("branch").unwrap().parse()?;
    config.restart = matches.value_of("restart").unwrap().parse()?;
    config.reduce = matches.value_of("reduce").unwrap().parse()?;
    config.exchange = matches.value_of("exchange").unwrap().parse()?;
    config.analyze = matches.value_of("analyze").unwrap().parse()?;

    if let Ok(chrono) = value_t!(matches, "chrono", i64) {
        config.chrono = chrono;
    }
    if let Ok(conflicts) = value_t!(matches, "confl-to-chrono", u64) {
        config.confl_to_chrono = conflicts;
    }
    if let Ok(ccmin) = value_t!(matches, "ccmin-mode", u32) {
        config.ccmin_mode = ccmin;
    }
    if let Ok(first) = value_t!(matches, "restart-first", u64) {
        config.restart_first = first;
    }
    if let Ok(inc) = value_t!(matches, "restart-inc", f64) {
        config.restart_inc = inc;
    }
    if let Ok(lbd) = value_t!(matches, "max-export-lbd", usize) {
        config.max_export_lbd = lbd;
    }
    if let Ok(size) = value_t!(matches, "max-export-sz", usize) {
        config.max_export_sz = size;
    }
    if let Ok(megabytes) = value_t!(matches, "exchange-buffer", usize) {
        config.exchange_buffer_mb = megabytes;
    }
    if let Ok(threads) = value_t!(matches, "threads", usize) {
        config.n_threads = threads;
    }

    let stdin = io::stdin();

    let mut locked_stdin;
    let mut opened_file;

    let file = match matches.value_of("INPUT") {
        Some(path) => {
            info!("Reading file '{}'", path);
            opened_file = fs::File::open(path)?;
            &mut opened_file as &mut dyn Read
        }
        None => {
            info!("Reading from stdin");
            locked_stdin = stdin.lock();
            &mut locked_stdin as &mut dyn Read
        }
    };

    // Input files may be gzip compressed, detected by the magic bytes.
    let mut buffered = io::BufReader::new(file);
    let is_gzip = {
        let head = buffered.fill_buf()?;
        head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
    };
    let formula = if is_gzip {
        DimacsParser::parse(GzDecoder::new(buffered))?
    } else {
        DimacsParser::parse(buffered)?
    };
    info!(
        "Parsed formula with {} variables and {} clauses",
        formula.var_count(),
        formula.len()
    );

    let print_model = !matches.is_present("no-model");

    if config.n_threads > 1 {
        if matches.is_present("proof-file") {
            return Err(anyhow::anyhow!(
                "proof generation is only supported with a single solver thread"
            ));
        }

        let outcome = solve_parallel(&formula, &config);

        info!(
            "confl: {} decisions: {} props: {} shared: {} imported: {}",
            outcome.stats.conflicts,
            outcome.stats.decisions,
            outcome.stats.propagations,
            outcome.stats.exported_clauses,
            outcome.stats.imported_clauses,
        );

        match outcome.result {
            SolveResult::Sat => {
                println!("s SATISFIABLE");
                if print_model {
                    let stdout = io::stdout();
                    write_model(&mut stdout.lock(), &outcome.model.unwrap())?;
                }
                Ok(10)
            }
            SolveResult::Unsat => {
                println!("s UNSATISFIABLE");
                Ok(20)
            }
            SolveResult::Unknown | SolveResult::Aborted => {
                println!("s UNKNOWN");
                Ok(0)
            }
        }
    } else {
        let mut solver = Solver::with_config(config);

        let proof_file = match matches.value_of("proof-file") {
            Some(path) => {
                info!("Writing proof to file '{}'", path);
                let binary = matches.is_present("binary-proof");
                solver.write_proof(fs::File::create(path)?, binary);
                true
            }
            None => false,
        };

        solver.add_formula(&formula);

        let result = solver.solve();

        let stats = solver.stats();
        info!(
            "confl: {} decisions: {} props: {} restarts: {} reductions: {}",
            stats.conflicts, stats.decisions, stats.propagations, stats.restarts, stats.reductions,
        );

        if proof_file {
            solver.close_proof()?;
        }

        match result {
            Some(true) => {
                println!("s SATISFIABLE");
                if print_model {
                    let stdout = io::stdout();
                    write_model(&mut stdout.lock(), &solver.assignment_vec())?;
                }
                Ok(10)
            }
            Some(false) => {
                println!("s UNSATISFIABLE");
                Ok(20)
            }
            None => {
                println!("s UNKNOWN");
                Ok(0)
            }
        }
    }
}
