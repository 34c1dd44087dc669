//! Solver configuration.
use std::str::FromStr;

use thiserror::Error;

/// Error for an unrecognized configuration selector.
#[derive(Debug, Error)]
#[error("unknown {what} selector: '{value}'")]
pub struct UnknownSelector {
    what: &'static str,
    value: String,
}

/// Branching heuristic selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchMode {
    Dist,
    Lrb,
    Vsids,
    /// Distance plus VSIDS initially, then LRB, then VSIDS (time controlled).
    DistLrbVsids,
}

impl FromStr for BranchMode {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dist" => Ok(BranchMode::Dist),
            "lrb" => Ok(BranchMode::Lrb),
            "vsids" => Ok(BranchMode::Vsids),
            "dist_mixed" => Ok(BranchMode::DistLrbVsids),
            _ => Err(UnknownSelector {
                what: "branch",
                value: s.into(),
            }),
        }
    }
}

/// Restart heuristic selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RestartMode {
    Luby,
    Glucose,
    /// Luby while the branching heuristic runs LRB, Glucose while it runs VSIDS.
    Mixed,
}

impl FromStr for RestartMode {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "luby" => Ok(RestartMode::Luby),
            "glucose" => Ok(RestartMode::Glucose),
            "mixed" => Ok(RestartMode::Mixed),
            _ => Err(UnknownSelector {
                what: "restart",
                value: s.into(),
            }),
        }
    }
}

/// Reduce heuristic selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceMode {
    ChanseokOh,
    Glucose,
}

impl FromStr for ReduceMode {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chanseok" => Ok(ReduceMode::ChanseokOh),
            "glucose" => Ok(ReduceMode::Glucose),
            _ => Err(UnknownSelector {
                what: "reduce",
                value: s.into(),
            }),
        }
    }
}

/// Clause exchange selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExchangeMode {
    None,
    Simple,
    /// Imports are parked until they participate in a conflict.
    ConflictGated,
}

impl Default for ExchangeMode {
    fn default() -> ExchangeMode {
        ExchangeMode::None
    }
}

impl FromStr for ExchangeMode {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ExchangeMode::None),
            "simple" => Ok(ExchangeMode::Simple),
            "importbuff" => Ok(ExchangeMode::ConflictGated),
            _ => Err(UnknownSelector {
                what: "exchange",
                value: s.into(),
            }),
        }
    }
}

/// Conflict analysis selector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalyzeMode {
    FirstUip,
    MultiUip,
    LevelAware,
}

impl FromStr for AnalyzeMode {
    type Err = UnknownSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstuip" => Ok(AnalyzeMode::FirstUip),
            "multiuip" => Ok(AnalyzeMode::MultiUip),
            "levelaware" => Ok(AnalyzeMode::LevelAware),
            _ => Err(UnknownSelector {
                what: "analyze",
                value: s.into(),
            }),
        }
    }
}

/// Configurable parameters used during solving.
///
/// The configuration is fixed at startup. The parallel runner derives per-thread variations from
/// a base configuration, everything else stays constant during search.
#[derive(Clone)]
pub struct SolverConfig {
    pub branch: BranchMode,
    pub restart: RestartMode,
    pub reduce: ReduceMode,
    pub exchange: ExchangeMode,
    pub analyze: AnalyzeMode,

    /// Conflict clause minimization: 0 none, 1 local, 2 recursive. (Default: 2)
    pub ccmin_mode: u32,
    /// Maximal clause size for extended binary resolution minimization. (Default: 12)
    pub max_ext_bin_res_size: usize,
    /// Maximal LBD for unbounded recursive minimization depth. (Default: 6)
    pub max_full_implication_min_lbd: usize,

    /// Conflict-level delta that triggers chronological backtracking, -1 disables. (Default: 100)
    pub chrono: i64,
    /// Number of conflicts before chronological backtracking is considered. (Default: 4000)
    pub confl_to_chrono: u64,

    /// Scaling factor for Luby based restarts (number of conflicts). (Default: 100)
    pub restart_first: u64,
    /// Growth factor for Luby based restarts. (Default: 2.0)
    pub restart_inc: f64,
    /// Size of the sliding LBD average window for Glucose restarts. (Default: 50)
    pub lbd_queue_size: usize,

    /// Initial LBD cut below which learned clauses enter the core tier. (Default: 3)
    pub core_lbd_cut: usize,
    /// Conflicts until the first mid tier reduction. (Default: 10000)
    pub first_reduce_mid: u64,
    /// Conflicts until the first local tier reduction. (Default: 15000)
    pub first_reduce_local: u64,
    /// Conflicts a mid tier clause may stay untouched before demotion. (Default: 30000)
    pub mid_tier_lifetime: u64,
    /// Maximal previous LBD for one-shot reduction protection. (Default: 30)
    pub max_protectable_lbd: usize,
    /// Multiplicative decay for clause activities. (Default: 0.999)
    pub clause_decay: f32,
    /// Conflicts until the first Glucose style reduction. (Default: 2000)
    pub first_reduce_db: u64,
    /// Glucose reduction interval growth per reduction. (Default: 300)
    pub inc_reduce_db: u64,
    /// Extra interval growth when the surviving clauses are good. (Default: 1000)
    pub special_inc_reduce_db: u64,

    /// Multiplicative decay for the VSIDS decision heuristic. (Default: 0.8)
    pub vsids_var_decay: f64,
    /// Conflicts between VSIDS decay increases towards 0.95. (Default: 5000)
    pub vsids_decay_timer: u64,
    /// Initial LRB step size. (Default: 0.4)
    pub step_size: f64,
    /// LRB step size decrement per conflict. (Default: 0.000001)
    pub step_size_dec: f64,
    /// LRB step size floor. (Default: 0.06)
    pub min_step_size: f64,
    /// Multiplicative decay for distance activities. (Default: 0.6)
    pub dist_var_decay: f64,
    /// Seconds of LRB branching before the mixed heuristic switches back to VSIDS.
    /// (Default: 2500)
    pub time_to_branch_switch: u64,
    /// Conflicts of VSIDS+distance branching before the mixed heuristic switches to LRB.
    /// (Default: 10000)
    pub confl_to_branch_switch: u64,
    /// Initial variable polarity is negative. (Default: true)
    pub init_pol_zero: bool,
    /// Initialize variable activities randomly. (Default: false)
    pub rnd_init_activity: bool,
    /// Initialize variable polarities randomly. (Default: false)
    pub rnd_polarity: bool,
    /// Seed for randomized initialization. (Default: 91648253)
    pub seed: u64,

    /// Fraction of wasted allocator words that triggers a collection. (Default: 0.5)
    pub garbage_frac: f64,

    /// Window size for the level-aware analyzer's conflict level average. (Default: 70)
    pub level_aware_window: usize,
    /// Minimal distance of the conflict level below the average to add extra clauses.
    /// (Default: 15)
    pub level_diff_enforce: i64,
    /// Number of initial conflicts during which extra clauses are always added. (Default: 100)
    pub initial_conflicts: i64,

    /// Conflicts between vivification passes, 0 disables. (Default: 20000)
    pub vivify_interval: u64,
    /// Maximal number of clauses vivified per pass. (Default: 1000)
    pub vivify_budget: usize,

    /// Maximal LBD for exporting a learned clause. (Default: 4)
    pub max_export_lbd: usize,
    /// Maximal size for exporting a learned clause. (Default: 30)
    pub max_export_sz: usize,
    /// Conflicts until an unused imported clause is dropped again. (Default: 20000)
    pub confl_to_delete: u64,
    /// Shrink imported clauses against the top-level assignment. (Default: true)
    pub minimize_import: bool,
    /// Only export clauses that went through vivification. (Default: false)
    pub only_export_minimized: bool,
    /// Size of the per-process exchange ring in megabytes. (Default: 16)
    pub exchange_buffer_mb: usize,

    /// Number of solver threads. (Default: 1)
    pub n_threads: usize,
}

impl Default for SolverConfig {
    fn default() -> SolverConfig {
        SolverConfig {
            branch: BranchMode::DistLrbVsids,
            restart: RestartMode::Mixed,
            reduce: ReduceMode::ChanseokOh,
            exchange: ExchangeMode::None,
            analyze: AnalyzeMode::LevelAware,

            ccmin_mode: 2,
            max_ext_bin_res_size: 12,
            max_full_implication_min_lbd: 6,

            chrono: 100,
            confl_to_chrono: 4000,

            restart_first: 100,
            restart_inc: 2.0,
            lbd_queue_size: 50,

            core_lbd_cut: 3,
            first_reduce_mid: 10000,
            first_reduce_local: 15000,
            mid_tier_lifetime: 30000,
            max_protectable_lbd: 30,
            clause_decay: 0.999,
            first_reduce_db: 2000,
            inc_reduce_db: 300,
            special_inc_reduce_db: 1000,

            vsids_var_decay: 0.8,
            vsids_decay_timer: 5000,
            step_size: 0.4,
            step_size_dec: 0.000001,
            min_step_size: 0.06,
            dist_var_decay: 0.6,
            time_to_branch_switch: 2500,
            confl_to_branch_switch: 10000,
            init_pol_zero: true,
            rnd_init_activity: false,
            rnd_polarity: false,
            seed: 91648253,

            garbage_frac: 0.5,

            level_aware_window: 70,
            level_diff_enforce: 15,
            initial_conflicts: 100,

            vivify_interval: 20000,
            vivify_budget: 1000,

            max_export_lbd: 4,
            max_export_sz: 30,
            confl_to_delete: 20000,
            minimize_import: true,
            only_export_minimized: false,
            exchange_buffer_mb: 16,

            n_threads: 1,
        }
    }
}

impl SolverConfig {
    /// Derive the configuration of a worker thread from the base configuration.
    ///
    /// The first two threads keep deterministic initialization, further threads randomize their
    /// initial activities and polarities with a seed derived from the thread id. Alternating
    /// initial polarity diversifies the search right from the start.
    pub fn thread_config(&self, thread_id: usize) -> SolverConfig {
        let mut config = self.clone();

        config.init_pol_zero = thread_id % 2 == 1;
        if thread_id >= 2 {
            config.rnd_init_activity = true;
            config.rnd_polarity = thread_id % 4 > 1;
            config.seed = config.seed.wrapping_add(thread_id as u64);
        }

        config
    }
}
