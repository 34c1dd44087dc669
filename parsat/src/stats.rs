//! Search statistics.

/// Counters updated during the search.
///
/// The conflict counter doubles as the clock for clause aging, heuristic switching and the
/// exchange cadence.
#[derive(Default)]
pub struct Stats {
    pub conflicts: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub simple_propagations: u64,
    pub restarts: u64,
    pub reductions: u64,
    pub learnt_units: u64,
    pub learnt_binaries: u64,
    pub learnt_longs: u64,
    pub supplementary_learnts: u64,
    pub vivified_clauses: u64,
    pub exported_clauses: u64,
    pub imported_clauses: u64,
    pub promoted_imports: u64,
    pub parked_imports: u64,
    pub collections: u64,
}

impl Stats {
    /// Merge the counters of another solver instance, used for parallel reporting.
    pub fn add(&mut self, other: &Stats) {
        self.conflicts += other.conflicts;
        self.decisions += other.decisions;
        self.propagations += other.propagations;
        self.simple_propagations += other.simple_propagations;
        self.restarts += other.restarts;
        self.reductions += other.reductions;
        self.learnt_units += other.learnt_units;
        self.learnt_binaries += other.learnt_binaries;
        self.learnt_longs += other.learnt_longs;
        self.supplementary_learnts += other.supplementary_learnts;
        self.vivified_clauses += other.vivified_clauses;
        self.exported_clauses += other.exported_clauses;
        self.imported_clauses += other.imported_clauses;
        self.promoted_imports += other.promoted_imports;
        self.parked_imports += other.parked_imports;
        self.collections += other.collections;
    }
}
