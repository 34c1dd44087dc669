//! Restart policies.
//!
//! Luby restarts follow the reluctant doubling sequence scaled by a conflict interval. Glucose
//! restarts trigger when the recent average LBD is high compared to the global average, meaning
//! the solver currently learns bad clauses. The mixed policy couples to the branching heuristic:
//! Luby while LRB is branching, Glucose while VSIDS is branching. Glucose style restarts would
//! cancel assignments too often for LRB's reward bookkeeping to pay off.

use crate::avg_queue::AvgQueue;
use crate::config::{RestartMode, SolverConfig};

/// Restart policy state.
pub struct Restart {
    mode: RestartMode,
    is_luby: bool,
    cached: bool,
    should: bool,
    conflicts_to_restart: i64,
    curr_restarts: u64,
    restart_first: u64,
    restart_inc: f64,
    lbd_queue: AvgQueue,
    glucose_conflicts: u64,
    global_lbd_sum: u64,
}

impl Default for Restart {
    fn default() -> Restart {
        let config = SolverConfig::default();
        Restart {
            mode: config.restart,
            is_luby: config.restart == RestartMode::Luby,
            cached: false,
            should: false,
            conflicts_to_restart: config.restart_first as i64,
            curr_restarts: 1,
            restart_first: config.restart_first,
            restart_inc: config.restart_inc,
            lbd_queue: AvgQueue::new(config.lbd_queue_size),
            glucose_conflicts: 0,
            global_lbd_sum: 0,
        }
    }
}

/// The finite subsequence of the Luby sequence containing index `x`.
fn luby(y: f64, mut x: u64) -> f64 {
    let mut size = 1u64;
    let mut seq = 0i32;
    while size < x + 1 {
        seq += 1;
        size = 2 * size + 1;
    }

    while size - 1 != x {
        size = (size - 1) >> 1;
        seq -= 1;
        x %= size;
    }

    y.powi(seq)
}

impl Restart {
    /// Apply a configuration.
    pub fn configure(&mut self, config: &SolverConfig) {
        self.mode = config.restart;
        // The mixed policy starts out with Glucose restarts, as branching starts with VSIDS.
        self.is_luby = config.restart == RestartMode::Luby;
        self.restart_first = config.restart_first;
        self.restart_inc = config.restart_inc;
        self.conflicts_to_restart = config.restart_first as i64;
        self.curr_restarts = 1;
        self.lbd_queue = AvgQueue::new(config.lbd_queue_size);
    }

    /// A restart happened, set up the next interval.
    pub fn on_restart(&mut self, lrb_active: bool) {
        if self.mode == RestartMode::Mixed {
            self.is_luby = lrb_active;
        }
        if self.is_luby {
            self.conflicts_to_restart =
                (luby(self.restart_inc, self.curr_restarts) * self.restart_first as f64) as i64;
            self.curr_restarts += 1;
        } else {
            self.cached = false;
            self.lbd_queue.clear();
        }
    }

    /// A conflict was found.
    pub fn on_conflict_found(&mut self) {
        if self.is_luby {
            self.conflicts_to_restart -= 1;
        }
    }

    /// A conflict was resolved with a learned clause of the given LBD.
    pub fn on_conflict_resolved(&mut self, lbd: usize) {
        if !self.is_luby {
            self.cached = false;
            self.glucose_conflicts += 1;
            self.lbd_queue.push(lbd as i64);
            self.global_lbd_sum += lbd.min(50) as u64;
        }
    }

    /// Whether a restart is due.
    pub fn should_restart(&mut self) -> bool {
        if self.is_luby {
            self.conflicts_to_restart <= 0
        } else {
            if !self.cached {
                self.should = self.lbd_queue.full()
                    && self.glucose_conflicts > 0
                    && self.lbd_queue.avg() * 0.8
                        > self.global_lbd_sum as f64 / self.glucose_conflicts as f64;
                self.cached = true;
            }
            self.should
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luby_sequence() {
        let initial_terms: Vec<_> = (0..15).map(|x| luby(2.0, x) as u64).collect();
        assert_eq!(
            initial_terms,
            vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]
        );
    }

    #[test]
    fn luby_restarts_fire_on_schedule() {
        let mut restart = Restart::default();
        restart.configure(&SolverConfig {
            restart: RestartMode::Luby,
            restart_first: 2,
            ..SolverConfig::default()
        });

        let mut restarts = 0;
        let mut intervals = vec![];
        let mut current = 0;
        for _ in 0..40 {
            restart.on_conflict_found();
            current += 1;
            if restart.should_restart() {
                restart.on_restart(false);
                restarts += 1;
                intervals.push(current);
                current = 0;
            }
        }

        assert!(restarts > 0);
        // Scaled reluctant doubling: 2, 2, 4, 2, 2, 4, 8, ...
        assert_eq!(&intervals[..7], &[2, 2, 4, 2, 2, 4, 8]);
    }

    #[test]
    fn glucose_restarts_on_bad_lbd_streak() {
        let mut restart = Restart::default();
        restart.configure(&SolverConfig {
            restart: RestartMode::Glucose,
            lbd_queue_size: 10,
            ..SolverConfig::default()
        });

        // A long run of good clauses keeps the global average low.
        for _ in 0..100 {
            restart.on_conflict_resolved(2);
        }
        assert!(!restart.should_restart());

        // A streak of bad clauses raises the recent average above the threshold.
        for _ in 0..10 {
            restart.on_conflict_resolved(30);
        }
        assert!(restart.should_restart());
    }
}
