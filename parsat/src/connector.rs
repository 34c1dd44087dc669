//! Process-wide state shared by all solver instances.
//!
//! The connector holds the atomic result of the solve, the committed model and the clause
//! exchange ring. Solver threads only touch it at restart boundaries and through the exchange,
//! the CDCL inner loop has no suspension points.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::exchange::ring::ExchangeRing;

/// Result of a parallel solve.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolveResult {
    Unknown,
    Aborted,
    Unsat,
    Sat,
}

const RESULT_UNDEF: u32 = 0;
const RESULT_ABORTED: u32 = 1;
const RESULT_UNSAT: u32 = 2;
const RESULT_SAT: u32 = 3;

/// Process-wide abort flag, set from signal handlers.
///
/// Signal handlers only store this flag; all shutdown work happens at the solvers' restart
/// boundaries, where the flag is polled.
static ABORT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Request all solvers to abort at their next restart boundary.
///
/// Async-signal-safe.
pub fn request_abort() {
    ABORT_REQUESTED.store(true, Ordering::Release);
}

/// Whether an abort was requested externally.
pub fn abort_requested() -> bool {
    ABORT_REQUESTED.load(Ordering::Acquire)
}

/// Shared run state of a set of solver instances.
pub struct Connector {
    result: AtomicU32,
    running_threads: AtomicUsize,
    initialized_threads: AtomicUsize,
    model_committed: AtomicBool,
    model: Mutex<Vec<Option<bool>>>,
    id_counter: AtomicU32,
    ring: ExchangeRing,
}

impl Connector {
    /// Create a connector with an exchange ring of the given size.
    pub fn new(exchange_bytes: usize) -> Connector {
        Connector {
            result: AtomicU32::new(RESULT_UNDEF),
            running_threads: AtomicUsize::new(0),
            initialized_threads: AtomicUsize::new(0),
            model_committed: AtomicBool::new(false),
            model: Mutex::new(vec![]),
            id_counter: AtomicU32::new(0),
            ring: ExchangeRing::new(exchange_bytes),
        }
    }

    /// The shared clause exchange ring.
    pub fn ring(&self) -> &ExchangeRing {
        &self.ring
    }

    /// A fresh origin id for a solver instance.
    pub fn unique_id(&self) -> u32 {
        self.id_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn notify_thread_start(&self) {
        self.running_threads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn notify_thread_end(&self) {
        self.running_threads.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn notify_thread_initialized(&self) {
        self.initialized_threads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn running_threads(&self) -> usize {
        self.running_threads.load(Ordering::SeqCst)
    }

    /// Block until the given number of threads finished their setup.
    pub fn wait_initialized(&self, threads: usize) {
        while self.initialized_threads.load(Ordering::SeqCst) < threads {
            self.sleep();
        }
    }

    /// Transition to the aborted state unless a result was already committed.
    pub fn abort(&self) {
        let _ = self.result.compare_exchange(
            RESULT_UNDEF,
            RESULT_ABORTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Commit a result. Returns true when this call won the race.
    pub fn set_finished(&self, sat: bool) -> bool {
        let value = if sat { RESULT_SAT } else { RESULT_UNSAT };
        self.result
            .compare_exchange(RESULT_UNDEF, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether any solver finished or an abort happened.
    pub fn is_finished(&self) -> bool {
        self.result.load(Ordering::SeqCst) != RESULT_UNDEF || abort_requested()
    }

    /// The committed result.
    pub fn result(&self) -> SolveResult {
        match self.result.load(Ordering::SeqCst) {
            RESULT_SAT => SolveResult::Sat,
            RESULT_UNSAT => SolveResult::Unsat,
            RESULT_ABORTED => SolveResult::Aborted,
            _ => SolveResult::Unknown,
        }
    }

    /// Store the model of the winning solver.
    ///
    /// Only the solver whose `set_finished` call returned true may commit a model, so this is a
    /// once-only write.
    pub fn commit_model(&self, model: Vec<Option<bool>>) {
        {
            let mut slot = self.model.lock().unwrap();
            debug_assert!(slot.is_empty());
            *slot = model;
        }
        debug_assert!(!self.model_committed.load(Ordering::SeqCst));
        self.model_committed.store(true, Ordering::Release);
    }

    /// The committed model. Blocks until the winning solver has committed it.
    pub fn model(&self) -> Vec<Option<bool>> {
        debug_assert_eq!(self.result(), SolveResult::Sat);
        while !self.model_committed.load(Ordering::Acquire) {
            self.sleep();
        }
        self.model.lock().unwrap().clone()
    }

    /// Idle wait used outside the search loops.
    pub fn sleep(&self) {
        std::thread::sleep(Duration::from_micros(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn only_first_result_wins() {
        let connector = Connector::new(4096);

        assert!(!connector.is_finished());
        assert!(connector.set_finished(false));
        assert!(!connector.set_finished(true));
        assert_eq!(connector.result(), SolveResult::Unsat);

        // An abort after a result does not change it.
        connector.abort();
        assert_eq!(connector.result(), SolveResult::Unsat);
    }

    #[test]
    fn model_commit_is_visible() {
        let connector = Arc::new(Connector::new(4096));

        assert!(connector.set_finished(true));

        let committer = Arc::clone(&connector);
        let handle = std::thread::spawn(move || {
            committer.commit_model(vec![Some(true), Some(false), None]);
        });

        let model = connector.model();
        assert_eq!(model, vec![Some(true), Some(false), None]);
        handle.join().unwrap();
    }
}
