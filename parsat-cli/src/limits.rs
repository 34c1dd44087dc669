//! Resource limits and signal wiring.
//!
//! Limits are installed as soft limits: on exhaustion the OS delivers a signal. The handlers do
//! nothing but set the process wide abort flag; the solver threads poll it at their restart
//! boundaries and terminate cooperatively.

use log::{info, warn};

extern "C" fn abort_handler(_signum: libc::c_int) {
    // Only async-signal-safe work is allowed here; storing an atomic flag is.
    parsat::request_abort();
}

/// Route SIGINT and SIGXCPU to the abort flag.
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, abort_handler as libc::sighandler_t);
        libc::signal(libc::SIGXCPU, abort_handler as libc::sighandler_t);
    }
}

/// Install a soft CPU time limit, delivered as SIGXCPU.
pub fn set_cpu_limit(seconds: u64) {
    let limit = libc::rlimit {
        rlim_cur: seconds as libc::rlim_t,
        rlim_max: libc::RLIM_INFINITY,
    };
    let result = unsafe { libc::setrlimit(libc::RLIMIT_CPU, &limit) };
    if result != 0 {
        warn!("could not set the CPU time limit");
    } else {
        info!("CPU time limit: {} seconds", seconds);
    }
}

/// Install a soft address space limit.
pub fn set_mem_limit(megabytes: u64) {
    let limit = libc::rlimit {
        rlim_cur: (megabytes * 1024 * 1024) as libc::rlim_t,
        rlim_max: libc::RLIM_INFINITY,
    };
    let result = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if result != 0 {
        warn!("could not set the memory limit");
    } else {
        info!("memory limit: {} MB", megabytes);
    }
}
