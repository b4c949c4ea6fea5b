//! Daemonization, PID file handling, memory locking, and real-time
//! scheduling priority — the process-lifecycle plumbing a runnable daemon
//! needs around the harvesting control loop.

use std::fs;
use std::path::Path;

pub const DEFAULT_PID_FILE: &str = "/var/run/audio-entropyd.pid";

/// Fork into the background unless `foreground` is set, matching the
/// original source's `-f`/foreground flag. The parent exits immediately;
/// the child continues running with its controlling terminal detached.
pub fn daemonize(foreground: bool) {
    if foreground {
        return;
    }
    unsafe {
        match libc::fork() {
            -1 => {
                log::error!("CRIT: fork() failed, continuing in foreground");
            }
            0 => {
                libc::setsid();
            }
            _child_pid => {
                std::process::exit(0);
            }
        }
    }
}

/// Write the running process's PID to `path`. Returns an error message on
/// failure rather than exiting directly — the caller decides whether a
/// PID-file failure is fatal.
pub fn write_pid_file(path: &str) -> Result<(), String> {
    let pid = std::process::id();
    fs::write(path, format!("{pid}\n"))
        .map_err(|e| format!("couldn't open PID file \"{path}\" for writing: {e}"))
}

/// Remove the PID file on graceful exit. Best-effort: a missing file is not
/// an error (the daemon may never have reached the point of creating one).
pub fn remove_pid_file(path: &str) {
    if Path::new(path).exists() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("failed to remove PID file \"{path}\": {e}");
        }
    }
}

/// Lock all current and future process memory into RAM, keeping key
/// material and accumulator state out of swap. Returns whether the lock
/// succeeded; a failure (typically `EPERM` when unprivileged) is logged
/// but is not fatal, matching the original source.
pub fn lock_memory() -> bool {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc == -1 {
        log::warn!(
            "mlockall failed: {}",
            std::io::Error::last_os_error()
        );
        false
    } else {
        true
    }
}

/// Attempt to raise this process to `SCHED_FIFO` at a low fixed priority,
/// so kernel-pool crediting isn't starved by other work on the host.
/// Failure (typically `EPERM`) is logged as a warning, not fatal.
pub fn raise_scheduling_priority() {
    let priority = unsafe { libc::sched_get_priority_min(libc::SCHED_FIFO) };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc < 0 {
        log::warn!(
            "sched_setscheduler(SCHED_FIFO) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_remove_pid_file_round_trips() {
        let path = std::env::temp_dir().join(format!("aed-test-pid-{}", std::process::id()));
        let path_str = path.to_str().unwrap();

        write_pid_file(path_str).unwrap();
        let contents = fs::read_to_string(path_str).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        remove_pid_file(path_str);
        assert!(!Path::new(path_str).exists());
    }

    #[test]
    fn remove_pid_file_on_missing_path_is_a_noop() {
        remove_pid_file("/nonexistent/path/for/aed/tests/pid");
    }

    #[test]
    fn write_pid_file_reports_error_on_unwritable_path() {
        let err = write_pid_file("/nonexistent-directory-xyz/pid");
        assert!(err.is_err());
    }
}
