//! Process lifecycle management for child processes
//!
//! The filter command runs while afx blocks on it. If afx is interrupted or
//! killed in the meantime, the filter must not be left running on the
//! terminal.
//!
//! - Track all child PIDs in a global registry
//! - On SIGINT, SIGTERM or SIGHUP, send SIGTERM to all registered children
//! - Children get a parent-death signal so they exit even if afx is SIGKILLed
//!
//! Filters stay in the foreground process group: interactive finders read the
//! terminal and would be stopped with SIGTTIN from a background group.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Prevents double cleanup when a signal races with Drop
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!(pid, "Registered child process");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!(pid, "Unregistered child process");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Send SIGTERM to every tracked child, wait up to `grace_period`, then SIGKILL
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        info!(count = self.pids.len(), "Terminating child processes");

        let pids: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids {
            if let Err(e) = send_signal(pid, Signal::SIGTERM) {
                warn!(pid, error = %e, "Failed to send SIGTERM");
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids.iter().all(|&pid| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        for &pid in &pids {
            if is_process_alive(pid) {
                warn!(pid, "Child did not terminate, sending SIGKILL");
                let _ = send_signal(pid, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// RAII registration of one running child.
///
/// Registers on creation and unregisters on drop, so every exit path out of
/// the blocking wait releases the PID.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
    pid: u32,
}

impl ProcessGuard {
    pub fn register(pid: u32) -> Self {
        let registry = ChildRegistry::global();
        if let Ok(mut guard) = registry.lock() {
            guard.register(pid);
        }
        Self { registry, pid }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.registry.lock() {
            guard.unregister(self.pid);
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP that terminate registered
/// children and exit with 128 + signal. Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "Received signal, cleaning up");
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command
pub trait CommandDeathSignal {
    /// Deliver SIGTERM to the child when afx dies
    fn with_parent_death_signal(&mut self) -> &mut Self;
}

impl CommandDeathSignal for std::process::Command {
    fn with_parent_death_signal(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls the async-signal-safe prctl(2)
        unsafe {
            self.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
