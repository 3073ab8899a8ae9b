//! Lifetime management for ssh client processes.
//!
//! Every remote command runs as a local `ssh` child. If the verifier is
//! interrupted while a remote `mount` or `diff` is in flight, the ssh client
//! must not linger: it is spawned in its own process group with a parent
//! death signal, its pid is tracked here, and the signal handlers terminate
//! all tracked sessions before exiting.
//!
//! Terminating the local client does not undo remote effects. A mount made
//! before the interruption stays mounted and the next run's mount guard will
//! refuse to proceed until it is released by hand.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static SESSION_REGISTRY: OnceLock<Mutex<SessionRegistry>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL when a signal arrives.
pub const SIGNAL_GRACE: Duration = Duration::from_secs(3);

/// Pids of ssh sessions that are currently running.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    pids: HashSet<u32>,
}

impl SessionRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static Mutex<SessionRegistry> {
        SESSION_REGISTRY.get_or_init(|| Mutex::new(SessionRegistry::default()))
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!(pid, "registered ssh session");
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!(pid, "unregistered ssh session");
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// SIGTERM every tracked session group, wait up to `grace`, then SIGKILL
    /// whatever is left. The registry is empty afterwards.
    pub fn terminate_all(&mut self, grace: Duration) {
        let pids: Vec<u32> = self.pids.drain().collect();
        if pids.is_empty() {
            return;
        }
        info!(sessions = pids.len(), "terminating ssh sessions");

        for &pid in &pids {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                warn!(pid, error = %e, "SIGTERM to session group failed");
            }
        }

        let start = Instant::now();
        while pids.iter().any(|&pid| is_alive(pid)) {
            if start.elapsed() >= grace {
                for pid in pids.iter().copied().filter(|&pid| is_alive(pid)) {
                    warn!(pid, "ssh session ignored SIGTERM, sending SIGKILL");
                    let _ = signal_group(pid, Signal::SIGKILL);
                }
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

/// Negative pid addresses the whole process group.
fn signal_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), sig)
}

/// Alive means the pid exists and is not a zombie.
fn is_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => match stat.split_whitespace().nth(2) {
            Some(state) => !matches!(state, "Z" | "X"),
            None => true,
        },
        Err(_) => true,
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that tear down live ssh sessions
/// and exit with `128 + signal`. Call once at startup.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!(signal = sig, "received signal, cleaning up ssh sessions");
            if let Ok(mut registry) = SessionRegistry::global().lock() {
                registry.terminate_all(SIGNAL_GRACE);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension for `std::process::Command` to isolate a child in its own
/// process group.
pub trait SessionProcessGroup {
    fn in_own_process_group(&mut self) -> &mut Self;
}

impl SessionProcessGroup for std::process::Command {
    fn in_own_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the hook only calls async-signal-safe setpgid and prctl.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}
