//! Remote command execution over ssh.
//!
//! The verification workflow only needs two things from the remote side:
//! run a command and get its exit status, or run a command and get its
//! standard output. Both sit behind `RemoteShell` so the workflow can be
//! driven against a scripted remote in tests and against `DryRunRemote`
//! from the command line.
//!
//! Command strings are sent verbatim and interpreted by the remote shell
//! (globs such as `rm -r /scratch/*` rely on that). No quoting is applied;
//! callers are responsible for only interpolating validated paths.

use crate::error::{Result, SnapError};
use crate::session_guard::{SessionProcessGroup, SessionRegistry};
use serde::{Deserialize, Serialize};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Output, Stdio};
use tracing::{debug, info, warn};

/// Exit code substituted when the local ssh client cannot be started,
/// matching what a shell reports for a missing command.
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Synchronous access to a remote host.
pub trait RemoteShell {
    /// Run `command` remotely and return its decoded exit status.
    ///
    /// The value is negative when the process was killed by a signal; pass
    /// it through [`normalize_exit_code`] before using it as an exit code.
    ///
    /// # Errors
    ///
    /// Returns an error only when the command could not be dispatched at all.
    fn run(&self, command: &str) -> Result<i32>;

    /// Run `command` remotely and return its standard output as text.
    ///
    /// The exit status is not checked: `df` exits non-zero when a single
    /// filesystem is unreadable but still prints the rest of the listing.
    ///
    /// # Errors
    ///
    /// Returns an error only when the command could not be dispatched at all.
    fn capture(&self, command: &str) -> Result<String>;
}

/// Convert a wait status into a plain exit code: the exit code when the
/// process exited, `-signal` when it was killed.
pub fn decode_exit_status(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(sig)) => -sig,
        (None, None) => -1,
    }
}

/// Fold a signal-terminated status into its positive magnitude.
pub fn normalize_exit_code(code: i32) -> i32 {
    code.saturating_abs()
}

/// Where and how to reach the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    /// Extra options placed before the destination (e.g. `-o BatchMode=yes`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_options: Vec<String>,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

impl RemoteTarget {
    pub fn new(user: &str, host: &str) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
            port: None,
            ssh_program: default_ssh_program(),
            ssh_options: Vec::new(),
        }
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Arguments passed to the ssh program, command last.
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.ssh_options.len() + 4);
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.extend(self.ssh_options.iter().cloned());
        args.push(self.destination());
        args.push(command.to_string());
        args
    }
}

impl Default for RemoteTarget {
    fn default() -> Self {
        Self::new("root", "bach.dest.1")
    }
}

/// Runs commands through the local ssh client.
#[derive(Debug, Clone)]
pub struct SshRemote {
    target: RemoteTarget,
}

impl SshRemote {
    pub fn new(target: RemoteTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Spawn ssh, track it for signal cleanup, and wait for it.
    fn execute(&self, command: &str, capture_stdout: bool) -> Result<Output> {
        let args = self.target.ssh_args(command);
        debug!(program = %self.target.ssh_program, ?args, "spawning ssh");

        let mut cmd = Command::new(&self.target.ssh_program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .in_own_process_group();
        if capture_stdout {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit());
        }

        let child = cmd.spawn().map_err(|e| {
            SnapError::spawn(format!("{}: {}", self.target.ssh_program, e))
        })?;
        let pid = child.id();

        if let Ok(mut registry) = SessionRegistry::global().lock() {
            registry.register(pid);
        }
        let output = child.wait_with_output();
        if let Ok(mut registry) = SessionRegistry::global().lock() {
            registry.unregister(pid);
        }

        output.map_err(|e| SnapError::spawn(format!("waiting for ssh: {e}")))
    }
}

impl RemoteShell for SshRemote {
    fn run(&self, command: &str) -> Result<i32> {
        let output = self.execute(command, false)?;
        let code = decode_exit_status(output.status);
        info!(destination = %self.target.destination(), command, code, "remote command finished");
        Ok(code)
    }

    fn capture(&self, command: &str) -> Result<String> {
        let output = self.execute(command, true)?;
        let code = decode_exit_status(output.status);
        if code != 0 {
            warn!(destination = %self.target.destination(), command, code, "remote query exited non-zero, using its output anyway");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Logs each command instead of running it. Every command succeeds and every
/// capture is empty, so a dry run walks the whole success path.
#[derive(Debug, Clone, Default)]
pub struct DryRunRemote {
    destination: String,
}

impl DryRunRemote {
    pub fn new(target: &RemoteTarget) -> Self {
        Self {
            destination: target.destination(),
        }
    }
}

impl RemoteShell for DryRunRemote {
    fn run(&self, command: &str) -> Result<i32> {
        info!(destination = %self.destination, command, "[DRY RUN] skipped");
        println!("[DRY RUN] ssh {} {}", self.destination, command);
        Ok(0)
    }

    fn capture(&self, command: &str) -> Result<String> {
        info!(destination = %self.destination, command, "[DRY RUN] skipped capture");
        println!("[DRY RUN] ssh {} {}", self.destination, command);
        Ok(String::new())
    }
}

/// Run a command whose failure to dispatch is folded into an exit code.
///
/// Remote failure, a missing ssh client and a non-zero remote exit all end up
/// as a non-zero code; the caller cannot tell them apart.
pub fn run_folded<R: RemoteShell + ?Sized>(remote: &R, command: &str) -> i32 {
    match remote.run(command) {
        Ok(code) => normalize_exit_code(code),
        Err(e) => {
            warn!(command, error = %e, "remote command could not be dispatched");
            SPAWN_FAILURE_CODE
        }
    }
}
