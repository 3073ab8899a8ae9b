//! Pre-flight checks before talking to the remote host.
//!
//! A missing ssh client would otherwise surface as exit code 127 from the
//! first remote command, indistinguishable from a remote failure.

use crate::session_guard::SessionProcessGroup;
use std::process::Command;
use tracing::debug;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
}

impl SanityCheckResult {
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
    }
}

/// Check if a binary is available in PATH (or at the given path)
fn binary_exists(name: &str) -> bool {
    if name.contains('/') {
        return std::path::Path::new(name).is_file();
    }
    Command::new("which")
        .arg(name)
        .in_own_process_group()
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Verify that every program in `required` can be found.
pub fn verify_environment(required: &[&str]) -> SanityCheckResult {
    let missing_binaries = required
        .iter()
        .filter(|name| !binary_exists(name))
        .map(|name| (*name).to_string())
        .collect::<Vec<_>>();
    debug!(?missing_binaries, "environment checked");
    SanityCheckResult { missing_binaries }
}
