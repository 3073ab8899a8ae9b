//! Remote snapshot verification.
//!
//! One run walks a fixed sequence of stages:
//!
//! ```text
//! Idle
//!     ↓  mount guard (listing unavailable → error, nothing changed)
//! MountChecked
//!     ↓  already mounted → Done, exit 1
//!     ↓  loop mount (failure → Done, exit 1, no unmount)
//! Mounted
//!     ↓  diff -r
//! Compared
//!     ↓  rm -r scratch/*, optional mkdir -p per weekday
//! Cleaned
//!     ↓  umount (status only reported as a warning)
//! Unmounted
//!     ↓
//! Done
//! ```
//!
//! Configurations without a loop mount pass through `MountChecked`,
//! `Mounted` and `Unmounted` without issuing remote commands.
//!
//! The process exit code is the comparison result. Failures after the
//! comparison (clearing, recreating directories, unmounting) never change it;
//! they are collected as `CleanupWarning`s so the caller can report them.

use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ExitPolicy, VerifyConfig};
use crate::error::{Result, SnapError};
use crate::mount_guard;
use crate::remote::{RemoteShell, run_folded};
use crate::weekday::today_index;

/// Exit code for the early exits (already mounted, mount failed).
pub const EARLY_EXIT_CODE: i32 = 1;

/// Map a run's exit code onto a process exit status.
///
/// Codes above 255 are clamped instead of wrapping. Negative codes become 0.
pub fn process_exit_code(code: i32) -> u8 {
    u8::try_from(code.clamp(0, i32::from(u8::MAX))).unwrap_or(u8::MAX)
}

/// Stages of a verification run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VerifyStage {
    Idle = 0,
    MountChecked = 1,
    Mounted = 2,
    Compared = 3,
    Cleaned = 4,
    Unmounted = 5,
    /// Terminal. Reached in order or directly through an early exit.
    Done = 6,
}

impl VerifyStage {
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::MountChecked),
            Self::MountChecked => Some(Self::Mounted),
            Self::Mounted => Some(Self::Compared),
            Self::Compared => Some(Self::Cleaned),
            Self::Cleaned => Some(Self::Unmounted),
            Self::Unmounted => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::MountChecked => "Mount checked",
            Self::Mounted => "Mounted",
            Self::Compared => "Compared",
            Self::Cleaned => "Cleaned",
            Self::Unmounted => "Unmounted",
            Self::Done => "Done",
        }
    }

    pub const fn all_stages() -> &'static [Self] {
        &[
            Self::Idle,
            Self::MountChecked,
            Self::Mounted,
            Self::Compared,
            Self::Cleaned,
            Self::Unmounted,
            Self::Done,
        ]
    }
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Invalid stage transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("Cannot skip from {from} to {to}")]
    SkippedStage { from: VerifyStage, to: VerifyStage },

    #[error("Cannot go backwards from {from} to {to}")]
    BackwardTransition { from: VerifyStage, to: VerifyStage },

    #[error("Cannot leave terminal stage {from}")]
    FromTerminalState { from: VerifyStage },

    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: VerifyStage },
}

impl From<StageTransitionError> for SnapError {
    fn from(err: StageTransitionError) -> Self {
        SnapError::StageTransition(err.to_string())
    }
}

/// Tracks the current stage and every stage entered so far.
#[derive(Debug, Clone)]
pub struct VerifyRun {
    current: VerifyStage,
    history: Vec<VerifyStage>,
}

impl Default for VerifyRun {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifyRun {
    pub fn new() -> Self {
        Self {
            current: VerifyStage::Idle,
            history: vec![VerifyStage::Idle],
        }
    }

    #[inline]
    pub fn current_stage(&self) -> VerifyStage {
        self.current
    }

    pub fn history(&self) -> &[VerifyStage] {
        &self.history
    }

    /// Move to the next stage.
    ///
    /// # Errors
    ///
    /// `FromTerminalState` when already `Done`.
    pub fn advance(&mut self) -> std::result::Result<VerifyStage, StageTransitionError> {
        let Some(next) = self.current.next() else {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        };
        self.enter(next);
        Ok(next)
    }

    /// Move to `target`, which must be the immediate next stage.
    ///
    /// # Errors
    ///
    /// `FromTerminalState`, `AlreadyAtStage`, `BackwardTransition` or
    /// `SkippedStage` depending on how `target` relates to the current stage.
    pub fn transition_to(
        &mut self,
        target: VerifyStage,
    ) -> std::result::Result<VerifyStage, StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        if target == self.current {
            return Err(StageTransitionError::AlreadyAtStage { stage: target });
        }
        if target.order() < self.current.order() {
            return Err(StageTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }
        if self.current.next() != Some(target) {
            return Err(StageTransitionError::SkippedStage {
                from: self.current,
                to: target,
            });
        }
        self.enter(target);
        Ok(target)
    }

    /// Jump straight to `Done` (early exit).
    ///
    /// # Errors
    ///
    /// `FromTerminalState` when already `Done`.
    pub fn finish(&mut self) -> std::result::Result<(), StageTransitionError> {
        if self.current.is_terminal() {
            return Err(StageTransitionError::FromTerminalState { from: self.current });
        }
        self.enter(VerifyStage::Done);
        Ok(())
    }

    fn enter(&mut self, stage: VerifyStage) {
        self.history.push(stage);
        self.current = stage;
    }
}

/// Result of the verification proper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// diff exited 0.
    Identical,
    /// diff exited non-zero: differences or a diff error, indistinguishable.
    Differs(i32),
    /// The mount guard found the mount point in the listing.
    AlreadyMounted,
    /// The loop mount exited non-zero.
    MountFailed(i32),
}

/// Post-comparison step whose failure does not affect the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStep {
    Clear,
    Recreate(String),
    Unmount,
    List,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clear => write!(f, "clear scratch"),
            Self::Recreate(label) => write!(f, "recreate {label}"),
            Self::Unmount => write!(f, "unmount"),
            Self::List => write!(f, "list scratch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub step: CleanupStep,
    pub code: i32,
}

/// Everything a finished run reports.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: VerifyStatus,
    pub history: Vec<VerifyStage>,
    pub warnings: Vec<CleanupWarning>,
    pub exit_policy: ExitPolicy,
}

impl VerifyOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            VerifyStatus::AlreadyMounted | VerifyStatus::MountFailed(_) => EARLY_EXIT_CODE,
            VerifyStatus::Identical => 0,
            VerifyStatus::Differs(code) => match self.exit_policy {
                ExitPolicy::Comparison => code,
                ExitPolicy::AlwaysZero => 0,
            },
        }
    }

    pub fn final_stage(&self) -> VerifyStage {
        self.history.last().copied().unwrap_or(VerifyStage::Idle)
    }
}

fn join(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// Drives one verification run against a remote.
pub struct Verifier<'a, R: RemoteShell + ?Sized> {
    remote: &'a R,
    config: &'a VerifyConfig,
    weekday_index: Option<usize>,
}

impl<'a, R: RemoteShell + ?Sized> Verifier<'a, R> {
    pub fn new(remote: &'a R, config: &'a VerifyConfig) -> Self {
        Self {
            remote,
            config,
            weekday_index: None,
        }
    }

    /// Use `index` instead of today's weekday.
    pub fn with_weekday_index(mut self, index: usize) -> Self {
        self.weekday_index = Some(index);
        self
    }

    /// Weekday label for this run, if the configuration is weekday-scoped.
    fn resolve_day(&self) -> Result<Option<String>> {
        if !self.config.weekday_scope {
            return Ok(None);
        }
        let index = self.weekday_index.unwrap_or_else(today_index);
        self.config
            .weekdays
            .label(index)
            .map(|label| Some(label.to_string()))
            .ok_or_else(|| SnapError::validation(format!("weekday index {index} is out of range")))
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns an error before any remote change when the weekday index is
    /// out of range or ssh cannot be started for the mount listing. Every other
    /// failure is reported through the outcome.
    pub fn run(&self) -> Result<VerifyOutcome> {
        let config = self.config;
        let scratch = config.scratch_dir.as_str();
        let day = self.resolve_day()?;
        let mut run = VerifyRun::new();
        let mut warnings = Vec::new();

        let early_exit = |run: &mut VerifyRun, status: VerifyStatus| -> Result<VerifyOutcome> {
            run.finish()?;
            Ok(VerifyOutcome {
                status,
                history: run.history().to_vec(),
                warnings: Vec::new(),
                exit_policy: config.exit_policy,
            })
        };

        // Idle -> MountChecked
        let already_mounted =
            config.mount.is_some() && mount_guard::is_mounted(self.remote, scratch)?;
        run.transition_to(VerifyStage::MountChecked)?;
        if already_mounted {
            warn!(mount_point = scratch, "mount point already in use, not verifying");
            return early_exit(&mut run, VerifyStatus::AlreadyMounted);
        }

        // MountChecked -> Mounted
        if let Some(mount) = &config.mount {
            let command = format!(
                "mount -o loop,offset={} {} {}",
                mount.offset, mount.image, scratch
            );
            let code = run_folded(self.remote, &command);
            if code != 0 {
                error!(image = %mount.image, code, "unable to mount image");
                eprintln!("Unable to mount {}", mount.image);
                return early_exit(&mut run, VerifyStatus::MountFailed(code));
            }
            info!(image = %mount.image, mount_point = scratch, "image mounted");

            if config.list_after_mount {
                match self.remote.capture(&format!("ls -l {scratch}")) {
                    Ok(listing) => println!("{listing}"),
                    Err(e) => {
                        warn!(error = %e, "could not list scratch directory");
                        warnings.push(CleanupWarning {
                            step: CleanupStep::List,
                            code: EARLY_EXIT_CODE,
                        });
                    }
                }
            }
        }
        run.transition_to(VerifyStage::Mounted)?;

        // Mounted -> Compared
        let target = match &day {
            Some(label) => join(scratch, label),
            None => scratch.to_string(),
        };
        let diff = if config.mount.is_some() {
            format!("diff -r {} {}", target, config.reference_dir)
        } else {
            format!("diff -r {} {}", config.reference_dir, target)
        };
        let code = run_folded(self.remote, &diff);
        let status = if code == 0 {
            VerifyStatus::Identical
        } else {
            VerifyStatus::Differs(code)
        };
        info!(compared = %target, reference = %config.reference_dir, code, "comparison finished");
        run.transition_to(VerifyStage::Compared)?;

        // Compared -> Cleaned
        let clear_dir = if config.mount.is_some() { scratch } else { target.as_str() };
        let code = run_folded(self.remote, &format!("rm -r {clear_dir}/*"));
        if code != 0 {
            warnings.push(CleanupWarning {
                step: CleanupStep::Clear,
                code,
            });
        }
        if config.recreate_weekdays {
            for label in config.weekdays.labels() {
                let code = run_folded(self.remote, &format!("mkdir -p {}", join(scratch, label)));
                if code != 0 {
                    warnings.push(CleanupWarning {
                        step: CleanupStep::Recreate(label.to_string()),
                        code,
                    });
                }
            }
        }
        run.transition_to(VerifyStage::Cleaned)?;

        // Cleaned -> Unmounted
        if config.mount.is_some() {
            let code = run_folded(self.remote, &format!("umount {scratch}"));
            if code != 0 {
                warnings.push(CleanupWarning {
                    step: CleanupStep::Unmount,
                    code,
                });
            }
        }
        run.transition_to(VerifyStage::Unmounted)?;

        run.transition_to(VerifyStage::Done)?;

        for warning in &warnings {
            warn!(step = %warning.step, code = warning.code, "cleanup step failed");
        }

        Ok(VerifyOutcome {
            status,
            history: run.history().to_vec(),
            warnings,
            exit_policy: config.exit_policy,
        })
    }
}
