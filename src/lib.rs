//! snapverify library
//!
//! Remote snapshot verification over ssh (mount guard, loopback mount,
//! recursive diff against a reference tree, scratch cleanup) and a random
//! directory tree generator for test fixtures.

pub mod cli;
pub mod config;
pub mod error;
pub mod mount_guard;
pub mod remote;
pub mod sanity;
pub mod session_guard;
pub mod tree_gen;
pub mod weekday;
pub mod workflow;

pub use config::{ExitPolicy, LoopMount, VerifyConfig, VerifyVariant};
pub use error::{Result, SnapError};
pub use mount_guard::{is_mounted, listing_contains};
pub use remote::{
    DryRunRemote, RemoteShell, RemoteTarget, SshRemote, decode_exit_status, normalize_exit_code,
};
pub use session_guard::{SessionProcessGroup, SessionRegistry};
pub use tree_gen::{TreeGenerator, TreeStats};
pub use weekday::{WeekdayTable, today_index};
pub use workflow::{
    CleanupStep, CleanupWarning, StageTransitionError, Verifier, VerifyOutcome, VerifyRun,
    VerifyStage, VerifyStatus, process_exit_code,
};
