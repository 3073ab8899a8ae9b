//! Tests for the verification workflow
//!
//! These tests drive `Verifier` against a scripted remote that records every
//! command and answers with canned exit codes and mount listings.

use snapverify::config::{ExitPolicy, VerifyConfig, VerifyVariant};
use snapverify::error::{Result, SnapError};
use snapverify::remote::{DryRunRemote, RemoteShell, RemoteTarget, SshRemote};
use snapverify::workflow::{CleanupStep, Verifier, VerifyStage, VerifyStatus};
use std::cell::RefCell;

const DF_CLEAN: &str = "\
Filesystem     1K-blocks    Used Available Use% Mounted on
/dev/sda1       20511312 8123456  11323232  42% /
";

const DF_MOUNTED: &str = "\
Filesystem     1K-blocks    Used Available Use% Mounted on
/dev/sda1       20511312 8123456  11323232  42% /
/dev/loop0         98304    1024     89600   2% /root/test2
";

/// Remote that records commands and answers from a script.
struct ScriptedRemote {
    listing: Option<String>,
    codes: Vec<(&'static str, i32)>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRemote {
    fn new(listing: &str) -> Self {
        Self {
            listing: Some(listing.to_string()),
            codes: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            listing: None,
            codes: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Commands starting with `prefix` exit with `code`.
    fn with_code(mut self, prefix: &'static str, code: i32) -> Self {
        self.codes.push((prefix, code));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl RemoteShell for ScriptedRemote {
    fn run(&self, command: &str) -> Result<i32> {
        self.calls.borrow_mut().push(command.to_string());
        Ok(self
            .codes
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix))
            .map(|(_, code)| *code)
            .unwrap_or(0))
    }

    fn capture(&self, command: &str) -> Result<String> {
        self.calls.borrow_mut().push(command.to_string());
        if command.starts_with("ls") {
            return Ok("total 0\n".to_string());
        }
        self.listing
            .clone()
            .ok_or_else(|| SnapError::spawn("ssh: No such file or directory"))
    }
}

// =============================================================================
// Mount guard early exit
// =============================================================================

#[test]
fn test_already_mounted_skips_everything() {
    let remote = ScriptedRemote::new(DF_MOUNTED);
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::AlreadyMounted);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(remote.calls(), vec!["df"]);
    assert_eq!(remote.count("mount"), 0);
    assert_eq!(remote.count("diff"), 0);
    assert_eq!(remote.count("umount"), 0);
    assert_eq!(remote.count("rm"), 0);
    assert_eq!(
        outcome.history,
        vec![VerifyStage::Idle, VerifyStage::MountChecked, VerifyStage::Done]
    );
}

#[test]
fn test_guard_over_matches_longer_mount_point() {
    // /root/test20 is a different mount point, but the substring check
    // still treats /root/test2 as mounted.
    let remote = ScriptedRemote::new("/dev/loop1 98304 1024 89600 2% /root/test20\n");
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::AlreadyMounted);
    assert_eq!(remote.count("mount"), 0);
}

#[test]
fn test_unreachable_listing_aborts_before_mount() {
    let remote = ScriptedRemote::unreachable();
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let err = Verifier::new(&remote, &config).run().unwrap_err();

    assert!(matches!(err, SnapError::Spawn(_)));
    assert_eq!(remote.calls(), vec!["df"]);
}

#[test]
fn test_df_nonzero_exit_still_scanned() {
    // `sh -c` stands in for ssh: `df` prints a clean listing and exits 1,
    // every other command succeeds.
    let mut config = VerifyConfig::preset(VerifyVariant::LoopImage);
    config.remote = RemoteTarget {
        ssh_program: "sh".to_string(),
        ssh_options: vec![
            "-c".to_string(),
            "case \"$1\" in df) echo '/dev/sda1 1 1 1 1% /'; exit 1;; *) exit 0;; esac".to_string(),
        ],
        ..RemoteTarget::default()
    };
    let remote = SshRemote::new(config.remote.clone());

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::Identical);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.final_stage(), VerifyStage::Done);
}

#[test]
fn test_df_nonzero_exit_with_mount_point_trips_guard() {
    let mut config = VerifyConfig::preset(VerifyVariant::LoopImage);
    config.remote = RemoteTarget {
        ssh_program: "sh".to_string(),
        ssh_options: vec![
            "-c".to_string(),
            "case \"$1\" in df) echo '/dev/loop0 1 1 1 1% /root/test2'; exit 1;; *) exit 0;; esac".to_string(),
        ],
        ..RemoteTarget::default()
    };
    let remote = SshRemote::new(config.remote.clone());

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::AlreadyMounted);
    assert_eq!(outcome.exit_code(), 1);
}

// =============================================================================
// Mount failure
// =============================================================================

#[test]
fn test_mount_failure_exits_one_without_unmount() {
    let remote = ScriptedRemote::new(DF_CLEAN).with_code("mount", 32);
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::MountFailed(32));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(
        remote.calls(),
        vec!["df", "mount -o loop,offset=1048576 /root/test.img /root/test2"]
    );
    assert_eq!(
        outcome.history,
        vec![VerifyStage::Idle, VerifyStage::MountChecked, VerifyStage::Done]
    );
}

// =============================================================================
// Full cycles
// =============================================================================

#[test]
fn test_loop_image_weekday_success_cycle() {
    let remote = ScriptedRemote::new(DF_CLEAN);
    let config = VerifyConfig::preset(VerifyVariant::LoopImageWeekday);

    let outcome = Verifier::new(&remote, &config)
        .with_weekday_index(3)
        .run()
        .unwrap();

    assert_eq!(outcome.status, VerifyStatus::Identical);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.history, VerifyStage::all_stages());
    assert_eq!(
        remote.calls(),
        vec![
            "df",
            "mount -o loop,offset=1048576 /root/test2.img /root/test2",
            "ls -l /root/test2",
            "diff -r /root/test2/Thurday /root/compare",
            "rm -r /root/test2/*",
            "mkdir -p /root/test2/Monday",
            "mkdir -p /root/test2/Tuesday",
            "mkdir -p /root/test2/Wednesday",
            "mkdir -p /root/test2/Thurday",
            "mkdir -p /root/test2/Friday",
            "mkdir -p /root/test2/Saturday",
            "mkdir -p /root/test2/Sunday",
            "umount /root/test2",
        ]
    );
}

#[test]
fn test_loop_image_difference_is_exit_code() {
    let remote = ScriptedRemote::new(DF_CLEAN).with_code("diff", 1);
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::Differs(1));
    assert_eq!(outcome.exit_code(), 1);
    // cleanup and unmount still happen after a mismatch
    assert_eq!(remote.count("rm -r /root/test2/*"), 1);
    assert_eq!(remote.count("umount /root/test2"), 1);
    assert_eq!(remote.count("mkdir"), 0);
    assert_eq!(outcome.final_stage(), VerifyStage::Done);
}

#[test]
fn test_signal_terminated_diff_is_normalized() {
    let remote = ScriptedRemote::new(DF_CLEAN).with_code("diff", -9);
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.status, VerifyStatus::Differs(9));
    assert_eq!(outcome.exit_code(), 9);
}

#[test]
fn test_cleanup_failures_are_warnings_only() {
    let remote = ScriptedRemote::new(DF_CLEAN)
        .with_code("rm", 1)
        .with_code("umount", 32);
    let config = VerifyConfig::preset(VerifyVariant::LoopImage);

    let outcome = Verifier::new(&remote, &config).run().unwrap();

    assert_eq!(outcome.exit_code(), 0);
    let steps: Vec<CleanupStep> = outcome.warnings.iter().map(|w| w.step.clone()).collect();
    assert_eq!(steps, vec![CleanupStep::Clear, CleanupStep::Unmount]);
    assert_eq!(outcome.warnings[1].code, 32);
}

// =============================================================================
// Weekday directory variants (no mount)
// =============================================================================

#[test]
fn test_weekday_dir_never_mounts_and_always_exits_zero() {
    let remote = ScriptedRemote::new(DF_MOUNTED).with_code("diff", 1);
    let config = VerifyConfig::preset(VerifyVariant::WeekdayDir);
    assert_eq!(config.exit_policy, ExitPolicy::AlwaysZero);

    let outcome = Verifier::new(&remote, &config)
        .with_weekday_index(3)
        .run()
        .unwrap();

    assert_eq!(outcome.status, VerifyStatus::Differs(1));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        remote.calls(),
        vec![
            "diff -r /root/compare /root/dummy-dat-weekday/Thurday",
            "rm -r /root/dummy-dat-weekday/Thurday/*",
        ]
    );
    assert_eq!(outcome.history, VerifyStage::all_stages());
}

#[test]
fn test_weekday_dir2_reports_difference() {
    let remote = ScriptedRemote::new(DF_CLEAN).with_code("diff", 2);
    let config = VerifyConfig::preset(VerifyVariant::WeekdayDir2);

    let outcome = Verifier::new(&remote, &config)
        .with_weekday_index(3)
        .run()
        .unwrap();

    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(
        remote.calls()[0],
        "diff -r /root/compare /root/dummy-dat-weekday2/Thursday"
    );
}

#[test]
fn test_weekday_out_of_range_issues_no_commands() {
    let remote = ScriptedRemote::new(DF_CLEAN);
    let config = VerifyConfig::preset(VerifyVariant::LoopImageWeekday);

    let err = Verifier::new(&remote, &config)
        .with_weekday_index(7)
        .run()
        .unwrap_err();

    assert!(matches!(err, SnapError::Validation(_)));
    assert!(remote.calls().is_empty());
}

#[test]
fn test_today_is_resolved_once_per_run() {
    let remote = ScriptedRemote::new(DF_CLEAN);
    let config = VerifyConfig::preset(VerifyVariant::WeekdayDir2);

    Verifier::new(&remote, &config).run().unwrap();

    let calls = remote.calls();
    let day = calls[0].rsplit('/').next().unwrap().to_string();
    assert!(config.weekdays.labels().any(|label| label == day));
    assert_eq!(calls[1], format!("rm -r /root/dummy-dat-weekday2/{day}/*"));
}

// =============================================================================
// Dry run
// =============================================================================

#[test]
fn test_dry_run_walks_success_path() {
    let config = VerifyConfig::preset(VerifyVariant::LoopImageWeekday);
    let remote = DryRunRemote::new(&config.remote);

    let outcome = Verifier::new(&remote, &config)
        .with_weekday_index(0)
        .run()
        .unwrap();

    assert_eq!(outcome.status, VerifyStatus::Identical);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.final_stage(), VerifyStage::Done);
}
