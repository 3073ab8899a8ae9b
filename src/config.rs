//! Verification job configuration.
//!
//! Every fixed value the verification job depends on (host, scratch mount
//! point, image, offset, reference tree) lives in `VerifyConfig` and is
//! injected into the workflow. Four presets reproduce the jobs that were in
//! service; a JSON file can describe anything else.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

use crate::error::SnapError;
use crate::remote::RemoteTarget;
use crate::weekday::WeekdayTable;

/// Byte offset of the first partition inside the disk images.
pub const DEFAULT_LOOP_OFFSET: u64 = 1_048_576;

/// Reference tree every job compares against.
pub const DEFAULT_REFERENCE_DIR: &str = "/root/compare";

/// Loopback image to attach before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopMount {
    pub image: String,
    pub offset: u64,
}

/// How the comparison result becomes the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExitPolicy {
    /// Exit with the normalized diff status.
    #[default]
    Comparison,
    /// Always exit 0 after a completed run; the diff status is only logged.
    AlwaysZero,
}

/// Named presets for the verification jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum VerifyVariant {
    /// Compare today's weekday directory, no mount, always exit 0.
    WeekdayDir,
    /// Compare today's weekday directory in the second tree, no mount.
    WeekdayDir2,
    /// Mount the image and compare its whole tree.
    #[default]
    LoopImage,
    /// Mount the weekday image, compare today's directory, recreate the
    /// weekday directories for the next run.
    LoopImageWeekday,
}

/// Everything a verification run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    pub remote: RemoteTarget,
    /// Mount point when `mount` is set, otherwise the directory holding the
    /// weekday subdirectories.
    pub scratch_dir: String,
    pub reference_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<LoopMount>,
    /// Compare `<scratch_dir>/<weekday>` instead of `scratch_dir`.
    #[serde(default)]
    pub weekday_scope: bool,
    /// After clearing, recreate one empty directory per weekday label.
    #[serde(default)]
    pub recreate_weekdays: bool,
    /// Print a remote `ls -l` of the scratch directory after mounting.
    #[serde(default)]
    pub list_after_mount: bool,
    #[serde(default)]
    pub exit_policy: ExitPolicy,
    #[serde(default)]
    pub weekdays: WeekdayTable,
}

impl VerifyConfig {
    /// Configuration of a named preset.
    pub fn preset(variant: VerifyVariant) -> Self {
        let remote = RemoteTarget::default();
        let reference_dir = DEFAULT_REFERENCE_DIR.to_string();
        match variant {
            VerifyVariant::WeekdayDir => Self {
                remote,
                scratch_dir: "/root/dummy-dat-weekday".to_string(),
                reference_dir,
                mount: None,
                weekday_scope: true,
                recreate_weekdays: false,
                list_after_mount: false,
                exit_policy: ExitPolicy::AlwaysZero,
                weekdays: WeekdayTable::legacy(),
            },
            VerifyVariant::WeekdayDir2 => Self {
                remote,
                scratch_dir: "/root/dummy-dat-weekday2".to_string(),
                reference_dir,
                mount: None,
                weekday_scope: true,
                recreate_weekdays: false,
                list_after_mount: false,
                exit_policy: ExitPolicy::Comparison,
                weekdays: WeekdayTable::standard(),
            },
            VerifyVariant::LoopImage => Self {
                remote,
                scratch_dir: "/root/test2".to_string(),
                reference_dir,
                mount: Some(LoopMount {
                    image: "/root/test.img".to_string(),
                    offset: DEFAULT_LOOP_OFFSET,
                }),
                weekday_scope: false,
                recreate_weekdays: false,
                list_after_mount: false,
                exit_policy: ExitPolicy::Comparison,
                weekdays: WeekdayTable::standard(),
            },
            VerifyVariant::LoopImageWeekday => Self {
                remote,
                scratch_dir: "/root/test2".to_string(),
                reference_dir,
                mount: Some(LoopMount {
                    image: "/root/test2.img".to_string(),
                    offset: DEFAULT_LOOP_OFFSET,
                }),
                weekday_scope: true,
                recreate_weekdays: true,
                list_after_mount: true,
                exit_policy: ExitPolicy::Comparison,
                weekdays: WeekdayTable::legacy(),
            },
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;
        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        Ok(config)
    }

    /// Validate every value that ends up inside a remote command line.
    ///
    /// Commands are sent to the remote shell unquoted, so paths and labels
    /// are restricted to a conservative character set.
    pub fn validate(&self) -> std::result::Result<(), SnapError> {
        validate_token("remote.user", &self.remote.user)?;
        validate_token("remote.host", &self.remote.host)?;
        if self.remote.ssh_program.trim().is_empty() {
            return Err(SnapError::validation("remote.ssh_program must not be empty"));
        }

        validate_abs_path("scratch_dir", &self.scratch_dir)?;
        validate_abs_path("reference_dir", &self.reference_dir)?;
        if self.scratch_dir.trim_end_matches('/').is_empty() {
            return Err(SnapError::validation("scratch_dir must not be the filesystem root"));
        }

        if let Some(mount) = &self.mount {
            validate_abs_path("mount.image", &mount.image)?;
        }

        if self.recreate_weekdays && self.mount.is_none() {
            return Err(SnapError::validation(
                "recreate_weekdays requires a loop mount (the whole scratch_dir is cleared)",
            ));
        }

        if self.weekday_scope || self.recreate_weekdays {
            for label in self.weekdays.labels() {
                validate_token("weekdays", label)?;
            }
        }

        Ok(())
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self::preset(VerifyVariant::default())
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Single word made of `[A-Za-z0-9_.-]`, not starting with `-`.
fn validate_token(field: &str, value: &str) -> std::result::Result<(), SnapError> {
    if value.is_empty() {
        return Err(SnapError::validation(format!("{field} must not be empty")));
    }
    if value.starts_with('-') {
        return Err(SnapError::validation(format!(
            "{field} must not start with '-': {value:?}"
        )));
    }
    if let Some(bad) = value.chars().find(|&c| !is_safe_char(c)) {
        return Err(SnapError::validation(format!(
            "{field} contains unsupported character {bad:?}: {value:?}"
        )));
    }
    Ok(())
}

/// Absolute path made of safe components, no `..`.
fn validate_abs_path(field: &str, value: &str) -> std::result::Result<(), SnapError> {
    if !value.starts_with('/') {
        return Err(SnapError::validation(format!(
            "{field} must be an absolute path: {value:?}"
        )));
    }
    for component in value.split('/').filter(|c| !c.is_empty()) {
        if component == ".." {
            return Err(SnapError::validation(format!(
                "{field} must not contain '..': {value:?}"
            )));
        }
        if let Some(bad) = component.chars().find(|&c| !is_safe_char(c)) {
            return Err(SnapError::validation(format!(
                "{field} contains unsupported character {bad:?}: {value:?}"
            )));
        }
    }
    Ok(())
}
