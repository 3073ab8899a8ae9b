//! Refuse to mount over an existing mount.
//!
//! The check is a plain substring search of the remote `df` output. It
//! over-matches: `/root/test2` is also "found" when only `/root/test20` or
//! `/root/test2-old` is mounted. Jobs already depend on this behaviour, so it
//! is kept as is.
//!
//! The check and the subsequent mount are two separate remote commands. Two
//! verifiers started at the same time can both pass the check.

use crate::error::Result;
use crate::remote::RemoteShell;
use tracing::debug;

/// Command whose output lists mounted filesystems.
pub const MOUNT_LISTING_COMMAND: &str = "df";

/// True when `mount_point` occurs anywhere in `listing`.
pub fn listing_contains(listing: &str, mount_point: &str) -> bool {
    listing.contains(mount_point)
}

/// Query the remote mount listing and test it for `mount_point`.
///
/// # Errors
///
/// Propagates the remote's error if the listing could not be obtained.
pub fn is_mounted<R: RemoteShell + ?Sized>(remote: &R, mount_point: &str) -> Result<bool> {
    let listing = remote.capture(MOUNT_LISTING_COMMAND)?;
    let mounted = listing_contains(&listing, mount_point);
    debug!(mount_point, mounted, "mount guard checked");
    Ok(mounted)
}
