//! Random directory trees for test fixtures.
//!
//! At every level each of `branch` items is a file with probability 0.4 or a
//! directory with probability 0.6; directories recurse one level shallower.
//! Files hold between 10 and 104856 random bytes, each byte in `0..255`.
//! Names are random 8-digit decimal numbers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{Result, SnapError};

/// File sizes are drawn from this half-open range.
pub const FILE_SIZE_RANGE: std::ops::Range<usize> = 10..104_857;

/// Entry names are drawn from this half-open range.
pub const NAME_RANGE: std::ops::Range<u32> = 10_000_000..99_999_999;

/// A draw from `0..10` above 5 makes a file, anything else a directory.
fn draw_is_file(draw: u32) -> bool {
    draw > 5
}

/// Counters for what a run created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
}

impl TreeStats {
    pub fn entries(&self) -> usize {
        self.files + self.dirs
    }
}

/// Generates random trees from a caller-supplied random source.
pub struct TreeGenerator<R: Rng> {
    rng: R,
}

impl TreeGenerator<StdRng> {
    /// Reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Generator seeded from the operating system; differs run to run.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }
}

impl<R: Rng> TreeGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Populate `root` with a random tree.
    ///
    /// `root` itself must already exist; it is never created.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `root` is not a directory, or an IO
    /// error from creating entries.
    pub fn generate(&mut self, max_depth: u32, branch: u32, root: &Path) -> Result<TreeStats> {
        if !root.is_dir() {
            return Err(SnapError::validation(format!(
                "root {} is not an existing directory",
                root.display()
            )));
        }
        let mut stats = TreeStats::default();
        self.fill(max_depth, branch, root, &mut stats)?;
        Ok(stats)
    }

    fn fill(&mut self, depth: u32, branch: u32, dir: &Path, stats: &mut TreeStats) -> Result<()> {
        if depth == 0 {
            return Ok(());
        }
        for _ in 0..branch {
            let path = dir.join(self.fresh_name(dir));
            if self.pick_file() {
                let size = self.write_file(&path)?;
                stats.files += 1;
                stats.bytes += size as u64;
            } else {
                fs::create_dir(&path)?;
                stats.dirs += 1;
                self.fill(depth - 1, branch, &path, stats)?;
            }
        }
        Ok(())
    }

    fn pick_file(&mut self) -> bool {
        draw_is_file(self.rng.random_range(0..10))
    }

    /// Draw names until one is unused in `dir`.
    fn fresh_name(&mut self, dir: &Path) -> String {
        loop {
            let name = self.rng.random_range(NAME_RANGE).to_string();
            if !dir.join(&name).exists() {
                return name;
            }
        }
    }

    fn write_file(&mut self, path: &Path) -> Result<usize> {
        let size = self.rng.random_range(FILE_SIZE_RANGE);
        let contents: Vec<u8> = (0..size).map(|_| self.rng.random_range(0..255u8)).collect();
        fs::write(path, &contents)?;
        debug!(path = %path.display(), size, "wrote fixture file");
        Ok(size)
    }
}
