//! Archive expansion seam.
//!
//! An expander unpacks archives found under a scan root and returns the
//! folders it unpacked them into; each becomes an additional scan root.
//! Expansion mechanics live outside this crate.

use std::path::{Path, PathBuf};

pub trait ArchiveExpander: Send + Sync {
    /// Expands archives under `scan_root`, nesting at most `depth` levels.
    fn expand(&self, scan_root: &Path, depth: u8) -> Vec<PathBuf>;
}

/// Expands nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArchives;

impl ArchiveExpander for NoArchives {
    fn expand(&self, _scan_root: &Path, _depth: u8) -> Vec<PathBuf> {
        Vec::new()
    }
}
