//! Generic content scanner: one flat node per file no resolver claimed,
//! identified by its primary hash alone.

use crate::fingerprint::FingerprintCache;
use crate::model::{DependencyNode, Ecosystem, Fingerprint};
use crate::platform::canonical;
use globset::GlobSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub struct ContentScanner {
    include: GlobSet,
    exclude: GlobSet,
    claimed: GlobSet,
}

impl ContentScanner {
    /// `claimed` holds the exclude globs resolvers returned.
    pub fn new(include: GlobSet, exclude: GlobSet, claimed: GlobSet) -> Self {
        Self {
            include,
            exclude,
            claimed,
        }
    }

    fn skipped(&self, path: &Path) -> bool {
        self.exclude.is_match(path) || self.claimed.is_match(path)
    }

    /// Files under `scan_root` the scan should hash, sorted.
    pub fn files(&self, scan_root: &Path) -> Vec<PathBuf> {
        let root = canonical(scan_root);
        WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.skipped(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.include.is_match(e.path()))
            .map(|e| e.into_path())
            .collect()
    }

    /// Flat nodes for every file under `scan_root`. Unreadable files are
    /// reported without a hash.
    pub fn scan(&self, scan_root: &Path, cache: &FingerprintCache, workers: usize) -> Vec<DependencyNode> {
        let files = self.files(scan_root);
        debug!(root = %scan_root.display(), files = files.len(), "content scan");
        cache.compute_all(&files, workers);

        files
            .into_iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut node = DependencyNode::new(Ecosystem::File, &name, "")
                    .with_filename(&name)
                    .with_source(&path)
                    .with_artifact(&path);
                if let Some(sha1) = cache.get_or_compute(&path).and_then(|f| f.sha1) {
                    node.fingerprint = Fingerprint::primary(sha1);
                }
                node
            })
            .collect()
    }
}
