use super::Fingerprinter;
use crate::model::{DependencyNode, Fingerprint};
use crate::platform::canonical;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

type Slot = Arc<OnceLock<Option<Fingerprint>>>;

/// Content-addressed fingerprint memo keyed by canonical path.
///
/// Each path owns a slot that is initialized exactly once; concurrent
/// callers for the same path wait on that slot instead of hashing again.
pub struct FingerprintCache {
    fingerprinter: Fingerprinter,
    entries: DashMap<PathBuf, Slot>,
    computed: AtomicUsize,
}

impl FingerprintCache {
    pub fn new(fingerprinter: Fingerprinter) -> Self {
        Self {
            fingerprinter,
            entries: DashMap::new(),
            computed: AtomicUsize::new(0),
        }
    }

    /// Returns the fingerprint of `path`, hashing it on first request.
    /// `None` means the file could not be read.
    pub fn get_or_compute(&self, path: &Path) -> Option<Fingerprint> {
        let key = canonical(path);
        // Clone the slot out so the shard lock is released before hashing.
        let slot: Slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();

        slot.get_or_init(|| {
            self.computed.fetch_add(1, Ordering::Relaxed);
            self.fingerprinter.fingerprint_logged(&key)
        })
        .clone()
    }

    /// Number of files actually read so far.
    pub fn computations(&self) -> usize {
        self.computed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hashes every distinct `artifact_path` in `roots` on a pool of
    /// `workers` threads, then attaches the results to the nodes.
    /// Hashes a node already carries (e.g. from a lock file) are kept.
    pub fn fingerprint_forest(&self, roots: &mut [DependencyNode], workers: usize) {
        let mut paths = BTreeSet::new();
        for root in roots.iter() {
            root.visit(&mut |node| {
                if let Some(path) = &node.artifact_path {
                    paths.insert(path.clone());
                }
            });
        }
        if paths.is_empty() {
            return;
        }

        let paths: Vec<PathBuf> = paths.into_iter().collect();
        self.compute_all(&paths, workers);

        for root in roots.iter_mut() {
            root.visit_mut(&mut |node| {
                if let Some(path) = &node.artifact_path {
                    if let Some(fp) = self.get_or_compute(path) {
                        node.fingerprint.merge_missing(&fp);
                    }
                }
            });
        }
    }

    /// Fills the cache for `paths` in parallel.
    pub fn compute_all(&self, paths: &[PathBuf], workers: usize) {
        debug!(files = paths.len(), workers, "fingerprinting");
        match rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build() {
            Ok(pool) => pool.install(|| {
                paths.par_iter().for_each(|path| {
                    self.get_or_compute(path);
                });
            }),
            Err(e) => {
                warn!(error = %e, "fingerprint pool unavailable, hashing sequentially");
                for path in paths {
                    self.get_or_compute(path);
                }
            }
        }
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(Fingerprinter::default())
    }
}
