//! Scan pipeline.
//!
//! ```text
//! scan roots ─► archive expansion ─► partition per ecosystem
//!            ─► per root: every resolver with a matching manifest
//!            ─► merge, ignore list ─► fingerprint ─► content scan
//! ```
//!
//! Manifests are partitioned separately for each resolver, so one
//! ecosystem's manifests never decide the project roots of another. Roots
//! of different ecosystems that share a folder are resolved together.
//!
//! A resolver that fails or resolves nothing contributes an empty, degraded
//! result with no excludes. It never stops sibling ecosystems or roots.

use crate::archive::{ArchiveExpander, NoArchives};
use crate::config::{build_glob_set, Config};
use crate::content::ContentScanner;
use crate::error::ConfigError;
use crate::fingerprint::{FingerprintCache, Fingerprinter};
use crate::model::{DependencyNode, ProjectRoot, ResolutionResult, ScanForest};
use crate::partition::{partition_paths, PathPartitioner};
use crate::platform::canonical;
use crate::resolver::{all_resolvers, is_enabled, Resolver};
use crate::tool::ToolRunner;
use futures::stream::{self, StreamExt};
use globset::GlobSet;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: Config,
    resolvers: Vec<(Box<dyn Resolver>, GlobSet)>,
    partitioner: PathPartitioner,
    include: GlobSet,
    exclude: GlobSet,
    ignore: GlobSet,
    runner: ToolRunner,
    archives: Box<dyn ArchiveExpander>,
}

impl Orchestrator {
    /// Builds the pipeline for `config`.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`Config::validate`] finds. Nothing is
    /// scanned with an invalid config.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut resolvers = Vec::new();
        let mut bom_patterns: Vec<String> = Vec::new();
        for resolver in all_resolvers(&config) {
            if !is_enabled(&config, resolver.ecosystem()) {
                debug!(resolver = resolver.name(), "resolver disabled");
                continue;
            }
            let patterns: Vec<String> = resolver.bom_patterns().iter().map(|p| p.to_string()).collect();
            let bom = build_glob_set(&patterns, config.case_sensitive)?;
            bom_patterns.extend(patterns);
            resolvers.push((resolver, bom));
        }

        let exclude = config.exclude_set()?;
        let partitioner = PathPartitioner::new(build_glob_set(&bom_patterns, config.case_sensitive)?, exclude.clone());

        Ok(Self {
            include: config.include_set()?,
            ignore: config.ignore.matcher()?,
            runner: ToolRunner::from_config(&config),
            archives: Box::new(NoArchives),
            exclude,
            partitioner,
            resolvers,
            config,
        })
    }

    pub fn with_archive_expander(mut self, expander: Box<dyn ArchiveExpander>) -> Self {
        self.archives = expander;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolvers(&self) -> impl Iterator<Item = &dyn Resolver> {
        self.resolvers.iter().map(|(r, _)| r.as_ref())
    }

    /// Partitions the manifests under `scan_root` into project roots, one
    /// partition per resolver. Roots from different resolvers that land on
    /// the same folder become one polyglot root.
    pub fn project_roots(&self, scan_root: &Path) -> Vec<ProjectRoot> {
        let manifests: Vec<PathBuf> = self
            .partitioner
            .discover(scan_root)
            .into_iter()
            .filter(|m| self.include.is_match(m))
            .collect();

        let mut roots: BTreeMap<PathBuf, BTreeSet<PathBuf>> = BTreeMap::new();
        for (resolver, bom) in &self.resolvers {
            let own = manifests.iter().filter(|m| bom.is_match(m)).cloned();
            for (folder, members) in partition_paths(own) {
                debug!(
                    resolver = resolver.name(),
                    folder = %folder.display(),
                    manifests = members.len(),
                    "project root"
                );
                roots.entry(folder).or_default().extend(members);
            }
        }

        roots
            .into_iter()
            .map(|(folder, manifests)| ProjectRoot::new(folder, manifests))
            .collect()
    }

    /// Runs every applicable resolver on `root`, one after another, in
    /// registry order.
    pub async fn resolve(&self, root: &ProjectRoot) -> Vec<ResolutionResult> {
        let mut results = Vec::new();

        for (resolver, bom) in &self.resolvers {
            let manifests: Vec<PathBuf> = root.manifests.iter().filter(|m| bom.is_match(m)).cloned().collect();
            if manifests.is_empty() {
                continue;
            }
            let scoped = ProjectRoot::new(&root.folder, manifests);
            let ecosystem = resolver.ecosystem();

            let result = match resolver.resolve(&scoped, &self.runner).await {
                Ok(result) if !result.is_empty() => result,
                Ok(result) => {
                    debug!(ecosystem = %ecosystem, root = %root.folder.display(), "resolver found nothing");
                    ResolutionResult::empty(ecosystem, &root.folder)
                        .with_dropped(result.dropped_records)
                        .degraded()
                }
                Err(e) => {
                    warn!(ecosystem = %ecosystem, root = %root.folder.display(), error = %e, "resolver failed");
                    ResolutionResult::empty(ecosystem, &root.folder).degraded()
                }
            };

            info!(
                ecosystem = %ecosystem,
                root = %root.folder.display(),
                nodes = result.node_count(),
                dropped = result.dropped_records,
                degraded = result.degraded,
                "resolved project root"
            );
            results.push(result);
        }

        results
    }

    /// Scans `scan_roots` (plus whatever the archive expander adds) into
    /// one forest.
    pub async fn scan(&self, scan_roots: &[PathBuf]) -> ScanForest {
        let mut roots: Vec<PathBuf> = scan_roots.iter().map(|r| canonical(r)).collect();
        for root in scan_roots {
            let expanded = self.archives.expand(root, self.config.archive_depth);
            roots.extend(expanded.iter().map(|p| canonical(p)));
        }
        let mut forest = ScanForest::new(roots.clone());

        let projects: Vec<ProjectRoot> = roots.iter().flat_map(|r| self.project_roots(r)).collect();
        info!(scan_roots = roots.len(), projects = projects.len(), "partitioned scan roots");

        let results: Vec<Vec<ResolutionResult>> = stream::iter(projects.iter())
            .map(|project| self.resolve(project))
            .buffered(self.config.max_concurrent_roots.max(1))
            .collect()
            .await;

        for mut result in results.into_iter().flatten() {
            self.apply_ignore(&mut result);
            forest.merge(result);
        }

        let claimed = build_glob_set(&forest.excludes, self.config.case_sensitive).unwrap_or_else(|e| {
            warn!(error = %e, "resolver excludes unusable, content scan covers everything");
            GlobSet::empty()
        });
        let scanner = ContentScanner::new(self.include.clone(), self.exclude.clone(), claimed);
        // Fresh per scan so files changed since an earlier scan are rehashed.
        let cache = FingerprintCache::new(Fingerprinter::new(self.config.partial_hash_window));
        let workers = self.config.fingerprint_workers;
        let mut dependencies = std::mem::take(&mut forest.dependencies);

        let hashed = tokio::task::spawn_blocking(move || {
            cache.fingerprint_forest(&mut dependencies, workers);
            let files: Vec<DependencyNode> = roots.iter().flat_map(|r| scanner.scan(r, &cache, workers)).collect();
            (dependencies, files)
        })
        .await;

        match hashed {
            Ok((dependencies, files)) => {
                forest.dependencies = dependencies;
                forest.files = files;
            }
            Err(e) => warn!(error = %e, "fingerprinting aborted"),
        }

        info!(
            dependencies = forest.dependency_count(),
            files = forest.files.len(),
            dropped = forest.dropped_records(),
            "scan complete"
        );
        forest
    }

    /// Drops nodes whose name matches the ignore list, with their subtrees.
    fn apply_ignore(&self, result: &mut ResolutionResult) {
        if self.ignore.is_empty() {
            return;
        }
        let keep = |node: &DependencyNode| !self.ignore.is_match(&node.name);
        result.roots.retain(|root| keep(root));
        for root in &mut result.roots {
            root.retain_children(&keep);
        }
    }
}
