//! Package databases inside container images or root filesystems.
//!
//! Every matching database file in the project root is read and its
//! packages become flat roots. The database directory is excluded from the
//! content scan.

use super::{subtree_glob, Resolver};
use crate::error::Result;
use crate::model::{DependencyNode, Ecosystem, ProjectRoot, ResolutionResult};
use crate::parser::os::apk::parse_apk_installed;
use crate::parser::os::dpkg::parse_dpkg_status;
use crate::parser::os::pacman::read_local_db;
use crate::parser::os::rpm::{parse_rpm_query, QUERY_FORMAT};
use crate::parser::os::OsPackages;
use crate::platform::executable;
use crate::tool::{argv, ToolRunner};
use async_trait::async_trait;
use globset::{Glob, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Manifests of `root` matching `patterns`.
fn databases(root: &ProjectRoot, patterns: &[&str]) -> Vec<PathBuf> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    let Ok(set) = builder.build() else {
        return Vec::new();
    };
    root.manifests.iter().filter(|m| set.is_match(m)).cloned().collect()
}

/// Directories holding at least one matched database, each listed once.
/// `Packages` and `rpmdb.sqlite` side by side are one database.
fn database_dirs(root: &ProjectRoot, patterns: &[&str]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for db in databases(root, patterns) {
        if let Some(dir) = db.parent() {
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    dirs
}

/// Merges the packages of several databases into one result.
fn collect(
    ecosystem: Ecosystem,
    root: &ProjectRoot,
    parsed: impl IntoIterator<Item = (PathBuf, OsPackages)>,
) -> ResolutionResult {
    let mut packages: Vec<DependencyNode> = Vec::new();
    let mut excludes = Vec::new();
    let mut dropped = 0;

    for (db_dir, db) in parsed {
        if db.dropped > 0 {
            debug!(ecosystem = %ecosystem, path = %db_dir.display(), dropped = db.dropped, "dropped incomplete package records");
        }
        dropped += db.dropped;
        packages.extend(db.packages);
        let glob = subtree_glob(&db_dir);
        if !excludes.contains(&glob) {
            excludes.push(glob);
        }
    }

    ResolutionResult::new(ecosystem, &root.folder, packages)
        .with_excludes(excludes)
        .with_dropped(dropped)
}

fn read(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read package database");
            None
        }
    }
}

pub struct DebianResolver;

#[async_trait]
impl Resolver for DebianResolver {
    fn name(&self) -> &'static str {
        "Debian"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Debian
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/var/lib/dpkg/status", "**/var/lib/dpkg/status.d/*"]
    }

    async fn resolve(&self, root: &ProjectRoot, _runner: &ToolRunner) -> Result<ResolutionResult> {
        let parsed = databases(root, self.bom_patterns()).into_iter().filter_map(|path| {
            let content = read(&path)?;
            // status lives in dpkg/, status.d/* one level deeper
            let dpkg_dir = path
                .ancestors()
                .find(|a| a.file_name().is_some_and(|n| n == "dpkg"))
                .unwrap_or(path.as_path())
                .to_path_buf();
            Some((dpkg_dir, parse_dpkg_status(&content, &path)))
        });
        Ok(collect(Ecosystem::Debian, root, parsed.collect::<Vec<_>>()))
    }
}

pub struct AlpineResolver;

#[async_trait]
impl Resolver for AlpineResolver {
    fn name(&self) -> &'static str {
        "Alpine"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Alpine
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/lib/apk/db/installed"]
    }

    async fn resolve(&self, root: &ProjectRoot, _runner: &ToolRunner) -> Result<ResolutionResult> {
        let parsed: Vec<_> = databases(root, self.bom_patterns())
            .into_iter()
            .filter_map(|path| {
                let content = read(&path)?;
                let db_dir = path.parent()?.to_path_buf();
                Some((db_dir, parse_apk_installed(&content, &path)))
            })
            .collect();
        Ok(collect(Ecosystem::Alpine, root, parsed))
    }
}

pub struct ArchResolver;

#[async_trait]
impl Resolver for ArchResolver {
    fn name(&self) -> &'static str {
        "Arch"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Arch
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/var/lib/pacman/local/ALPM_DB_VERSION"]
    }

    async fn resolve(&self, root: &ProjectRoot, _runner: &ToolRunner) -> Result<ResolutionResult> {
        let parsed: Vec<_> = databases(root, self.bom_patterns())
            .into_iter()
            .filter_map(|marker| {
                let local = marker.parent()?.to_path_buf();
                let db = read_local_db(&local);
                Some((local, db))
            })
            .collect();
        Ok(collect(Ecosystem::Arch, root, parsed))
    }
}

/// RPM databases are binary; they are read through `rpm --dbpath`.
pub struct RpmResolver {
    run_tool: bool,
}

impl RpmResolver {
    pub fn new(run_tool: bool) -> Self {
        Self { run_tool }
    }
}

#[async_trait]
impl Resolver for RpmResolver {
    fn name(&self) -> &'static str {
        "RPM"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rpm
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &[
            "**/var/lib/rpm/Packages",
            "**/var/lib/rpm/rpmdb.sqlite",
            "**/usr/lib/sysimage/rpm/rpmdb.sqlite",
        ]
    }

    async fn resolve(&self, root: &ProjectRoot, runner: &ToolRunner) -> Result<ResolutionResult> {
        if !self.run_tool {
            info!(root = %root.folder.display(), "rpm disabled, skipping rpm databases");
            return Ok(ResolutionResult::empty(Ecosystem::Rpm, &root.folder).degraded());
        }

        let mut parsed = Vec::new();
        for db_dir in database_dirs(root, self.bom_patterns()) {
            let dbpath = db_dir.to_string_lossy().into_owned();
            let output = runner
                .run(
                    &db_dir,
                    &argv([executable("rpm").as_str(), "--dbpath", dbpath.as_str(), "-qa", "--qf", QUERY_FORMAT]),
                )
                .await;
            if !output.succeeded {
                info!(path = %db_dir.display(), "rpm query failed, database skipped");
                continue;
            }
            let packages = parse_rpm_query(&output.lines, &db_dir);
            parsed.push((db_dir, packages));
        }

        Ok(collect(Ecosystem::Rpm, root, parsed))
    }
}
