use super::{subtree_glob, working_dir, Resolver};
use crate::error::{Result, ScanError};
use crate::model::{Ecosystem, ProjectRoot, ResolutionResult};
use crate::parser::manifest::{manifest_forest, read_package_json, Manifest};
use crate::parser::npm_list::parse_npm_list;
use crate::parser::yarn_lock::{lock_key, parse_yarn_lock};
use crate::platform::executable;
use crate::tool::{argv, ToolRunner};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const BOM: &str = "package.json";
const YARN_LOCK: &str = "yarn.lock";

pub struct NpmResolver {
    run_tool: bool,
}

impl NpmResolver {
    pub fn new(run_tool: bool) -> Self {
        Self { run_tool }
    }

    fn from_yarn_lock(&self, root: &ProjectRoot, manifest: &Manifest, lock_path: &Path) -> Option<ResolutionResult> {
        let content = match fs::read_to_string(lock_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %lock_path.display(), error = %e, "cannot read yarn.lock");
                return None;
            }
        };
        let lock = parse_yarn_lock(&content, lock_path);
        let dropped = lock.dropped;
        let declared: Vec<String> = manifest
            .dependencies
            .iter()
            .map(|d| lock_key(&d.name, &d.range))
            .collect();
        let tree = lock.tree_for(manifest.node(), &declared);
        Some(ResolutionResult::new(Ecosystem::Npm, &root.folder, vec![tree]).with_dropped(dropped))
    }

    fn from_manifests(&self, root: &ProjectRoot) -> ResolutionResult {
        let mut dropped = 0;
        let manifests: Vec<Manifest> = root
            .manifests_named(BOM)
            .filter_map(|path| match read_package_json(path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable package.json");
                    dropped += 1;
                    None
                }
            })
            .collect();

        ResolutionResult::new(Ecosystem::Npm, &root.folder, manifest_forest(&manifests, None))
            .with_dropped(dropped)
            .degraded()
    }
}

#[async_trait]
impl Resolver for NpmResolver {
    fn name(&self) -> &'static str {
        "NPM"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/package.json"]
    }

    async fn resolve(&self, root: &ProjectRoot, runner: &ToolRunner) -> Result<ResolutionResult> {
        let primary = root
            .primary_manifest(BOM)
            .ok_or_else(|| ScanError::parse(root.folder.display().to_string(), "no package.json in project root"))?;
        let dir = working_dir(root, primary);
        let excludes = vec![subtree_glob(&dir.join("node_modules"))];
        let manifest = read_package_json(primary)?;

        let lock_path = dir.join(YARN_LOCK);
        if lock_path.is_file() {
            if let Some(result) = self.from_yarn_lock(root, &manifest, &lock_path) {
                return Ok(result.with_excludes(excludes));
            }
        }

        if self.run_tool {
            let output = runner
                .run(dir, &argv([executable("npm").as_str(), "ls", "--json", "--all"]))
                .await;
            if output.succeeded {
                match parse_npm_list(&output.text(), primary, &manifest.name, &manifest.version) {
                    Ok(list) => {
                        return Ok(ResolutionResult::new(Ecosystem::Npm, &root.folder, vec![list.root])
                            .with_dropped(list.skipped)
                            .with_excludes(excludes));
                    }
                    Err(e) => debug!(dir = %dir.display(), error = %e, "unusable npm ls output"),
                }
            }
            info!(dir = %dir.display(), "npm ls unavailable, parsing package.json files");
        }

        Ok(self.from_manifests(root).with_excludes(excludes))
    }
}
