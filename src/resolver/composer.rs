use super::{subtree_glob, working_dir, Resolver};
use crate::error::{Result, ScanError};
use crate::model::{Ecosystem, ProjectRoot, ResolutionResult};
use crate::parser::composer_lock::parse_composer_lock;
use crate::parser::manifest::{manifest_forest, read_composer_json, Manifest};
use crate::platform::executable;
use crate::tool::{argv, ToolRunner};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const BOM: &str = "composer.json";
const LOCK: &str = "composer.lock";

pub struct ComposerResolver {
    generate_lock: bool,
}

impl ComposerResolver {
    /// With `generate_lock`, a project without `composer.lock` gets one from
    /// `composer update --no-install` before it is read.
    pub fn new(generate_lock: bool) -> Self {
        Self { generate_lock }
    }

    fn from_lock(&self, root: &ProjectRoot, manifest: &Manifest, lock_path: &Path) -> Option<ResolutionResult> {
        let parsed = fs::read_to_string(lock_path)
            .map_err(|e| ScanError::io(lock_path, e))
            .and_then(|content| parse_composer_lock(&content, lock_path));
        match parsed {
            Ok(lock) => {
                let dropped = lock.dropped;
                let declared: Vec<String> = manifest.dependencies.iter().map(|d| d.name.clone()).collect();
                let tree = lock.tree_for(manifest.node(), &declared);
                Some(ResolutionResult::new(Ecosystem::Composer, &root.folder, vec![tree]).with_dropped(dropped))
            }
            Err(e) => {
                warn!(path = %lock_path.display(), error = %e, "unusable composer.lock");
                None
            }
        }
    }

    fn from_manifests(&self, root: &ProjectRoot) -> ResolutionResult {
        let mut dropped = 0;
        let manifests: Vec<Manifest> = root
            .manifests_named(BOM)
            .filter_map(|path| match read_composer_json(path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable composer.json");
                    dropped += 1;
                    None
                }
            })
            .collect();

        ResolutionResult::new(Ecosystem::Composer, &root.folder, manifest_forest(&manifests, None))
            .with_dropped(dropped)
            .degraded()
    }
}

#[async_trait]
impl Resolver for ComposerResolver {
    fn name(&self) -> &'static str {
        "Composer"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Composer
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/composer.json"]
    }

    async fn resolve(&self, root: &ProjectRoot, runner: &ToolRunner) -> Result<ResolutionResult> {
        let primary = root
            .primary_manifest(BOM)
            .ok_or_else(|| ScanError::parse(root.folder.display().to_string(), "no composer.json in project root"))?;
        let dir = working_dir(root, primary);
        let excludes = vec![subtree_glob(&dir.join("vendor"))];
        let manifest = read_composer_json(primary)?;
        let lock_path = dir.join(LOCK);

        if !lock_path.is_file() && self.generate_lock {
            // Writes composer.lock without installing anything.
            let output = runner
                .run(
                    dir,
                    &argv([
                        executable("composer").as_str(),
                        "update",
                        "--no-install",
                        "--no-interaction",
                        "--no-scripts",
                        "--no-plugins",
                    ]),
                )
                .await;
            if !output.succeeded {
                info!(dir = %dir.display(), "composer unavailable, parsing composer.json files");
            }
        }

        if lock_path.is_file() {
            if let Some(result) = self.from_lock(root, &manifest, &lock_path) {
                return Ok(result.with_excludes(excludes));
            }
        }

        Ok(self.from_manifests(root).with_excludes(excludes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lock_file_builds_tree() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("composer.json");
        fs::write(&manifest, r#"{"name":"acme/app","require":{"php":"^8.1","monolog/monolog":"^2.9"}}"#).unwrap();
        fs::write(
            dir.path().join("composer.lock"),
            r#"{"packages":[
                {"name":"monolog/monolog","version":"2.9.1","require":{"psr/log":"^3"}},
                {"name":"psr/log","version":"3.0.0","require":[]}
            ]}"#,
        )
        .unwrap();

        let root = ProjectRoot::new(dir.path(), [manifest]);
        let result = ComposerResolver::new(false).resolve(&root, &ToolRunner::default()).await.unwrap();

        let app = &result.roots[0];
        assert_eq!(app.filename, "acme_app-0.0.0.zip");
        assert_eq!(app.children[0].filename, "monolog_monolog-2.9.1.zip");
        assert_eq!(app.children[0].children[0].filename, "psr_log-3.0.0.zip");
        assert_eq!(result.excludes, vec![subtree_glob(&dir.path().join("vendor"))]);
    }

    #[tokio::test]
    async fn test_without_lock_falls_back_to_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("composer.json");
        fs::write(&manifest, r#"{"name":"acme/app","version":"1.0.0","require":{"monolog/monolog":"^2.9"}}"#).unwrap();

        let root = ProjectRoot::new(dir.path(), [manifest]);
        let result = ComposerResolver::new(false).resolve(&root, &ToolRunner::default()).await.unwrap();

        assert!(result.degraded);
        assert_eq!(result.roots.len(), 1);
        assert!(result.roots[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_default_config_leaves_source_tree_untouched() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("composer.json");
        fs::write(&manifest, r#"{"name":"acme/app","require":{"monolog/monolog":"^2.9"}}"#).unwrap();

        let config = crate::config::Config::default();
        let resolver = crate::resolver::get_resolver(Ecosystem::Composer, &config).unwrap();
        let root = ProjectRoot::new(dir.path(), [manifest]);
        let result = resolver.resolve(&root, &ToolRunner::from_config(&config)).await.unwrap();

        assert!(result.degraded);
        assert!(!dir.path().join(LOCK).exists());
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
