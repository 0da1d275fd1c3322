use super::{working_dir, Resolver};
use crate::error::{Result, ScanError};
use crate::model::{Ecosystem, ProjectRoot, ResolutionResult};
use crate::parser::manifest::{manifest_forest, read_pom};
use crate::parser::maven_tree::MavenTreeParser;
use crate::platform::executable;
use crate::tool::{argv, ToolRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

const BOM: &str = "pom.xml";

pub struct MavenResolver {
    run_tool: bool,
    repository: PathBuf,
}

impl MavenResolver {
    pub fn new(run_tool: bool, repository: impl Into<PathBuf>) -> Self {
        Self {
            run_tool,
            repository: repository.into(),
        }
    }

    /// Parses every pom of the root directly.
    fn from_manifests(&self, root: &ProjectRoot) -> ResolutionResult {
        let mut dropped = 0;
        let manifests: Vec<_> = root
            .manifests_named(BOM)
            .filter_map(|path| match read_pom(path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable pom");
                    dropped += 1;
                    None
                }
            })
            .collect();

        let roots = manifest_forest(&manifests, Some(&self.repository));
        ResolutionResult::new(Ecosystem::Maven, &root.folder, roots)
            .with_dropped(dropped)
            .degraded()
    }
}

#[async_trait]
impl Resolver for MavenResolver {
    fn name(&self) -> &'static str {
        "Maven"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn bom_patterns(&self) -> &'static [&'static str] {
        &["**/pom.xml"]
    }

    async fn resolve(&self, root: &ProjectRoot, runner: &ToolRunner) -> Result<ResolutionResult> {
        let primary = root
            .primary_manifest(BOM)
            .ok_or_else(|| ScanError::parse(root.folder.display().to_string(), "no pom.xml in project root"))?;

        if self.run_tool {
            let dir = working_dir(root, primary);
            let output = runner
                .run(dir, &argv([executable("mvn").as_str(), "-B", "dependency:tree"]))
                .await;
            if output.succeeded {
                let tree = MavenTreeParser::new(&self.repository).parse(&output.lines, primary);
                if !tree.modules.is_empty() {
                    return Ok(ResolutionResult::new(Ecosystem::Maven, &root.folder, tree.modules)
                        .with_dropped(tree.dropped_blocks));
                }
            }
            info!(dir = %dir.display(), "mvn dependency:tree unavailable, parsing pom files");
        }

        Ok(self.from_manifests(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fallback_parses_module_poms() {
        let dir = TempDir::new().unwrap();
        let root_pom = dir.path().join("pom.xml");
        fs::write(
            &root_pom,
            "<project><groupId>g</groupId><artifactId>app</artifactId><version>1</version>\
             <dependencies><dependency><groupId>g</groupId><artifactId>lib</artifactId><version>1</version></dependency></dependencies>\
             </project>",
        )
        .unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        let lib_pom = dir.path().join("lib/pom.xml");
        fs::write(&lib_pom, "<project><groupId>g</groupId><artifactId>lib</artifactId><version>1</version></project>").unwrap();
        let broken = dir.path().join("broken");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join("pom.xml"), "<settings/>").unwrap();

        let root = ProjectRoot::new(dir.path(), [root_pom, lib_pom, broken.join("pom.xml")]);
        let resolver = MavenResolver::new(false, dir.path().join("repo"));
        let result = resolver.resolve(&root, &ToolRunner::default()).await.unwrap();

        assert!(result.degraded);
        assert_eq!(result.dropped_records, 1);
        assert_eq!(result.roots.len(), 1);
        assert_eq!(result.roots[0].filename, "app-1.jar");
        assert_eq!(result.roots[0].children[0].name, "lib");
        assert!(result.excludes.is_empty());
    }

    #[tokio::test]
    async fn test_root_without_pom_is_an_error() {
        let root = ProjectRoot::new("/nowhere", Vec::new());
        let resolver = MavenResolver::new(false, "/nowhere/repo");
        assert!(resolver.resolve(&root, &ToolRunner::default()).await.is_err());
    }
}
