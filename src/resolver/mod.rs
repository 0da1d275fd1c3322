//! Ecosystem resolvers.
//!
//! A [`Resolver`] turns the manifests of one project root into a
//! [`ResolutionResult`]. Each resolver tries its package manager first and
//! falls back to parsing files when the tool is disabled, missing, or fails.
//!
//! # Available Resolvers
//!
//! | Resolver | Ecosystem | Bom pattern |
//! |----------|-----------|-------------|
//! | [`MavenResolver`] | Maven | `pom.xml` |
//! | [`NpmResolver`] | NPM / Yarn | `package.json` |
//! | [`ComposerResolver`] | Composer | `composer.json` |
//! | [`DebianResolver`] | Debian | `var/lib/dpkg/status` |
//! | [`AlpineResolver`] | Alpine | `lib/apk/db/installed` |
//! | [`ArchResolver`] | Arch | `var/lib/pacman/local/ALPM_DB_VERSION` |
//! | [`RpmResolver`] | RPM | `var/lib/rpm/Packages`, `rpmdb.sqlite` |
//!
//! # Example
//!
//! ```
//! use depforest::config::Config;
//! use depforest::resolver::all_resolvers;
//!
//! let config = Config::default();
//! let names: Vec<&str> = all_resolvers(&config).iter().map(|r| r.name()).collect();
//! assert_eq!(names.len(), 7);
//! ```

mod composer;
mod maven;
mod npm;
mod os;

pub use composer::ComposerResolver;
pub use maven::MavenResolver;
pub use npm::NpmResolver;
pub use os::{AlpineResolver, ArchResolver, DebianResolver, RpmResolver};

use crate::config::{Config, EcosystemConfig};
use crate::error::Result;
use crate::model::{Ecosystem, ProjectRoot, ResolutionResult};
use crate::tool::ToolRunner;
use async_trait::async_trait;
use std::path::Path;

/// Capability shared by every ecosystem strategy.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &'static str;

    fn ecosystem(&self) -> Ecosystem;

    /// Globs selecting the files this resolver consumes.
    fn bom_patterns(&self) -> &'static [&'static str];

    /// Resolves the manifests of `root` that match [`bom_patterns`](Self::bom_patterns).
    ///
    /// # Errors
    ///
    /// Returns an error when no result can be produced at all; the caller
    /// treats that as an empty result for this ecosystem.
    async fn resolve(&self, root: &ProjectRoot, runner: &ToolRunner) -> Result<ResolutionResult>;
}

/// Every resolver, configured from `config`, in a fixed order. Disabled
/// ecosystems are included; see [`is_enabled`].
pub fn all_resolvers(config: &Config) -> Vec<Box<dyn Resolver>> {
    vec![
        Box::new(MavenResolver::new(config.maven.ecosystem.run_tool, config.maven.repository())),
        Box::new(NpmResolver::new(config.npm.run_tool)),
        Box::new(ComposerResolver::new(config.composer.may_generate_lock())),
        Box::new(DebianResolver),
        Box::new(AlpineResolver),
        Box::new(ArchResolver),
        Box::new(RpmResolver::new(config.os.run_tool)),
    ]
}

/// The resolver for `ecosystem`, or `None` for [`Ecosystem::File`].
pub fn get_resolver(ecosystem: Ecosystem, config: &Config) -> Option<Box<dyn Resolver>> {
    all_resolvers(config).into_iter().find(|r| r.ecosystem() == ecosystem)
}

/// The config table that switches `ecosystem` on and off.
pub fn ecosystem_config(config: &Config, ecosystem: Ecosystem) -> Option<&EcosystemConfig> {
    match ecosystem {
        Ecosystem::Maven => Some(&config.maven.ecosystem),
        Ecosystem::Npm => Some(&config.npm),
        Ecosystem::Composer => Some(&config.composer.ecosystem),
        Ecosystem::Debian | Ecosystem::Alpine | Ecosystem::Arch | Ecosystem::Rpm => Some(&config.os),
        Ecosystem::File => None,
    }
}

pub fn is_enabled(config: &Config, ecosystem: Ecosystem) -> bool {
    ecosystem_config(config, ecosystem).is_some_and(|c| c.enabled)
}

/// Glob matching everything below `dir`, with glob metacharacters in the
/// path itself matched literally.
pub fn subtree_glob(dir: &Path) -> String {
    let mut out = String::new();
    for c in dir.to_string_lossy().chars() {
        match c {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    let trimmed = out.trim_end_matches('/');
    format!("{}/**", trimmed)
}

/// Folder a tool runs in: the directory of the root's primary manifest.
fn working_dir<'a>(root: &'a ProjectRoot, manifest: &'a Path) -> &'a Path {
    manifest.parent().unwrap_or(&root.folder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use globset::Glob;

    #[test]
    fn test_registry_covers_every_package_ecosystem() {
        let config = Config::default();
        let ecosystems: Vec<Ecosystem> = all_resolvers(&config).iter().map(|r| r.ecosystem()).collect();
        assert_eq!(
            ecosystems,
            vec![
                Ecosystem::Maven,
                Ecosystem::Npm,
                Ecosystem::Composer,
                Ecosystem::Debian,
                Ecosystem::Alpine,
                Ecosystem::Arch,
                Ecosystem::Rpm,
            ]
        );
        assert!(get_resolver(Ecosystem::File, &config).is_none());
        assert_eq!(get_resolver(Ecosystem::Npm, &config).map(|r| r.name()), Some("NPM"));
    }

    #[test]
    fn test_disabled_ecosystem() {
        let mut config = Config::default();
        config.os.enabled = false;
        assert!(!is_enabled(&config, Ecosystem::Debian));
        assert!(is_enabled(&config, Ecosystem::Maven));
        assert!(!is_enabled(&config, Ecosystem::File));
    }

    #[test]
    fn test_subtree_glob_escapes_metacharacters() {
        let glob = subtree_glob(Path::new("/work/app[1]/node_modules/"));
        assert_eq!(glob, "/work/app[[]1[]]/node_modules/**");

        let matcher = Glob::new(&glob).unwrap().compile_matcher();
        assert!(matcher.is_match("/work/app[1]/node_modules/a/index.js"));
        assert!(!matcher.is_match("/work/app1/node_modules/a/index.js"));
    }
}
