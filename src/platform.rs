//! Platform-specific names and locations.
//!
//! Package-manager launchers are batch scripts on Windows, so `npm` must be
//! invoked as `npm.cmd` there; everywhere else the bare name is used.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }
}

/// Tools that ship as `.cmd` wrappers on Windows.
const CMD_WRAPPED: &[&str] = &["npm", "yarn", "mvn", "composer"];

/// Returns the executable name to launch for `tool` on the current platform.
pub fn executable(tool: &str) -> String {
    executable_for(tool, Platform::current())
}

fn executable_for(tool: &str, platform: Platform) -> String {
    match platform {
        Platform::Windows if CMD_WRAPPED.contains(&tool) => format!("{}.cmd", tool),
        Platform::Windows if Path::new(tool).extension().is_none() => format!("{}.exe", tool),
        _ => tool.to_string(),
    }
}

/// Default Maven local repository: `~/.m2/repository`.
pub fn maven_local_repository() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".m2")
        .join("repository")
}

/// Best-effort canonical form of `path`. Paths that cannot be canonicalized
/// (vanished, permission denied) are returned unchanged.
pub fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_names() {
        assert_eq!(executable_for("npm", Platform::Linux), "npm");
        assert_eq!(executable_for("npm", Platform::Windows), "npm.cmd");
        assert_eq!(executable_for("rpm", Platform::Windows), "rpm.exe");
        assert_eq!(executable_for("mvn", Platform::MacOS), "mvn");
    }

    #[test]
    fn test_maven_repository_layout() {
        let repo = maven_local_repository();
        assert!(repo.ends_with(Path::new(".m2").join("repository")));
    }
}
