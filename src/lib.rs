//! Reconstructs dependency forests from package ecosystems.
//!
//! A scan partitions the input folders into project roots, resolves each root
//! with every enabled ecosystem [`resolver`], merges the results, fingerprints
//! every node and finally hashes the files no resolver claimed.
//!
//! ```no_run
//! use depforest::{config::Config, Orchestrator};
//! use std::path::PathBuf;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(Config::default())?;
//! let forest = orchestrator.scan(&[PathBuf::from(".")]).await;
//! println!("{} dependencies", forest.dependency_count());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod partition;
pub mod platform;
pub mod resolver;
pub mod tool;

pub use config::Config;
pub use error::{ConfigError, ScanError};
pub use model::{DependencyNode, Ecosystem, Fingerprint, ProjectRoot, ResolutionResult, ScanForest};
pub use orchestrator::Orchestrator;
pub use resolver::Resolver;
