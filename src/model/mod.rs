//! Core data types for dependency nodes and resolution results.
//!
//! - [`DependencyNode`] - One identified component and its ordered children
//! - [`Fingerprint`] - Content hashes attached to a node
//! - [`Ecosystem`] - The package ecosystem a node belongs to
//! - [`ProjectRoot`] - A folder plus the manifests that belong to it
//! - [`ResolutionResult`] - The forest one ecosystem produced for one project root
//! - [`ScanForest`] - The merged output of a whole scan
//!
//! # Example
//!
//! ```
//! use depforest::{DependencyNode, Ecosystem};
//!
//! let mut root = DependencyNode::new(Ecosystem::Npm, "a", "1.0.0")
//!     .with_filename("a-1.0.0.tgz");
//! root.push_child(DependencyNode::new(Ecosystem::Npm, "b", "2.0.1"));
//!
//! assert_eq!(root.node_count(), 2);
//! ```

mod node;
mod result;

pub use node::*;
pub use result::*;
