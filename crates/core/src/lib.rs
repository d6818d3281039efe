pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod manifest;
pub mod merge;
pub mod model;
pub mod package;
pub mod resource;
pub mod xml;

pub use classify::{Classification, DependencyDag, DependencyDeclaration, DependencyNode, classify};
pub use config::FatAarConfig;
pub use error::{ErrorCategory, FatAarError, Result};
pub use merge::{Merger, merge};
pub use model::{Coordinate, MergeConflict, MergedOutput};
pub use package::{PackagedArtifact, package};
