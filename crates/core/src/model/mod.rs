//! Typed representation of artifacts and of the merged result.

mod artifact;
mod conflict;
mod coordinate;
mod output;

pub use artifact::{ArtifactKind, ClassEntry, CodeUnit, EmbeddableArtifact, FileEntry, NativeLibs};
pub use conflict::{ConflictKind, MergeConflict, Resolution};
pub use coordinate::Coordinate;
pub use output::MergedOutput;
