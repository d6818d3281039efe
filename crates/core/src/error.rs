use std::path::PathBuf;
use thiserror::Error;

/// Coarse grouping of failures, in the order they can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Raised by classification, before anything is extracted.
    Configuration,
    /// A dependency archive could not be unpacked or understood.
    Extraction,
    /// Two artifacts contribute incompatible content to the same slot.
    Conflict,
    /// The final artifact could not be written.
    Packaging,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Configuration => "configuration error",
            ErrorCategory::Extraction => "extraction error",
            ErrorCategory::Conflict => "merge conflict",
            ErrorCategory::Packaging => "packaging error",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum FatAarError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("embedded dependency {key} is requested in several versions: {}", .versions.join(", "))]
    AmbiguousVersion { key: String, versions: Vec<String> },
    #[error("{from} requires {missing}, which is not in the dependency list")]
    UnknownDependency { from: String, missing: String },
    #[error("embedded dependency {coordinate} has no resolved archive")]
    MissingArchive { coordinate: String },
    #[error("corrupt artifact {artifact}: {reason}")]
    CorruptArtifact { artifact: String, reason: String },
    #[error("type {fqn} is defined differently by {first} and {second}")]
    DuplicateType {
        fqn: String,
        first: String,
        second: String,
    },
    #[error("java resource {path} differs between {first} and {second}")]
    JavaResourceConflict {
        path: String,
        first: String,
        second: String,
    },
    #[error("manifest conflict at {element}: {detail} ({first} vs {second})")]
    ManifestConflict {
        element: String,
        detail: String,
        first: String,
        second: String,
    },
    #[error("no SDK level satisfies all manifests: min {min} exceeds max {max}")]
    IncompatibleSdkRange { min: u32, max: u32 },
    #[error("resource {key} differs between {first} and {second}")]
    ResourceConflict {
        key: String,
        first: String,
        second: String,
    },
    #[error("resource id {id:#010x} is assigned to {first} and {second}")]
    ResourceIdClash {
        id: u32,
        first: String,
        second: String,
    },
    #[error("native library {path} differs between {first} and {second}")]
    NativeLibraryConflict {
        path: String,
        first: String,
        second: String,
    },
    #[error("asset {path} differs between {first} and {second}")]
    AssetConflict {
        path: String,
        first: String,
        second: String,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Packaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML error: {0}")]
    Xml(#[from] crate::xml::XmlError),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl FatAarError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FatAarError::Config(_)
            | FatAarError::CyclicDependency { .. }
            | FatAarError::AmbiguousVersion { .. }
            | FatAarError::UnknownDependency { .. }
            | FatAarError::MissingArchive { .. }
            | FatAarError::Json(_) => ErrorCategory::Configuration,
            FatAarError::CorruptArtifact { .. }
            | FatAarError::Io(_)
            | FatAarError::Xml(_)
            | FatAarError::Zip(_) => ErrorCategory::Extraction,
            FatAarError::DuplicateType { .. }
            | FatAarError::JavaResourceConflict { .. }
            | FatAarError::ManifestConflict { .. }
            | FatAarError::IncompatibleSdkRange { .. }
            | FatAarError::ResourceConflict { .. }
            | FatAarError::ResourceIdClash { .. }
            | FatAarError::NativeLibraryConflict { .. }
            | FatAarError::AssetConflict { .. } => ErrorCategory::Conflict,
            FatAarError::Packaging { .. } => ErrorCategory::Packaging,
        }
    }

    pub(crate) fn corrupt(artifact: impl ToString, reason: impl Into<String>) -> Self {
        FatAarError::CorruptArtifact {
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FatAarError>;
