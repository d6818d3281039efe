use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    TypeDuplicate,
    JavaResourceDuplicate,
    ResourceIdClash,
    ResourceDuplicate,
    ManifestAttributeConflict,
    NativePathClash,
    AssetPathClash,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConflictKind::TypeDuplicate => "TYPE_DUPLICATE",
            ConflictKind::JavaResourceDuplicate => "JAVA_RESOURCE_DUPLICATE",
            ConflictKind::ResourceIdClash => "RESOURCE_ID_CLASH",
            ConflictKind::ResourceDuplicate => "RESOURCE_DUPLICATE",
            ConflictKind::ManifestAttributeConflict => "MANIFEST_ATTRIBUTE_CONFLICT",
            ConflictKind::NativePathClash => "NATIVE_PATH_CLASH",
            ConflictKind::AssetPathClash => "ASSET_PATH_CLASH",
        };
        f.write_str(s)
    }
}

/// How a detected collision was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", content = "detail", rename_all = "snake_case")]
pub enum Resolution {
    /// Both contributions were byte-identical; one copy was kept.
    CollapsedIdentical,
    /// The higher-priority contribution was kept.
    KeptHigherPriority,
    /// Contributions were combined (e.g. service files unioned).
    Combined,
    /// The collision cannot be settled; the run fails with this reason.
    Unresolvable(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::CollapsedIdentical => f.write_str("collapsed identical copies"),
            Resolution::KeptHigherPriority => f.write_str("kept higher-priority value"),
            Resolution::Combined => f.write_str("combined contributions"),
            Resolution::Unresolvable(reason) => write!(f, "unresolvable: {reason}"),
        }
    }
}

/// A collision between two artifacts' contributions to the same named slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    /// The colliding key: a type name, resource key, manifest path or file path.
    pub key: String,
    /// Contributing artifacts, highest priority first.
    pub contenders: Vec<String>,
    pub resolution: Resolution,
}

impl MergeConflict {
    pub fn new(
        kind: ConflictKind,
        key: impl Into<String>,
        first: impl ToString,
        second: impl ToString,
        resolution: Resolution,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            contenders: vec![first.to_string(), second.to_string()],
            resolution,
        }
    }
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]: {}",
            self.kind,
            self.key,
            self.contenders.join(", "),
            self.resolution
        )
    }
}
