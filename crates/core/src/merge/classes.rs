//! Class merging.
//!
//! The merged code set is a plain union keyed by fully qualified name. Class
//! bytes are never rewritten; a second definition of a name is accepted only
//! when it is byte-identical to the first.

use crate::error::{FatAarError, Result};
use crate::model::{
    ClassEntry, CodeUnit, ConflictKind, Coordinate, EmbeddableArtifact, MergeConflict, Resolution,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const SERVICES_DIR: &str = "META-INF/services/";

pub(crate) fn is_service_file(name: &str) -> bool {
    name.strip_prefix(SERVICES_DIR)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Line union of two service-loader files. Order of first appearance is
/// kept; blank lines and repeated providers are dropped.
pub(crate) fn merge_service_lines(existing: &[u8], incoming: &[u8]) -> Vec<u8> {
    let existing = String::from_utf8_lossy(existing);
    let incoming = String::from_utf8_lossy(incoming);

    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in existing.lines().chain(incoming.lines()) {
        let line = line.trim();
        if line.is_empty() || !seen.insert(line.to_string()) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.into_bytes()
}

/// Merges the code of `artifacts`, which are ordered highest priority first.
pub fn merge_code(
    artifacts: &[&EmbeddableArtifact],
) -> Result<(CodeUnit, Vec<MergeConflict>)> {
    let mut merged = CodeUnit::default();
    let mut conflicts = Vec::new();
    let mut class_owner: BTreeMap<String, &Coordinate> = BTreeMap::new();
    let mut resource_owner: BTreeMap<String, &Coordinate> = BTreeMap::new();

    for artifact in artifacts {
        let coordinate = &artifact.coordinate;

        for (fqn, class) in &artifact.code.classes {
            match merged.classes.get(fqn) {
                None => {
                    merged.classes.insert(fqn.clone(), class.clone());
                    class_owner.insert(fqn.clone(), coordinate);
                }
                Some(existing) => {
                    let first = class_owner[fqn];
                    check_duplicate_type(existing, class, first, coordinate)?;
                    debug!("{} redeclares identical {}", coordinate, fqn);
                    conflicts.push(MergeConflict::new(
                        ConflictKind::TypeDuplicate,
                        fqn.as_str(),
                        first,
                        coordinate,
                        Resolution::CollapsedIdentical,
                    ));
                }
            }
        }

        for (path, bytes) in &artifact.code.java_resources {
            if !merged.java_resources.contains_key(path) {
                merged.java_resources.insert(path.clone(), bytes.clone());
                resource_owner.insert(path.clone(), coordinate);
                continue;
            }
            let first = resource_owner[path];
            let Some(existing) = merged.java_resources.get_mut(path) else {
                continue;
            };
            let resolution = if is_service_file(path) {
                *existing = merge_service_lines(existing, bytes);
                Resolution::Combined
            } else if existing == bytes {
                Resolution::CollapsedIdentical
            } else {
                return Err(FatAarError::JavaResourceConflict {
                    path: path.clone(),
                    first: first.to_string(),
                    second: coordinate.to_string(),
                });
            };
            conflicts.push(MergeConflict::new(
                ConflictKind::JavaResourceDuplicate,
                path.as_str(),
                first,
                coordinate,
                resolution,
            ));
        }
    }

    Ok((merged, conflicts))
}

fn check_duplicate_type(
    existing: &ClassEntry,
    incoming: &ClassEntry,
    first: &Coordinate,
    second: &Coordinate,
) -> Result<()> {
    if existing.bytes == incoming.bytes {
        return Ok(());
    }
    Err(FatAarError::DuplicateType {
        fqn: existing.fqn.clone(),
        first: first.to_string(),
        second: second.to_string(),
    })
}
