//! Native library and asset trees. Paths are compared by byte content only.

use crate::error::{FatAarError, Result};
use crate::model::{ConflictKind, FileEntry, MergeConflict, NativeLibs, Resolution};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeKind {
    Native,
    Asset,
}

impl TreeKind {
    fn conflict_kind(self) -> ConflictKind {
        match self {
            TreeKind::Native => ConflictKind::NativePathClash,
            TreeKind::Asset => ConflictKind::AssetPathClash,
        }
    }

    fn error(self, path: String, first: &str, second: &str) -> FatAarError {
        let (first, second) = (first.to_string(), second.to_string());
        match self {
            TreeKind::Native => FatAarError::NativeLibraryConflict {
                path,
                first,
                second,
            },
            TreeKind::Asset => FatAarError::AssetConflict {
                path,
                first,
                second,
            },
        }
    }
}

/// Merges per-ABI native library trees, highest priority first.
pub fn merge_native_libs(
    trees: &[(String, &NativeLibs)],
) -> Result<(NativeLibs, Vec<MergeConflict>)> {
    let flattened: Vec<(String, BTreeMap<String, FileEntry>)> = trees
        .iter()
        .map(|(label, libs)| {
            let files = libs
                .iter()
                .flat_map(|(abi, files)| {
                    files
                        .iter()
                        .map(move |(path, file)| (format!("{abi}/{path}"), file.clone()))
                })
                .collect();
            (label.clone(), files)
        })
        .collect();
    let inputs: Vec<(String, &BTreeMap<String, FileEntry>)> = flattened
        .iter()
        .map(|(label, files)| (label.clone(), files))
        .collect();

    let (merged, conflicts) = merge_tree(&inputs, TreeKind::Native)?;

    let mut out = NativeLibs::new();
    for (key, file) in merged {
        if let Some((abi, path)) = key.split_once('/') {
            out.entry(abi.to_string())
                .or_default()
                .insert(path.to_string(), file);
        }
    }
    Ok((out, conflicts))
}

/// Merges asset trees, highest priority first.
pub fn merge_assets(
    trees: &[(String, &BTreeMap<String, FileEntry>)],
) -> Result<(BTreeMap<String, FileEntry>, Vec<MergeConflict>)> {
    merge_tree(trees, TreeKind::Asset)
}

fn merge_tree(
    trees: &[(String, &BTreeMap<String, FileEntry>)],
    kind: TreeKind,
) -> Result<(BTreeMap<String, FileEntry>, Vec<MergeConflict>)> {
    let mut merged: BTreeMap<String, FileEntry> = BTreeMap::new();
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for (label, files) in trees {
        for (path, file) in files.iter() {
            match merged.get(path) {
                None => {
                    merged.insert(path.clone(), file.clone());
                    owners.insert(path, label);
                }
                Some(existing) => {
                    let first = owners.get(path.as_str()).copied().unwrap_or_default();
                    if !existing.same_content(file)? {
                        return Err(kind.error(path.clone(), first, label));
                    }
                    conflicts.push(MergeConflict::new(
                        kind.conflict_kind(),
                        path.as_str(),
                        first,
                        label,
                        Resolution::CollapsedIdentical,
                    ));
                }
            }
        }
    }
    Ok((merged, conflicts))
}
