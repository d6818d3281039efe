//! Resource merging: entries, symbol tables and public declarations.

use crate::config::ResourcePolicy;
use crate::error::{FatAarError, Result};
use crate::model::{ConflictKind, MergeConflict, Resolution};
use crate::resource::{ResourceKey, ResourceSet, SymbolValue};
use std::collections::BTreeMap;
use tracing::warn;

/// Merges `sets` (highest priority first), each labelled with its artifact.
pub fn merge_resources(
    sets: &[(String, &ResourceSet)],
    policy: &ResourcePolicy,
) -> Result<(ResourceSet, Vec<MergeConflict>)> {
    let mut merged = ResourceSet::default();
    let mut conflicts = Vec::new();
    let mut owners: BTreeMap<ResourceKey, &str> = BTreeMap::new();

    for (label, set) in sets {
        for (key, entry) in &set.entries {
            if !merged.entries.contains_key(key) {
                merged.entries.insert(key.clone(), entry.clone());
                owners.insert(key.clone(), label.as_str());
                continue;
            }
            let existing = &merged.entries[key];
            let first = owners.get(key).copied().unwrap_or_default();

            let resolution = if existing.same_content(entry)? {
                Resolution::CollapsedIdentical
            } else if policy.permits_override(&key.short()) {
                warn!("{}: {} overrides {}", key, first, label);
                Resolution::KeptHigherPriority
            } else {
                return Err(FatAarError::ResourceConflict {
                    key: key.to_string(),
                    first: first.to_string(),
                    second: label.clone(),
                });
            };
            conflicts.push(MergeConflict::new(
                ConflictKind::ResourceDuplicate,
                key.to_string(),
                first,
                label,
                resolution,
            ));
        }
        merged.public.extend(set.public.iter().cloned());
        for (prefix, uri) in &set.namespaces {
            merged
                .namespaces
                .entry(prefix.clone())
                .or_insert_with(|| uri.clone());
        }
    }

    merge_symbols(sets, &mut merged, &mut conflicts)?;
    Ok((merged, conflicts))
}

/// Unions the `R.txt` tables. A given id may name only one `(type, name)`
/// across all artifacts; a name carrying different ids keeps the
/// higher-priority one.
fn merge_symbols(
    sets: &[(String, &ResourceSet)],
    merged: &mut ResourceSet,
    conflicts: &mut Vec<MergeConflict>,
) -> Result<()> {
    let mut id_owner: BTreeMap<u32, (&(String, String), &str)> = BTreeMap::new();
    let mut symbol_owner: BTreeMap<&(String, String), &str> = BTreeMap::new();

    for (label, set) in sets {
        for (id, key) in set.symbols.ids() {
            match id_owner.get(&id) {
                Some((owner_key, owner)) if *owner_key != key => {
                    return Err(FatAarError::ResourceIdClash {
                        id,
                        first: format!("{}/{} in {}", owner_key.0, owner_key.1, owner),
                        second: format!("{}/{} in {}", key.0, key.1, label),
                    });
                }
                Some(_) => {}
                None => {
                    id_owner.insert(id, (key, label.as_str()));
                }
            }
        }

        for (key, value) in &set.symbols.symbols {
            match merged.symbols.symbols.get(key) {
                None => {
                    merged.symbols.symbols.insert(key.clone(), value.clone());
                    symbol_owner.insert(key, label.as_str());
                }
                Some(existing) if existing == value => {}
                Some(existing) => {
                    // Styleable arrays of the same name are per-artifact layouts.
                    if matches!(existing, SymbolValue::Id(_)) {
                        let first = symbol_owner.get(key).copied().unwrap_or_default();
                        warn!("{}/{}: keeping id from {} over {}", key.0, key.1, first, label);
                        conflicts.push(MergeConflict::new(
                            ConflictKind::ResourceIdClash,
                            format!("{}/{}", key.0, key.1),
                            first,
                            label,
                            Resolution::KeptHigherPriority,
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}
