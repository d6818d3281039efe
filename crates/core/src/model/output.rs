use super::{CodeUnit, Coordinate, FileEntry, MergeConflict, NativeLibs};
use crate::extract::ExtractionWorkspace;
use crate::manifest::AndroidManifest;
use crate::resource::{ResourceEntry, ResourceSet};
use std::collections::BTreeMap;
use std::hash::Hasher;
use xxhash_rust::xxh3::Xxh3;

/// The consolidated payload of one merge run, ready for packaging.
///
/// File-backed entries point into the run's extraction workspace, which is
/// owned here and removed when the output is dropped.
#[derive(Debug)]
pub struct MergedOutput {
    pub module: Coordinate,
    pub manifest: AndroidManifest,
    pub code: CodeUnit,
    pub resources: ResourceSet,
    pub native_libs: NativeLibs,
    pub assets: BTreeMap<String, FileEntry>,
    /// Concatenated consumer rules, empty when no artifact ships any.
    pub proguard_rules: String,
    /// Collisions that were detected and resolved.
    pub conflicts: Vec<MergeConflict>,
    pub(crate) workspace: ExtractionWorkspace,
}

impl MergedOutput {
    /// Digest over the canonical content. Two runs over the same inputs
    /// produce the same value regardless of where files were extracted.
    pub fn fingerprint(&self) -> crate::Result<u64> {
        let mut hasher = Xxh3::new();
        let mut feed = |label: &str, bytes: &[u8]| {
            hasher.write(label.as_bytes());
            hasher.write_u64(bytes.len() as u64);
            hasher.write(bytes);
        };

        feed("manifest", self.manifest.to_xml()?.as_bytes());
        for class in self.code.classes.values() {
            feed(&class.fqn, &class.bytes);
        }
        for (path, bytes) in &self.code.java_resources {
            feed(path, bytes);
        }
        for (key, entry) in &self.resources.entries {
            let key = key.to_string();
            match entry {
                ResourceEntry::Value { canonical, .. } => feed(&key, canonical.as_bytes()),
                ResourceEntry::File {
                    relative_path,
                    file,
                } => {
                    feed(&key, relative_path.as_bytes());
                    feed(&key, &file.digest.to_le_bytes());
                }
            }
        }
        for (prefix, uri) in &self.resources.namespaces {
            feed(prefix, uri.as_bytes());
        }
        feed("R.txt", self.resources.symbols.to_text().as_bytes());
        for line in &self.resources.public {
            feed("public.txt", line.as_bytes());
        }
        for (abi, files) in &self.native_libs {
            for (path, file) in files {
                feed(&format!("{abi}/{path}"), &file.digest.to_le_bytes());
            }
        }
        for (path, file) in &self.assets {
            feed(path, &file.digest.to_le_bytes());
        }
        feed("proguard", self.proguard_rules.as_bytes());

        Ok(hasher.digest())
    }
}
