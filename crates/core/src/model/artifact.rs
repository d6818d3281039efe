use super::Coordinate;
use crate::classify::DeclaredMetadata;
use crate::manifest::AndroidManifest;
use crate::resource::ResourceSet;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Android library bundle with manifest, resources and native code.
    Aar,
    /// Plain Java archive contributing classes only.
    Jar,
}

/// A file unpacked into the extraction workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub digest: u64,
}

impl FileEntry {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: bytes.len() as u64,
            digest: xxh3_64(&bytes),
        })
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    /// Byte equality. The digest only short-circuits the negative case.
    pub fn same_content(&self, other: &FileEntry) -> io::Result<bool> {
        if self.size != other.size || self.digest != other.digest {
            return Ok(false);
        }
        Ok(self.read()? == other.read()?)
    }
}

/// One compiled type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    /// Fully qualified binary name with dots, e.g. `com.acme.Util$Inner`.
    pub fqn: String,
    pub bytes: Vec<u8>,
    /// Jar inside the artifact the class came from (`classes.jar`, `libs/x.jar`).
    pub origin: String,
}

impl ClassEntry {
    /// Zip entry name, e.g. `com/acme/Util$Inner.class`.
    pub fn entry_name(&self) -> String {
        format!("{}.class", self.fqn.replace('.', "/"))
    }
}

/// Compiled code and the non-class files shipped next to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeUnit {
    pub classes: BTreeMap<String, ClassEntry>,
    pub java_resources: BTreeMap<String, Vec<u8>>,
}

impl CodeUnit {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.java_resources.is_empty()
    }
}

/// ABI name -> path relative to the ABI folder -> file.
pub type NativeLibs = BTreeMap<String, BTreeMap<String, FileEntry>>;

/// A library artifact after extraction. Immutable once built; the files it
/// points at live as long as the workspace that extracted them.
#[derive(Debug)]
pub struct EmbeddableArtifact {
    pub coordinate: Coordinate,
    pub kind: ArtifactKind,
    /// Directory the archive was unpacked into.
    pub root: PathBuf,
    pub manifest: Option<AndroidManifest>,
    pub code: CodeUnit,
    pub resources: ResourceSet,
    pub native_libs: NativeLibs,
    /// Path relative to `assets/` -> file.
    pub assets: BTreeMap<String, FileEntry>,
    pub proguard_rules: Option<String>,
    /// SDK levels the host declared for this dependency.
    pub declared: DeclaredMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_compares_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.so");
        let b = dir.path().join("b.so");
        let c = dir.path().join("c.so");
        fs::write(&a, b"\x7fELF-one").unwrap();
        fs::write(&b, b"\x7fELF-one").unwrap();
        fs::write(&c, b"\x7fELF-two").unwrap();

        let a = FileEntry::from_path(&a).unwrap();
        let b = FileEntry::from_path(&b).unwrap();
        let c = FileEntry::from_path(&c).unwrap();
        assert!(a.same_content(&b).unwrap());
        assert!(!a.same_content(&c).unwrap());
    }

    #[test]
    fn test_class_entry_name() {
        let c = ClassEntry {
            fqn: "com.acme.Util$Inner".to_string(),
            bytes: vec![],
            origin: "classes.jar".to_string(),
        };
        assert_eq!(c.entry_name(), "com/acme/Util$Inner.class");
    }
}
