//! Android resources: value entries, resource files, symbols and public
//! declarations of one artifact (or of the merged output).

mod symbols;
mod values;

pub use symbols::{SymbolTable, SymbolValue};
pub use values::{ValuesFile, parse_values, write_values};

use crate::model::FileEntry;
use crate::xml::XmlElement;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// `(type, name)` of a resource in one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
    /// Configuration qualifiers (`en-rUS`, `hdpi`, ...), empty for the default.
    pub qualifier: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::qualified(kind, name, "")
    }

    pub fn qualified(
        kind: impl Into<String>,
        name: impl Into<String>,
        qualifier: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            qualifier: qualifier.into(),
        }
    }

    /// `type/name` without qualifiers, the form used by override rules.
    pub fn short(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifier.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}[{}]", self.kind, self.name, self.qualifier)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEntry {
    /// Declared inside a `values*/` XML file.
    Value {
        element: XmlElement,
        /// Canonical single-line form, used for content comparison.
        canonical: String,
    },
    /// A standalone file such as `drawable-hdpi/icon.png`.
    File {
        /// Path relative to `res/`.
        relative_path: String,
        file: FileEntry,
    },
}

impl ResourceEntry {
    pub fn value(element: XmlElement) -> Result<Self, crate::xml::XmlError> {
        let canonical = element.to_compact_string()?;
        Ok(ResourceEntry::Value { element, canonical })
    }

    pub fn same_content(&self, other: &ResourceEntry) -> std::io::Result<bool> {
        match (self, other) {
            (ResourceEntry::Value { canonical: a, .. }, ResourceEntry::Value { canonical: b, .. }) => {
                Ok(a == b)
            }
            (
                ResourceEntry::File {
                    relative_path: pa,
                    file: fa,
                },
                ResourceEntry::File {
                    relative_path: pb,
                    file: fb,
                },
            ) => Ok(pa == pb && fa.same_content(fb)?),
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    pub entries: BTreeMap<ResourceKey, ResourceEntry>,
    pub symbols: SymbolTable,
    /// Lines of `public.txt` (`type name`).
    pub public: BTreeSet<String>,
    /// `xmlns:*` declarations found on values roots, first binding wins.
    pub namespaces: BTreeMap<String, String>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.symbols.is_empty() && self.public.is_empty()
    }

    /// Reads an unpacked `res/` directory plus the optional `R.txt` and
    /// `public.txt` next to it. Errors are descriptions of what is malformed.
    pub fn load(
        res_dir: Option<&Path>,
        r_txt: Option<&Path>,
        public_txt: Option<&Path>,
    ) -> Result<Self, String> {
        let mut set = ResourceSet::default();

        if let Some(res_dir) = res_dir {
            set.load_res_dir(res_dir)?;
        }
        if let Some(path) = r_txt {
            let content = read_text(path)?;
            set.symbols = SymbolTable::parse(&content)?;
        }
        if let Some(path) = public_txt {
            let content = read_text(path)?;
            set.public = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(set)
    }

    fn load_res_dir(&mut self, res_dir: &Path) -> Result<(), String> {
        let mut files: Vec<_> = WalkDir::new(res_dir)
            .min_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in files {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(res_dir) else {
                continue;
            };
            let components: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let [folder, file_name] = components.as_slice() else {
                debug!("Skipping nested resource file {}", relative.display());
                continue;
            };
            let (base, qualifier) = split_folder(folder);

            if base == "values" {
                if !file_name.ends_with(".xml") {
                    continue;
                }
                let content = read_text(path)?;
                let parsed = parse_values(&content)
                    .map_err(|e| format!("res/{folder}/{file_name}: {e}"))?;
                for (prefix, uri) in parsed.namespaces {
                    self.namespaces.entry(prefix).or_insert(uri);
                }
                for (kind, name, element) in parsed.values {
                    let key = ResourceKey::qualified(kind, name, qualifier);
                    let value = ResourceEntry::value(element).map_err(|e| e.to_string())?;
                    self.insert_local(key, value)?;
                }
            } else {
                let name = file_name.split('.').next().unwrap_or(file_name);
                let key = ResourceKey::qualified(base, name, qualifier);
                let file = FileEntry::from_path(path).map_err(|e| e.to_string())?;
                let value = ResourceEntry::File {
                    relative_path: format!("{folder}/{file_name}"),
                    file,
                };
                self.insert_local(key, value)?;
            }
        }
        Ok(())
    }

    /// Inserts an entry declared by the artifact being loaded. A second,
    /// different declaration inside one artifact means it was never valid.
    fn insert_local(&mut self, key: ResourceKey, value: ResourceEntry) -> Result<(), String> {
        if let Some(existing) = self.entries.get(&key) {
            if !existing.same_content(&value).map_err(|e| e.to_string())? {
                return Err(format!("resource {key} is declared twice with different content"));
            }
            return Ok(());
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Value entries grouped by output folder (`values`, `values-en`, ...),
    /// each group in key order.
    pub fn values_by_folder(&self) -> BTreeMap<String, Vec<&XmlElement>> {
        let mut out: BTreeMap<String, Vec<&XmlElement>> = BTreeMap::new();
        for (key, entry) in &self.entries {
            if let ResourceEntry::Value { element, .. } = entry {
                out.entry(folder_name("values", &key.qualifier))
                    .or_default()
                    .push(element);
            }
        }
        out
    }
}

/// `drawable-hdpi` -> (`drawable`, `hdpi`).
pub fn split_folder(folder: &str) -> (&str, &str) {
    match folder.split_once('-') {
        Some((base, qualifier)) => (base, qualifier),
        None => (folder, ""),
    }
}

pub fn folder_name(base: &str, qualifier: &str) -> String {
    if qualifier.is_empty() {
        base.to_string()
    } else {
        format!("{base}-{qualifier}")
    }
}

fn read_text(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))
}
