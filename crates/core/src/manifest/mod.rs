//! `AndroidManifest.xml` model.

mod sdk;

pub use sdk::{SdkRange, intersect_sdk_ranges};

use crate::xml::{self, XmlElement, XmlError};

pub const ANDROID_NAME: &str = "android:name";
pub const TOOLS_PREFIX: &str = "tools:";
pub const TOOLS_NODE: &str = "tools:node";
pub const TOOLS_NAMESPACE_DECL: &str = "xmlns:tools";

/// Elements whose class-name attributes may be written relative to the package.
const COMPONENT_TAGS: &[&str] = &[
    "application",
    "activity",
    "activity-alias",
    "service",
    "receiver",
    "provider",
    "instrumentation",
];

const CLASS_NAME_ATTRIBUTES: &[&str] = &[
    ANDROID_NAME,
    "android:targetActivity",
    "android:backupAgent",
    "android:manageSpaceActivity",
];

/// Elements that appear at most once under their parent and merge by tag.
const SINGLETON_TAGS: &[&str] = &[
    "application",
    "uses-sdk",
    "supports-screens",
    "queries",
    "compatible-screens",
];

/// Merge strategy for one element, selected with `tools:node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodePolicy {
    #[default]
    Merge,
    Replace,
    Remove,
    Strict,
}

impl NodePolicy {
    pub fn of(element: &XmlElement) -> NodePolicy {
        match element.attr(TOOLS_NODE) {
            Some("replace") => NodePolicy::Replace,
            Some("remove") | Some("removeAll") => NodePolicy::Remove,
            Some("strict") => NodePolicy::Strict,
            _ => NodePolicy::Merge,
        }
    }
}

/// Identifying key of an element within its parent.
///
/// Returns `None` for elements that have no identity (they are deduplicated
/// structurally instead), and an empty key for singletons.
pub fn element_key(element: &XmlElement) -> Option<String> {
    if SINGLETON_TAGS.contains(&element.name.as_str()) {
        return Some(String::new());
    }
    if let Some(name) = element.attr(ANDROID_NAME) {
        return Some(name.to_string());
    }
    if element.name == "uses-feature" {
        return element
            .attr("android:glEsVersion")
            .map(|v| format!("glEsVersion={v}"));
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidManifest {
    pub root: XmlElement,
}

impl AndroidManifest {
    pub fn parse(content: &str) -> Result<Self, XmlError> {
        let root = xml::parse_document(content)?;
        if root.name != "manifest" {
            return Err(XmlError::Structure(format!(
                "root element is <{}>, expected <manifest>",
                root.name
            )));
        }
        Ok(Self { root })
    }

    pub fn package(&self) -> Option<&str> {
        self.root.attr("package")
    }

    pub fn uses_sdk(&self) -> Option<&XmlElement> {
        self.root.elements().find(|e| e.name == "uses-sdk")
    }

    pub fn min_sdk(&self) -> Option<u32> {
        self.sdk_attr("android:minSdkVersion")
    }

    pub fn max_sdk(&self) -> Option<u32> {
        self.sdk_attr("android:maxSdkVersion")
    }

    pub fn target_sdk(&self) -> Option<u32> {
        self.sdk_attr("android:targetSdkVersion")
    }

    fn sdk_attr(&self, key: &str) -> Option<u32> {
        self.uses_sdk()?.attr(key)?.trim().parse().ok()
    }

    /// SDK bounds declared by this manifest, with `fallback_min` used when
    /// the manifest itself declares no minimum.
    pub fn sdk_range(&self, fallback_min: Option<u32>) -> SdkRange {
        SdkRange {
            min: self.min_sdk().or(fallback_min).unwrap_or(1),
            max: self.max_sdk(),
        }
    }

    /// Rewrites relative component class names (`.Foo`, `Foo`) into fully
    /// qualified names using this manifest's package.
    pub fn expand_class_names(&mut self) {
        let Some(package) = self.package().map(str::to_string) else {
            return;
        };
        expand_in(&mut self.root, &package);
    }

    pub fn to_xml(&self) -> Result<String, XmlError> {
        xml::write_document(&self.root)
    }
}

fn expand_in(element: &mut XmlElement, package: &str) {
    if COMPONENT_TAGS.contains(&element.name.as_str()) {
        for (key, value) in element.attributes.iter_mut() {
            if !CLASS_NAME_ATTRIBUTES.contains(&key.as_str()) {
                continue;
            }
            if value.starts_with('.') {
                *value = format!("{package}{value}");
            } else if !value.contains('.') && !value.is_empty() && !value.starts_with('$') {
                *value = format!("{package}.{value}");
            }
        }
    }
    for child in element.elements_mut() {
        expand_in(child, package);
    }
}
