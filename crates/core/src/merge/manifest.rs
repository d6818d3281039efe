//! Manifest merging.
//!
//! Library manifests are folded one at a time into a copy of the main
//! manifest, highest priority first, so the element already in the result is
//! always the higher-priority one. Its `tools:node` value picks the strategy.
//! `tools:` markers survive until the fold is complete, which lets a removal
//! declared by one manifest apply to every lower-priority one.

use crate::classify::DeclaredMetadata;
use crate::config::ManifestPolicy;
use crate::error::{FatAarError, Result};
use crate::manifest::{
    AndroidManifest, NodePolicy, SdkRange, TOOLS_NAMESPACE_DECL, TOOLS_NODE, TOOLS_PREFIX,
    element_key, intersect_sdk_ranges,
};
use crate::model::{ConflictKind, MergeConflict, Resolution};
use crate::xml::{XmlElement, XmlNode};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One manifest taking part in the merge.
#[derive(Debug, Clone)]
pub struct ManifestSource<'a> {
    /// Identity used in conflict reports.
    pub label: String,
    pub manifest: &'a AndroidManifest,
    /// SDK levels declared by the host, used when the manifest has none.
    pub declared: DeclaredMetadata,
}

/// Merges `libraries` (highest priority first) into `main`.
pub fn merge_manifests(
    main: &ManifestSource<'_>,
    libraries: &[ManifestSource<'_>],
    policy: &ManifestPolicy,
) -> Result<(AndroidManifest, Vec<MergeConflict>)> {
    let sdk = merged_sdk_range(main, libraries)?;
    let target_sdk = declared_target_sdk(main)
        .or_else(|| libraries.iter().filter_map(declared_target_sdk).max());

    let mut result = main.manifest.clone();
    result.expand_class_names();

    let mut merger = ManifestMerger {
        main_label: &main.label,
        policy,
        origins: HashMap::new(),
        attribute_origins: HashMap::new(),
        conflicts: Vec::new(),
    };

    for library in libraries {
        let mut incoming = library.manifest.clone();
        incoming.expand_class_names();
        debug!("Merging manifest of {}", library.label);
        merger.merge_root(&mut result.root, &incoming.root, &library.label)?;
    }
    let conflicts = merger.conflicts;

    apply_removals(&mut result.root);
    strip_tools(&mut result.root);
    write_uses_sdk(&mut result.root, sdk, target_sdk);

    Ok((result, conflicts))
}

/// The manifest's `targetSdkVersion`, else the one the host declared.
fn declared_target_sdk(source: &ManifestSource<'_>) -> Option<u32> {
    source.manifest.target_sdk().or(source.declared.target_sdk)
}

fn merged_sdk_range(
    main: &ManifestSource<'_>,
    libraries: &[ManifestSource<'_>],
) -> Result<SdkRange> {
    let ranges: Vec<SdkRange> = std::iter::once(main)
        .chain(libraries)
        .map(|s| s.manifest.sdk_range(s.declared.min_sdk))
        .collect();
    intersect_sdk_ranges(&ranges)
}

struct ManifestMerger<'p> {
    main_label: &'p str,
    policy: &'p ManifestPolicy,
    /// Element path -> label of the library that introduced it. Paths that
    /// are absent belong to the main manifest.
    origins: HashMap<String, String>,
    /// `(element path, attribute)` -> label of the library that supplied an
    /// attribute to an element it did not introduce.
    attribute_origins: HashMap<(String, String), String>,
    conflicts: Vec<MergeConflict>,
}

impl ManifestMerger<'_> {
    fn merge_root(
        &mut self,
        target: &mut XmlElement,
        incoming: &XmlElement,
        label: &str,
    ) -> Result<()> {
        // Only namespace declarations carry over from a library root.
        for (key, value) in &incoming.attributes {
            if key.starts_with("xmlns:") && target.attr(key).is_none() {
                target.set_attr(key, value.clone());
            }
        }
        self.merge_children(target, incoming, "manifest", label)
    }

    fn merge_children(
        &mut self,
        target: &mut XmlElement,
        incoming: &XmlElement,
        path: &str,
        label: &str,
    ) -> Result<()> {
        for child in incoming.elements() {
            if path == "manifest" && child.name == "uses-sdk" {
                continue;
            }
            if removes_all(target, &child.name) {
                continue;
            }

            let Some(key) = element_key(child) else {
                let normalized = normalize(child);
                if !target.elements().any(|e| normalize(e) == normalized) {
                    target.push_element(child.clone());
                }
                continue;
            };

            let child_path = element_path(path, &child.name, &key);
            let existing = target
                .elements_mut()
                .find(|e| e.name == child.name && element_key(e).as_deref() == Some(key.as_str()));

            match existing {
                None => {
                    target.push_element(child.clone());
                    self.origins.insert(child_path, label.to_string());
                }
                Some(existing) => match NodePolicy::of(existing) {
                    NodePolicy::Remove | NodePolicy::Replace => {}
                    NodePolicy::Strict => {
                        if normalize(existing) != normalize(child) {
                            return Err(FatAarError::ManifestConflict {
                                element: child_path.clone(),
                                detail: "element is declared strict but differs".to_string(),
                                first: self.owner(&child_path),
                                second: label.to_string(),
                            });
                        }
                    }
                    NodePolicy::Merge => {
                        self.merge_attributes(existing, child, &child_path, label)?;
                        self.merge_children(existing, child, &child_path, label)?;
                    }
                },
            }
        }
        Ok(())
    }

    fn merge_attributes(
        &mut self,
        target: &mut XmlElement,
        incoming: &XmlElement,
        path: &str,
        label: &str,
    ) -> Result<()> {
        for (key, value) in &incoming.attributes {
            if key.starts_with(TOOLS_PREFIX) {
                continue;
            }
            let Some(current) = target.attr(key) else {
                target.set_attr(key, value.clone());
                self.attribute_origins
                    .insert((path.to_string(), key.clone()), label.to_string());
                continue;
            };
            if current == value {
                continue;
            }

            let owner = self.attribute_owner(path, key);
            let from_main = owner == self.main_label;
            let detail = format!("{key}=\"{current}\" vs \"{value}\"");
            if target.name == "meta-data" && !from_main && self.policy.strict_library_meta_data {
                return Err(FatAarError::ManifestConflict {
                    element: path.to_string(),
                    detail,
                    first: owner,
                    second: label.to_string(),
                });
            }

            if !from_main {
                warn!("{}: {} wins over {} ({})", path, owner, label, detail);
            }
            self.conflicts.push(MergeConflict::new(
                ConflictKind::ManifestAttributeConflict,
                format!("{path}@{key}"),
                owner,
                label,
                Resolution::KeptHigherPriority,
            ));
        }
        Ok(())
    }

    fn attribute_owner(&self, path: &str, attribute: &str) -> String {
        self.attribute_origins
            .get(&(path.to_string(), attribute.to_string()))
            .cloned()
            .unwrap_or_else(|| self.owner(path))
    }

    /// Label of the manifest that introduced the element at `path`.
    fn owner(&self, path: &str) -> String {
        let mut current = path;
        loop {
            if let Some(label) = self.origins.get(current) {
                return label.clone();
            }
            match current.rsplit_once('/') {
                Some((parent, _)) => current = parent,
                None => return self.main_label.to_string(),
            }
        }
    }
}

fn element_path(parent: &str, name: &str, key: &str) -> String {
    if key.is_empty() {
        format!("{parent}/{name}")
    } else {
        format!("{parent}/{name}[{key}]")
    }
}

fn removes_all(target: &XmlElement, name: &str) -> bool {
    target
        .elements()
        .any(|e| e.name == name && e.attr(TOOLS_NODE) == Some("removeAll"))
}

/// Comparable form: `tools:` attributes dropped, attributes sorted.
fn normalize(element: &XmlElement) -> XmlElement {
    let mut out = XmlElement::new(element.name.clone());
    out.attributes = element
        .attributes
        .iter()
        .filter(|(k, _)| !k.starts_with(TOOLS_PREFIX) && k != TOOLS_NAMESPACE_DECL)
        .cloned()
        .collect();
    out.attributes.sort();
    out.children = element
        .children
        .iter()
        .map(|c| match c {
            XmlNode::Element(e) => XmlNode::Element(normalize(e)),
            XmlNode::Text(t) => XmlNode::Text(t.clone()),
        })
        .collect();
    out
}

/// Drops every element marked for removal, with its lower-priority copies
/// already folded into it.
fn apply_removals(element: &mut XmlElement) {
    let remove_all: Vec<String> = element
        .elements()
        .filter(|e| e.attr(TOOLS_NODE) == Some("removeAll"))
        .map(|e| e.name.clone())
        .collect();
    element.children.retain(|c| match c {
        XmlNode::Element(e) => {
            NodePolicy::of(e) != NodePolicy::Remove && !remove_all.contains(&e.name)
        }
        XmlNode::Text(_) => true,
    });
    for child in element.elements_mut() {
        apply_removals(child);
    }
}

fn strip_tools(element: &mut XmlElement) {
    element
        .attributes
        .retain(|(k, _)| !k.starts_with(TOOLS_PREFIX) && k != TOOLS_NAMESPACE_DECL);
    for child in element.elements_mut() {
        strip_tools(child);
    }
}

fn write_uses_sdk(root: &mut XmlElement, sdk: SdkRange, target_sdk: Option<u32>) {
    let mut uses_sdk = XmlElement::new("uses-sdk");
    uses_sdk.set_attr("android:minSdkVersion", sdk.min.to_string());
    if let Some(target) = target_sdk {
        uses_sdk.set_attr("android:targetSdkVersion", target.to_string());
    }
    if let Some(max) = sdk.max {
        uses_sdk.set_attr("android:maxSdkVersion", max.to_string());
    }

    let existing = root.elements_mut().find(|e| e.name == "uses-sdk");
    match existing {
        Some(existing) => {
            for (key, value) in uses_sdk.attributes {
                existing.set_attr(&key, value);
            }
        }
        None => root.children.insert(0, XmlNode::Element(uses_sdk)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    xmlns:tools="http://schemas.android.com/tools" package="com.acme.sdk">
    <uses-sdk android:minSdkVersion="21" android:targetSdkVersion="33"/>
    <uses-permission android:name="android.permission.INTERNET"/>
    <application android:label="@string/app_name">
        <meta-data android:name="com.acme.KEY" android:value="main"/>
        <activity android:name="com.acme.lib.Debug" tools:node="remove"/>
    </application>
</manifest>"#;

    const LIB_A: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.acme.lib">
    <uses-sdk android:minSdkVersion="19"/>
    <uses-permission android:name="android.permission.INTERNET"/>
    <uses-permission android:name="android.permission.CAMERA"/>
    <application android:label="Lib" android:allowBackup="false">
        <activity android:name=".Debug"/>
        <activity android:name=".Main">
            <intent-filter><action android:name="com.acme.OPEN"/></intent-filter>
        </activity>
        <meta-data android:name="com.acme.KEY" android:value="lib"/>
        <meta-data android:name="com.acme.SHARED" android:value="a"/>
    </application>
</manifest>"#;

    const LIB_B: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.acme.other">
    <uses-sdk android:minSdkVersion="23" android:maxSdkVersion="34"/>
    <application>
        <activity android:name="com.acme.lib.Main">
            <intent-filter><action android:name="com.acme.OPEN"/></intent-filter>
        </activity>
        <meta-data android:name="com.acme.SHARED" android:value="b"/>
    </application>
</manifest>"#;

    fn source<'a>(label: &str, manifest: &'a AndroidManifest) -> ManifestSource<'a> {
        ManifestSource {
            label: label.to_string(),
            manifest,
            declared: DeclaredMetadata::default(),
        }
    }

    fn merge(
        libraries: &[&str],
        policy: &ManifestPolicy,
    ) -> Result<(AndroidManifest, Vec<MergeConflict>)> {
        let main = AndroidManifest::parse(MAIN).unwrap();
        let libs: Vec<AndroidManifest> = libraries
            .iter()
            .map(|l| AndroidManifest::parse(l).unwrap())
            .collect();
        let sources: Vec<_> = libs
            .iter()
            .enumerate()
            .map(|(i, m)| source(&format!("lib{i}"), m))
            .collect();
        merge_manifests(&source("main", &main), &sources, policy)
    }

    fn application(m: &AndroidManifest) -> &XmlElement {
        m.root.elements().find(|e| e.name == "application").unwrap()
    }

    #[test]
    fn test_main_wins_and_libraries_append() {
        let (merged, conflicts) = merge(&[LIB_A, LIB_B], &ManifestPolicy::default()).unwrap();
        assert_eq!(merged.package(), Some("com.acme.sdk"));

        let permissions: Vec<_> = merged
            .root
            .elements()
            .filter(|e| e.name == "uses-permission")
            .filter_map(|e| e.attr("android:name"))
            .collect();
        assert_eq!(
            permissions,
            vec!["android.permission.INTERNET", "android.permission.CAMERA"]
        );

        let app = application(&merged);
        assert_eq!(app.attr("android:label"), Some("@string/app_name"));
        assert_eq!(app.attr("android:allowBackup"), Some("false"));
        let key = app
            .elements()
            .find(|e| e.attr("android:name") == Some("com.acme.KEY"))
            .unwrap();
        assert_eq!(key.attr("android:value"), Some("main"));

        assert!(
            conflicts
                .iter()
                .any(|c| c.key.ends_with("@android:label") && c.contenders[0] == "main")
        );
    }

    #[test]
    fn test_remove_marker_drops_library_element_and_tools() {
        let (merged, _) = merge(&[LIB_A], &ManifestPolicy::default()).unwrap();
        let app = application(&merged);
        let activities: Vec<_> = app
            .elements()
            .filter(|e| e.name == "activity")
            .filter_map(|e| e.attr("android:name"))
            .collect();
        assert_eq!(activities, vec!["com.acme.lib.Main"]);

        let xml = merged.to_xml().unwrap();
        assert!(!xml.contains("tools:"));
    }

    #[test]
    fn test_unkeyed_children_deduplicated() {
        let (merged, _) = merge(&[LIB_A, LIB_B], &ManifestPolicy::default()).unwrap();
        let main_activity = application(&merged)
            .elements()
            .find(|e| e.attr("android:name") == Some("com.acme.lib.Main"))
            .unwrap();
        assert_eq!(main_activity.elements().count(), 1);
    }

    #[test]
    fn test_library_meta_data_resolved_by_priority() {
        let (merged, conflicts) = merge(&[LIB_A, LIB_B], &ManifestPolicy::default()).unwrap();
        let shared = application(&merged)
            .elements()
            .find(|e| e.attr("android:name") == Some("com.acme.SHARED"))
            .unwrap();
        assert_eq!(shared.attr("android:value"), Some("a"));
        let conflict = conflicts
            .iter()
            .find(|c| c.key.contains("com.acme.SHARED"))
            .unwrap();
        assert_eq!(conflict.contenders, vec!["lib0", "lib1"]);
    }

    #[test]
    fn test_strict_library_meta_data() {
        let policy = ManifestPolicy {
            strict_library_meta_data: true,
        };
        let err = merge(&[LIB_A, LIB_B], &policy).unwrap_err();
        match err {
            FatAarError::ManifestConflict { first, second, .. } => {
                assert_eq!(first, "lib0");
                assert_eq!(second, "lib1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uses_sdk_rewritten_from_intersection() {
        let (merged, _) = merge(&[LIB_A, LIB_B], &ManifestPolicy::default()).unwrap();
        assert_eq!(merged.min_sdk(), Some(23));
        assert_eq!(merged.max_sdk(), Some(34));
        assert_eq!(merged.target_sdk(), Some(33));
    }

    #[test]
    fn test_incompatible_sdk_range() {
        let lib = r#"<manifest package="com.acme.old">
    <uses-sdk android:minSdkVersion="14" android:maxSdkVersion="20"/>
</manifest>"#;
        assert!(matches!(
            merge(&[lib], &ManifestPolicy::default()),
            Err(FatAarError::IncompatibleSdkRange { min: 21, max: 20 })
        ));
    }

    #[test]
    fn test_replace_and_strict_policies() {
        let main = AndroidManifest::parse(
            r#"<manifest xmlns:tools="http://schemas.android.com/tools" package="com.acme.sdk">
    <application>
        <provider android:name="com.acme.Init" android:authorities="a" tools:node="replace"/>
        <service android:name="com.acme.Sync" android:exported="false" tools:node="strict"/>
    </application>
</manifest>"#,
        )
        .unwrap();
        let replaced = AndroidManifest::parse(
            r#"<manifest package="com.acme.lib">
    <application>
        <provider android:name="com.acme.Init" android:authorities="b" android:enabled="false"/>
    </application>
</manifest>"#,
        )
        .unwrap();
        let (merged, _) = merge_manifests(
            &source("main", &main),
            &[source("lib", &replaced)],
            &ManifestPolicy::default(),
        )
        .unwrap();
        let provider = application(&merged)
            .elements()
            .find(|e| e.name == "provider")
            .unwrap();
        assert_eq!(provider.attr("android:authorities"), Some("a"));
        assert_eq!(provider.attr("android:enabled"), None);

        let strict = AndroidManifest::parse(
            r#"<manifest package="com.acme.lib">
    <application>
        <service android:name="com.acme.Sync" android:exported="true"/>
    </application>
</manifest>"#,
        )
        .unwrap();
        let err = merge_manifests(
            &source("main", &main),
            &[source("lib", &strict)],
            &ManifestPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FatAarError::ManifestConflict { .. }));
    }

    #[test]
    fn test_declared_min_sdk_used_as_fallback() {
        let main = AndroidManifest::parse(r#"<manifest package="com.acme.sdk"/>"#).unwrap();
        let lib = AndroidManifest::parse(r#"<manifest package="com.acme.lib"/>"#).unwrap();
        let mut lib_source = source("lib", &lib);
        lib_source.declared.min_sdk = Some(24);
        let (merged, _) =
            merge_manifests(&source("main", &main), &[lib_source], &ManifestPolicy::default())
                .unwrap();
        assert_eq!(merged.min_sdk(), Some(24));
        assert_eq!(merged.target_sdk(), None);
    }

    #[test]
    fn test_declared_target_sdk_used_as_fallback() {
        let main = AndroidManifest::parse(r#"<manifest package="com.acme.sdk"/>"#).unwrap();
        let lib = AndroidManifest::parse(r#"<manifest package="com.acme.lib"/>"#).unwrap();
        let mut lib_source = source("lib", &lib);
        lib_source.declared.target_sdk = Some(34);
        let (merged, _) =
            merge_manifests(&source("main", &main), &[lib_source], &ManifestPolicy::default())
                .unwrap();
        assert_eq!(merged.target_sdk(), Some(34));
    }

    #[test]
    fn test_remove_all_drops_every_library_copy() {
        let main = AndroidManifest::parse(
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    xmlns:tools="http://schemas.android.com/tools" package="com.acme.sdk">
    <uses-permission tools:node="removeAll"/>
    <application/>
</manifest>"#,
        )
        .unwrap();
        let lib = AndroidManifest::parse(LIB_A).unwrap();
        let (merged, _) =
            merge_manifests(&source("main", &main), &[source("lib", &lib)], &ManifestPolicy::default())
                .unwrap();
        assert!(!merged.root.elements().any(|e| e.name == "uses-permission"));
        let application = merged
            .root
            .elements()
            .find(|e| e.name == "application")
            .unwrap();
        assert!(application.elements().any(|e| e.name == "activity"));
        assert!(merged.root.attr("xmlns:tools").is_none());
    }

    #[test]
    fn test_attribute_conflict_names_the_library_that_set_it() {
        let main = AndroidManifest::parse(
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.acme.sdk">
    <application>
        <meta-data android:name="com.acme.K"/>
    </application>
</manifest>"#,
        )
        .unwrap();
        let lib_a = AndroidManifest::parse(
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="a">
    <application><meta-data android:name="com.acme.K" android:value="a"/></application>
</manifest>"#,
        )
        .unwrap();
        let lib_b = AndroidManifest::parse(
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="b">
    <application><meta-data android:name="com.acme.K" android:value="b"/></application>
</manifest>"#,
        )
        .unwrap();
        let libraries = [source("a", &lib_a), source("b", &lib_b)];

        let (_, conflicts) =
            merge_manifests(&source("main", &main), &libraries, &ManifestPolicy::default())
                .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].contenders, vec!["a", "b"]);

        let strict = ManifestPolicy {
            strict_library_meta_data: true,
        };
        let err = merge_manifests(&source("main", &main), &libraries, &strict).unwrap_err();
        match err {
            FatAarError::ManifestConflict { first, second, .. } => {
                assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
