#![allow(dead_code)]

use fataar_core::classify::DependencyDeclaration;
use fataar_core::{Coordinate, FatAarConfig};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// Minimal class file declaring `internal_name` (e.g. `com/acme/Util`) as a
/// subclass of `java/lang/Object`. Different `access_flags` give different
/// bytes for the same name.
pub fn class_bytes(internal_name: &str, access_flags: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);
    out.extend_from_slice(&0u16.to_be_bytes()); // minor
    out.extend_from_slice(&52u16.to_be_bytes()); // major, Java 8
    out.extend_from_slice(&5u16.to_be_bytes()); // constant pool count

    push_utf8(&mut out, internal_name); // #1
    out.push(7); // #2 Class -> #1
    out.extend_from_slice(&1u16.to_be_bytes());
    push_utf8(&mut out, "java/lang/Object"); // #3
    out.push(7); // #4 Class -> #3
    out.extend_from_slice(&3u16.to_be_bytes());

    out.extend_from_slice(&access_flags.to_be_bytes());
    out.extend_from_slice(&2u16.to_be_bytes()); // this_class
    out.extend_from_slice(&4u16.to_be_bytes()); // super_class
    out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
    out.extend_from_slice(&0u16.to_be_bytes()); // fields
    out.extend_from_slice(&0u16.to_be_bytes()); // methods
    out.extend_from_slice(&0u16.to_be_bytes()); // attributes
    out
}

fn push_utf8(out: &mut Vec<u8>, s: &str) {
    out.push(1);
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn zip_into<W: Write + std::io::Seek>(sink: W, entries: &[(String, Vec<u8>)]) -> W {
    let mut zip = ZipWriter::new(sink);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap()
}

/// Jar holding one class per `(internal name, access flags)`.
pub fn jar(classes: &[(&str, u16)]) -> Vec<u8> {
    let entries: Vec<(String, Vec<u8>)> = classes
        .iter()
        .map(|(name, flags)| (format!("{name}.class"), class_bytes(name, *flags)))
        .collect();
    zip_into(Cursor::new(Vec::new()), &entries).into_inner()
}

/// Builds an AAR (or a plain jar when no manifest is set) on disk.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn aar(package: &str, min_sdk: u32) -> Self {
        let manifest = format!(
            r#"<manifest xmlns:android="{ANDROID_NS}" package="{package}">
    <uses-sdk android:minSdkVersion="{min_sdk}"/>
</manifest>"#
        );
        Self::default().entry("AndroidManifest.xml", manifest)
    }

    pub fn manifest(self, xml: &str) -> Self {
        let mut this = self;
        this.entries.retain(|(n, _)| n != "AndroidManifest.xml");
        this.entry("AndroidManifest.xml", xml)
    }

    pub fn entry(mut self, name: &str, content: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), content.into()));
        self
    }

    pub fn classes(self, classes: &[(&str, u16)]) -> Self {
        self.entry("classes.jar", jar(classes))
    }

    pub fn strings(self, folder: &str, strings: &[(&str, &str)]) -> Self {
        let mut xml = String::from("<resources>\n");
        for (name, value) in strings {
            xml.push_str(&format!("    <string name=\"{name}\">{value}</string>\n"));
        }
        xml.push_str("</resources>\n");
        self.entry(&format!("res/{folder}/strings.xml"), xml)
    }

    pub fn write(self, path: &Path) -> PathBuf {
        let file = File::create(path).unwrap();
        zip_into(file, &self.entries);
        path.to_path_buf()
    }
}

pub fn coordinate(s: &str) -> Coordinate {
    s.parse().unwrap()
}

pub fn embed(coordinate_str: &str, archive: &Path) -> DependencyDeclaration {
    DependencyDeclaration::new(coordinate(coordinate_str))
        .direct("embed")
        .archive(archive)
}

pub fn config(work_dir: &Path) -> FatAarConfig {
    let mut config = FatAarConfig::new(coordinate("com.acme:sdk:1.0.0"));
    config.work_dir = Some(work_dir.to_path_buf());
    config
}

pub fn main_manifest(dir: &Path) -> PathBuf {
    let path = dir.join("AndroidManifest.xml");
    fs::write(
        &path,
        format!(
            r#"<manifest xmlns:android="{ANDROID_NS}" package="com.acme.sdk">
    <uses-sdk android:minSdkVersion="21" android:targetSdkVersion="34"/>
    <application/>
</manifest>"#
        ),
    )
    .unwrap();
    path
}

/// Entries left in a directory, used to check that scratch space is gone.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
