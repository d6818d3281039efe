//! Packaging of a [`MergedOutput`] into `<name>-<version>.aar` plus its POM.
//!
//! Archives are reproducible: entries are sorted, timestamps are fixed to
//! the zip epoch and every entry is deflated. Both files are staged as
//! temporary files next to their destination and only renamed into place
//! once fully written.

use crate::classify::DependencyNode;
use crate::error::{FatAarError, Result};
use crate::model::{CodeUnit, MergedOutput};
use crate::resource::{ResourceEntry, write_values};
use crate::xml::{self, XmlElement, XmlNode};
use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const JAR_MANIFEST: &str = "Manifest-Version: 1.0\r\nCreated-By: fataar\r\n\r\n";

/// Files produced by [`package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArtifact {
    pub aar: PathBuf,
    pub pom: PathBuf,
}

enum Payload {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Writes the final archive and POM into `out_dir`. The POM declares only
/// `passthrough` dependencies.
pub fn package(
    output: MergedOutput,
    passthrough: &[&DependencyNode],
    out_dir: &Path,
) -> Result<PackagedArtifact> {
    let base = format!("{}-{}", output.module.name, output.module.version);
    let aar_path = out_dir.join(format!("{base}.aar"));
    let pom_path = out_dir.join(format!("{base}.pom"));

    fs::create_dir_all(out_dir).map_err(|source| FatAarError::Packaging {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let aar_tmp = write_staged(out_dir, |file| write_aar(&output, file))
        .map_err(|source| packaging(&aar_path, source))?;
    let pom = pom_document(&output, passthrough).map_err(|source| packaging(&pom_path, source))?;
    let pom_tmp = write_staged(out_dir, |file| file.write_all(pom.as_bytes()))
        .map_err(|source| packaging(&pom_path, source))?;

    aar_tmp
        .persist(&aar_path)
        .map_err(|e| packaging(&aar_path, e.error))?;
    if let Err(e) = pom_tmp.persist(&pom_path) {
        let _ = fs::remove_file(&aar_path);
        return Err(packaging(&pom_path, e.error));
    }

    info!("Packaged {} and {}", aar_path.display(), pom_path.display());
    Ok(PackagedArtifact {
        aar: aar_path,
        pom: pom_path,
    })
}

fn packaging(path: &Path, source: io::Error) -> FatAarError {
    FatAarError::Packaging {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes into a temporary file in `dir`. The file is deleted on drop unless
/// persisted.
fn write_staged(
    dir: &Path,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".fataar-")
        .suffix(".part")
        .tempfile_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all()?;
    Ok(tmp)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

fn write_zip<W: Write + io::Seek>(sink: W, mut entries: Vec<(String, Payload)>) -> io::Result<W> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut zip = ZipWriter::new(sink);
    let options = entry_options();
    for (name, payload) in entries {
        zip.start_file(name, options).map_err(io::Error::other)?;
        match payload {
            Payload::Bytes(bytes) => zip.write_all(&bytes)?,
            Payload::File(path) => {
                let mut file = File::open(&path)?;
                io::copy(&mut file, &mut zip)?;
            }
        }
    }
    zip.finish().map_err(io::Error::other)
}

fn write_aar(output: &MergedOutput, file: &mut File) -> io::Result<()> {
    let mut entries: Vec<(String, Payload)> = Vec::new();

    let manifest = output.manifest.to_xml().map_err(io::Error::other)?;
    entries.push(("AndroidManifest.xml".into(), Payload::Bytes(manifest.into_bytes())));
    entries.push(("classes.jar".into(), Payload::Bytes(build_classes_jar(&output.code)?)));

    for (folder, elements) in output.resources.values_by_folder() {
        let xml = write_values(&output.resources.namespaces, elements).map_err(io::Error::other)?;
        entries.push((format!("res/{folder}/values.xml"), Payload::Bytes(xml.into_bytes())));
    }
    for entry in output.resources.entries.values() {
        if let ResourceEntry::File {
            relative_path,
            file,
        } = entry
        {
            entries.push((format!("res/{relative_path}"), Payload::File(file.path.clone())));
        }
    }
    // Library bundles always carry R.txt, even when empty.
    entries.push((
        "R.txt".into(),
        Payload::Bytes(output.resources.symbols.to_text().into_bytes()),
    ));
    if !output.resources.public.is_empty() {
        let mut public = String::new();
        for line in &output.resources.public {
            public.push_str(line);
            public.push('\n');
        }
        entries.push(("public.txt".into(), Payload::Bytes(public.into_bytes())));
    }

    for (abi, files) in &output.native_libs {
        for (path, file) in files {
            entries.push((format!("jni/{abi}/{path}"), Payload::File(file.path.clone())));
        }
    }
    for (path, file) in &output.assets {
        entries.push((format!("assets/{path}"), Payload::File(file.path.clone())));
    }
    if !output.proguard_rules.is_empty() {
        entries.push((
            "proguard.txt".into(),
            Payload::Bytes(output.proguard_rules.clone().into_bytes()),
        ));
    }

    write_zip(file, entries)?;
    Ok(())
}

/// Builds `classes.jar` in memory.
pub(crate) fn build_classes_jar(code: &CodeUnit) -> io::Result<Vec<u8>> {
    let mut entries: Vec<(String, Payload)> = Vec::with_capacity(code.classes.len() + 1);
    entries.push((
        "META-INF/MANIFEST.MF".into(),
        Payload::Bytes(JAR_MANIFEST.as_bytes().to_vec()),
    ));
    for class in code.classes.values() {
        entries.push((class.entry_name(), Payload::Bytes(class.bytes.clone())));
    }
    for (path, bytes) in &code.java_resources {
        entries.push((path.clone(), Payload::Bytes(bytes.clone())));
    }
    let cursor = write_zip(Cursor::new(Vec::new()), entries)?;
    Ok(cursor.into_inner())
}

fn text_element(name: &str, text: &str) -> XmlElement {
    let mut element = XmlElement::new(name);
    element.children.push(XmlNode::Text(text.to_string()));
    element
}

fn pom_document(output: &MergedOutput, passthrough: &[&DependencyNode]) -> io::Result<String> {
    let module = &output.module;
    let mut project = XmlElement::new("project");
    project.set_attr("xmlns", "http://maven.apache.org/POM/4.0.0");
    project.set_attr("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance");
    project.set_attr(
        "xsi:schemaLocation",
        "http://maven.apache.org/POM/4.0.0 https://maven.apache.org/xsd/maven-4.0.0.xsd",
    );
    project.push_element(text_element("modelVersion", "4.0.0"));
    project.push_element(text_element("groupId", &module.group));
    project.push_element(text_element("artifactId", &module.name));
    project.push_element(text_element("version", &module.version));
    project.push_element(text_element("packaging", "aar"));

    if !passthrough.is_empty() {
        let mut dependencies = XmlElement::new("dependencies");
        for node in passthrough {
            let mut dependency = XmlElement::new("dependency");
            dependency.push_element(text_element("groupId", &node.coordinate.group));
            dependency.push_element(text_element("artifactId", &node.coordinate.name));
            dependency.push_element(text_element("version", &node.coordinate.version));
            dependency.push_element(text_element("scope", node.scope.as_str()));
            dependencies.push_element(dependency);
        }
        project.push_element(dependencies);
    }

    xml::write_document(&project).map_err(io::Error::other)
}
