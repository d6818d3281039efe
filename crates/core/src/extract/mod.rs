//! Artifact extraction.
//!
//! Every run owns one `ExtractionWorkspace`, a temporary directory that is
//! removed when the workspace is dropped, whether the run succeeded or not.
//! Each EMBED node's archive is unpacked into its own subdirectory and read
//! into an [`EmbeddableArtifact`].

mod classfile;

use crate::classify::{DeclaredMetadata, DependencyNode};
use crate::error::{FatAarError, Result};
use crate::manifest::AndroidManifest;
use crate::model::{
    ArtifactKind, CodeUnit, Coordinate, EmbeddableArtifact, FileEntry, NativeLibs,
};
use crate::resource::ResourceSet;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;
use zip::ZipArchive;

/// Top-level AAR entries the engine reads.
const KNOWN_AAR_ENTRIES: &[&str] = &[
    "AndroidManifest.xml",
    "classes.jar",
    "libs",
    "res",
    "R.txt",
    "public.txt",
    "jni",
    "assets",
    "proguard.txt",
];

/// Scoped temporary area for one merge run.
#[derive(Debug)]
pub struct ExtractionWorkspace {
    dir: TempDir,
}

impl ExtractionWorkspace {
    /// Creates the area under `parent`, or the system temp dir.
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fataar-");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!("Extraction workspace at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// One directory level per artifact, named by a digest of its coordinate
    /// so no coordinate text reaches the path.
    fn artifact_dir(&self, coordinate: &Coordinate) -> PathBuf {
        let digest = xxh3_64(coordinate.to_string().as_bytes());
        self.dir.path().join(format!("{digest:016x}"))
    }

    /// Unpacks the archive of an EMBED node.
    pub fn extract(&self, node: &DependencyNode) -> Result<EmbeddableArtifact> {
        let archive = node
            .archive
            .as_deref()
            .ok_or_else(|| FatAarError::MissingArchive {
                coordinate: node.coordinate.to_string(),
            })?;
        self.extract_archive(&node.coordinate, archive, node.metadata)
    }

    pub fn extract_archive(
        &self,
        coordinate: &Coordinate,
        archive: &Path,
        declared: DeclaredMetadata,
    ) -> Result<EmbeddableArtifact> {
        let dest = self.artifact_dir(coordinate);
        let result = extract_into(coordinate, archive, &dest, declared);
        if result.is_err() {
            // The workspace is removed on drop; this only frees space early.
            let _ = fs::remove_dir_all(&dest);
        }
        result
    }
}

fn extract_into(
    coordinate: &Coordinate,
    archive_path: &Path,
    dest: &Path,
    declared: DeclaredMetadata,
) -> Result<EmbeddableArtifact> {
    let file = File::open(archive_path).map_err(|e| {
        FatAarError::corrupt(coordinate, format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| FatAarError::corrupt(coordinate, format!("not a zip archive: {e}")))?;

    let is_aar = archive.by_name("AndroidManifest.xml").is_ok();
    if !is_aar {
        return read_plain_jar(coordinate, &mut archive, dest, declared);
    }

    unpack(coordinate, &mut archive, dest)?;
    let artifact = read_aar(coordinate, dest, declared)?;
    info!(
        "Extracted {} ({} classes, {} resources, {} native ABIs, {} assets)",
        coordinate,
        artifact.code.classes.len(),
        artifact.resources.entries.len(),
        artifact.native_libs.len(),
        artifact.assets.len()
    );
    Ok(artifact)
}

fn read_plain_jar(
    coordinate: &Coordinate,
    archive: &mut ZipArchive<File>,
    dest: &Path,
    declared: DeclaredMetadata,
) -> Result<EmbeddableArtifact> {
    let mut code = CodeUnit::default();
    classfile::read_jar(archive, "jar", &mut code)
        .map_err(|reason| FatAarError::corrupt(coordinate, reason))?;
    if code.is_empty() {
        return Err(FatAarError::corrupt(
            coordinate,
            "archive has neither AndroidManifest.xml nor jar content",
        ));
    }
    info!("Read {} ({} classes)", coordinate, code.classes.len());

    Ok(EmbeddableArtifact {
        coordinate: coordinate.clone(),
        kind: ArtifactKind::Jar,
        root: dest.to_path_buf(),
        manifest: None,
        code,
        resources: ResourceSet::default(),
        native_libs: NativeLibs::new(),
        assets: BTreeMap::new(),
        proguard_rules: None,
        declared,
    })
}

fn unpack(coordinate: &Coordinate, archive: &mut ZipArchive<File>, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FatAarError::corrupt(coordinate, format!("unreadable entry #{i}: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FatAarError::corrupt(
                coordinate,
                format!("entry '{}' escapes the extraction root", entry.name()),
            ));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            FatAarError::corrupt(coordinate, format!("cannot inflate '{}': {e}", entry.name()))
        })?;
    }
    Ok(())
}

fn read_aar(
    coordinate: &Coordinate,
    root: &Path,
    declared: DeclaredMetadata,
) -> Result<EmbeddableArtifact> {
    log_unknown_entries(coordinate, root);

    let manifest_text = fs::read_to_string(root.join("AndroidManifest.xml"))
        .map_err(|e| FatAarError::corrupt(coordinate, format!("AndroidManifest.xml: {e}")))?;
    let manifest = AndroidManifest::parse(&manifest_text)
        .map_err(|e| FatAarError::corrupt(coordinate, format!("AndroidManifest.xml: {e}")))?;

    let code = read_code(coordinate, root)?;

    let res_dir = root.join("res");
    let r_txt = root.join("R.txt");
    let public_txt = root.join("public.txt");
    let resources = ResourceSet::load(
        res_dir.is_dir().then_some(res_dir.as_path()),
        r_txt.is_file().then_some(r_txt.as_path()),
        public_txt.is_file().then_some(public_txt.as_path()),
    )
    .map_err(|reason| FatAarError::corrupt(coordinate, reason))?;

    let native_libs = read_native_libs(&root.join("jni"))?;
    let assets = read_tree(&root.join("assets"))?;

    let proguard = root.join("proguard.txt");
    let proguard_rules = if proguard.is_file() {
        Some(fs::read_to_string(&proguard)?)
    } else {
        None
    };

    Ok(EmbeddableArtifact {
        coordinate: coordinate.clone(),
        kind: ArtifactKind::Aar,
        root: root.to_path_buf(),
        manifest: Some(manifest),
        code,
        resources,
        native_libs,
        assets,
        proguard_rules,
        declared,
    })
}

fn log_unknown_entries(coordinate: &Coordinate, root: &Path) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !KNOWN_AAR_ENTRIES.contains(&name.as_str()) {
            debug!("{}: ignoring {}", coordinate, name);
        }
    }
}

/// `classes.jar` followed by `libs/*.jar` in name order.
fn read_code(coordinate: &Coordinate, root: &Path) -> Result<CodeUnit> {
    let mut jars: Vec<(String, PathBuf)> = Vec::new();
    let classes_jar = root.join("classes.jar");
    if classes_jar.is_file() {
        jars.push(("classes.jar".to_string(), classes_jar));
    }
    let libs = root.join("libs");
    if libs.is_dir() {
        let mut extra: Vec<PathBuf> = fs::read_dir(&libs)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("jar"))
            .collect();
        extra.sort();
        for path in extra {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            jars.push((format!("libs/{name}"), path.clone()));
        }
    }

    let mut code = CodeUnit::default();
    for (origin, path) in jars {
        let mut bytes = Vec::new();
        File::open(&path)?.read_to_end(&mut bytes)?;
        let mut archive = ZipArchive::new(io::Cursor::new(bytes))
            .map_err(|e| FatAarError::corrupt(coordinate, format!("{origin}: {e}")))?;
        classfile::read_jar(&mut archive, &origin, &mut code)
            .map_err(|reason| FatAarError::corrupt(coordinate, reason))?;
    }
    Ok(code)
}

fn read_native_libs(jni: &Path) -> Result<NativeLibs> {
    let mut libs = NativeLibs::new();
    if !jni.is_dir() {
        return Ok(libs);
    }
    for entry in fs::read_dir(jni)?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let abi = entry.file_name().to_string_lossy().into_owned();
        let files = read_tree(&path)?;
        if !files.is_empty() {
            libs.insert(abi, files);
        }
    }
    Ok(libs)
}

/// Every regular file below `dir`, keyed by its `/`-separated relative path.
fn read_tree(dir: &Path) -> Result<BTreeMap<String, FileEntry>> {
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(key, FileEntry::from_path(entry.path())?);
    }
    Ok(out)
}
