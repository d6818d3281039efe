//! The merge run: extraction of every EMBED node followed by the four
//! category mergers.

pub(crate) mod classes;
mod files;
mod manifest;
mod resources;

pub use classes::merge_code;
pub use files::{merge_assets, merge_native_libs};
pub use manifest::{ManifestSource, merge_manifests};
pub use resources::merge_resources;

use crate::classify::{DeclaredMetadata, DependencyDag};
use crate::config::FatAarConfig;
use crate::error::{FatAarError, Result};
use crate::extract::ExtractionWorkspace;
use crate::manifest::AndroidManifest;
use crate::model::{EmbeddableArtifact, MergedOutput};
use rayon::prelude::*;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Runs one merge per call. Holds no state between runs.
pub struct Merger<'c> {
    config: &'c FatAarConfig,
    primary: Option<PathBuf>,
}

impl<'c> Merger<'c> {
    pub fn new(config: &'c FatAarConfig) -> Self {
        Self {
            config,
            primary: None,
        }
    }

    /// The consuming module's own compiled bundle, merged with the highest
    /// priority ahead of every EMBED node.
    pub fn with_primary(mut self, archive: impl Into<PathBuf>) -> Self {
        self.primary = Some(archive.into());
        self
    }

    pub fn merge(&self, dag: &DependencyDag, main_manifest: &Path) -> Result<MergedOutput> {
        let start = Instant::now();
        let main = read_main_manifest(main_manifest)?;
        let workspace = ExtractionWorkspace::new(self.config.work_dir.as_deref())?;

        let embedded = dag.embedded();
        info!("Extracting {} embedded artifacts", embedded.len());
        let extracted: Vec<EmbeddableArtifact> = embedded
            .par_iter()
            .map(|node| workspace.extract(node))
            .collect::<Result<_>>()?;

        let primary = match &self.primary {
            Some(path) => Some(workspace.extract_archive(&self.config.module, path, DeclaredMetadata::default())?),
            None => None,
        };
        let artifacts: Vec<&EmbeddableArtifact> =
            primary.iter().chain(extracted.iter()).collect();

        let module_label = self.config.module.to_string();
        let main_source = ManifestSource {
            label: module_label,
            manifest: &main,
            declared: DeclaredMetadata::default(),
        };
        let library_manifests: Vec<ManifestSource<'_>> = artifacts
            .iter()
            .filter_map(|a| {
                a.manifest.as_ref().map(|manifest| ManifestSource {
                    label: a.coordinate.to_string(),
                    manifest,
                    declared: a.declared,
                })
            })
            .collect();
        let resource_sets: Vec<_> = artifacts
            .iter()
            .map(|a| (a.coordinate.to_string(), &a.resources))
            .collect();
        let native_trees: Vec<_> = artifacts
            .iter()
            .map(|a| (a.coordinate.to_string(), &a.native_libs))
            .collect();
        let asset_trees: Vec<_> = artifacts
            .iter()
            .map(|a| (a.coordinate.to_string(), &a.assets))
            .collect();

        info!("Merging {} artifacts", artifacts.len());
        let ((code, manifest), (resources, (native_libs, assets))) = rayon::join(
            || {
                rayon::join(
                    || merge_code(&artifacts),
                    || merge_manifests(&main_source, &library_manifests, &self.config.manifest),
                )
            },
            || {
                rayon::join(
                    || merge_resources(&resource_sets, &self.config.resources),
                    || rayon::join(|| merge_native_libs(&native_trees), || merge_assets(&asset_trees)),
                )
            },
        );
        let (code, mut conflicts) = code?;
        let (manifest, manifest_conflicts) = manifest?;
        let (resources, resource_conflicts) = resources?;
        let (native_libs, native_conflicts) = native_libs?;
        let (assets, asset_conflicts) = assets?;
        conflicts.extend(manifest_conflicts);
        conflicts.extend(resource_conflicts);
        conflicts.extend(native_conflicts);
        conflicts.extend(asset_conflicts);

        let proguard_rules = concat_proguard_rules(&artifacts);

        info!(
            "Merged {} classes, {} resources, {} assets in {:?} ({} resolved collisions)",
            code.classes.len(),
            resources.entries.len(),
            assets.len(),
            start.elapsed(),
            conflicts.len()
        );

        Ok(MergedOutput {
            module: self.config.module.clone(),
            manifest,
            code,
            resources,
            native_libs,
            assets,
            proguard_rules,
            conflicts,
            workspace,
        })
    }
}

/// `merge(DAG, mainManifest)` without a primary bundle.
pub fn merge(
    dag: &DependencyDag,
    main_manifest: &Path,
    config: &FatAarConfig,
) -> Result<MergedOutput> {
    Merger::new(config).merge(dag, main_manifest)
}

fn read_main_manifest(path: &Path) -> Result<AndroidManifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FatAarError::Config(format!("main manifest {}: {e}", path.display())))?;
    AndroidManifest::parse(&content)
        .map_err(|e| FatAarError::Config(format!("main manifest {}: {e}", path.display())))
}

fn concat_proguard_rules(artifacts: &[&EmbeddableArtifact]) -> String {
    let mut out = String::new();
    for artifact in artifacts {
        let Some(rules) = artifact.proguard_rules.as_deref() else {
            continue;
        };
        if rules.trim().is_empty() {
            continue;
        }
        let _ = writeln!(out, "# from {}", artifact.coordinate);
        out.push_str(rules);
        if !rules.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
