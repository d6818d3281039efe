mod classify;
mod merge;

use clap::{Parser, Subcommand};
use fataar_core::classify::DependencyDeclaration;
use fataar_core::{FatAarConfig, FatAarError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "fataar",
    version,
    about = "Merges embedded Android library artifacts into one AAR",
    long_about = "fataar classifies a module's dependencies into embedded and pass-through \
                  artifacts, merges the classes, manifests, resources, native libraries and \
                  assets of every embedded artifact, and packages the result as a single AAR \
                  with a POM that lists only the pass-through dependencies."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show how each dependency is classified
    Classify {
        /// Engine configuration (JSON)
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
        /// Resolved dependency list (JSON array)
        #[arg(long, value_name = "DEPS")]
        deps: PathBuf,
    },
    /// Merge embedded dependencies and package the result
    #[command(
        long_about = "Runs classification, extraction, merging and packaging. Writes \
                      <name>-<version>.aar and <name>-<version>.pom into the output directory."
    )]
    Merge {
        /// Engine configuration (JSON)
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,
        /// Resolved dependency list (JSON array)
        #[arg(long, value_name = "DEPS")]
        deps: PathBuf,
        /// The module's own AndroidManifest.xml
        #[arg(long, value_name = "MANIFEST")]
        manifest: PathBuf,
        /// The module's own compiled AAR, merged with the highest priority
        #[arg(long, value_name = "AAR")]
        primary: Option<PathBuf>,
        /// Output directory
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let component = match &cli.command {
        Commands::Classify { .. } => "classify",
        Commands::Merge { .. } => "merge",
    };
    let _guard = fataar_core::logging::init_logging(component, true)?;

    match cli.command {
        Commands::Classify { config, deps } => classify::run(&config, &deps),
        Commands::Merge {
            config,
            deps,
            manifest,
            primary,
            out,
        } => merge::run(&config, &deps, &manifest, primary.as_deref(), &out),
    }
}

/// Prefix for an error reported at exit, naming its category when the
/// engine raised it.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<FatAarError>() {
        Some(engine) => format!("{}: {engine}", engine.category()),
        None => format!("error: {err}"),
    }
}

fn load_inputs(
    config: &Path,
    deps: &Path,
) -> Result<(FatAarConfig, Vec<DependencyDeclaration>), FatAarError> {
    let config = FatAarConfig::load(config)?;
    let content = std::fs::read_to_string(deps)
        .map_err(|e| FatAarError::Config(format!("{}: {e}", deps.display())))?;
    let declarations: Vec<DependencyDeclaration> = serde_json::from_str(&content)?;
    Ok((config, declarations))
}
