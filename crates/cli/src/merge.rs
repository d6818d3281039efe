use fataar_core::{Merger, package};
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};
use tracing::info;

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Contenders")]
    contenders: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
}

pub fn run(
    config: &Path,
    deps: &Path,
    manifest: &Path,
    primary: Option<&Path>,
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config, declarations) = super::load_inputs(config, deps)?;
    let dag = fataar_core::classify(&declarations, &config)?;

    let mut merger = Merger::new(&config);
    if let Some(primary) = primary {
        merger = merger.with_primary(primary);
    }
    let output = merger.merge(&dag, manifest)?;

    let rows: Vec<ConflictRow> = output
        .conflicts
        .iter()
        .map(|c| ConflictRow {
            kind: c.kind.to_string(),
            key: c.key.clone(),
            contenders: c.contenders.join(" > "),
            resolution: c.resolution.to_string(),
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", Table::new(rows).with(Style::psql()));
    }

    let passthrough = dag.passthrough();
    let packaged = package(output, &passthrough, out)?;
    info!("Merge complete");
    println!("AAR: {}", packaged.aar.display());
    println!("POM: {}", packaged.pom.display());
    Ok(())
}
