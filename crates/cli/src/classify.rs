use fataar_core::classify::Classification;
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "#")]
    priority: usize,
    #[tabled(rename = "Dependency")]
    coordinate: String,
    #[tabled(rename = "Class")]
    classification: String,
    #[tabled(rename = "Direct")]
    direct: bool,
    #[tabled(rename = "Scope")]
    scope: String,
}

pub fn run(config: &Path, deps: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (config, declarations) = super::load_inputs(config, deps)?;
    let dag = fataar_core::classify(&declarations, &config)?;

    let rows: Vec<NodeRow> = dag
        .nodes()
        .enumerate()
        .map(|(i, node)| NodeRow {
            priority: i,
            coordinate: node.coordinate.to_string(),
            classification: node.classification.to_string(),
            direct: node.direct,
            scope: match node.classification {
                Classification::Embed => "-".to_string(),
                Classification::Passthrough => node.scope.as_str().to_string(),
            },
        })
        .collect();

    if rows.is_empty() {
        println!("No dependencies declared.");
        return Ok(());
    }
    println!("{}", Table::new(rows).with(Style::psql()));

    println!(
        "{} embedded, {} published as dependencies",
        dag.embedded().len(),
        dag.passthrough().len()
    );
    Ok(())
}
