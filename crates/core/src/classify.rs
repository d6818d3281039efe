//! Dependency classification.
//!
//! Builds the dependency DAG from the host's declarations and tags every node
//! as EMBED (physically merged) or PASSTHROUGH (kept as an ordinary
//! dependency of the output). All configuration errors are raised here,
//! before anything is extracted.

use crate::config::FatAarConfig;
use crate::error::{FatAarError, Result};
use crate::model::Coordinate;
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Scope a pass-through dependency is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PomScope {
    #[default]
    Compile,
    Runtime,
}

impl PomScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomScope::Compile => "compile",
            PomScope::Runtime => "runtime",
        }
    }
}

/// Metadata the host declares for a dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredMetadata {
    #[serde(default)]
    pub min_sdk: Option<u32>,
    #[serde(default)]
    pub target_sdk: Option<u32>,
}

/// One resolved dependency as handed over by the host build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyDeclaration {
    pub coordinate: Coordinate,
    /// Configurations declaring it directly; empty for transitive dependencies.
    #[serde(default)]
    pub configurations: Vec<String>,
    /// Coordinates this dependency depends on.
    #[serde(default)]
    pub requires: Vec<Coordinate>,
    #[serde(default)]
    pub archive: Option<PathBuf>,
    #[serde(default)]
    pub scope: PomScope,
    #[serde(default)]
    pub metadata: DeclaredMetadata,
}

impl DependencyDeclaration {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            configurations: Vec::new(),
            requires: Vec::new(),
            archive: None,
            scope: PomScope::default(),
            metadata: DeclaredMetadata::default(),
        }
    }

    pub fn direct(mut self, configuration: &str) -> Self {
        self.configurations.push(configuration.to_string());
        self
    }

    pub fn requires(mut self, coordinate: Coordinate) -> Self {
        self.requires.push(coordinate);
        self
    }

    pub fn archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Embed,
    Passthrough,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Embed => f.write_str("EMBED"),
            Classification::Passthrough => f.write_str("PASSTHROUGH"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub coordinate: Coordinate,
    pub classification: Classification,
    pub direct: bool,
    pub archive: Option<PathBuf>,
    pub scope: PomScope,
    pub metadata: DeclaredMetadata,
}

/// Classified dependency graph. Edges point from a dependency to what it
/// requires.
#[derive(Debug)]
pub struct DependencyDag {
    graph: DiGraph<DependencyNode, ()>,
    index: HashMap<Coordinate, NodeIndex>,
    /// Every node in DAG priority order.
    order: Vec<NodeIndex>,
}

impl DependencyDag {
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All nodes in DAG priority order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.order.iter().map(|idx| &self.graph[*idx])
    }

    pub fn node(&self, coordinate: &Coordinate) -> Option<&DependencyNode> {
        self.index.get(coordinate).map(|idx| &self.graph[*idx])
    }

    /// Position in DAG priority order; lower wins ties.
    pub fn priority(&self, coordinate: &Coordinate) -> Option<usize> {
        let idx = self.index.get(coordinate)?;
        self.order.iter().position(|i| i == idx)
    }

    /// EMBED nodes, highest priority first.
    pub fn embedded(&self) -> Vec<&DependencyNode> {
        self.nodes()
            .filter(|n| n.classification == Classification::Embed)
            .collect()
    }

    /// PASSTHROUGH nodes the output artifact must declare: direct
    /// dependencies of the module and direct dependencies of embedded nodes.
    /// Deeper pass-through nodes are reached through these.
    pub fn passthrough(&self) -> Vec<&DependencyNode> {
        self.order
            .iter()
            .filter(|idx| self.graph[**idx].classification == Classification::Passthrough)
            .filter(|idx| {
                self.graph[**idx].direct
                    || self
                        .graph
                        .neighbors_directed(**idx, Direction::Incoming)
                        .any(|p| self.graph[p].classification == Classification::Embed)
            })
            .map(|idx| &self.graph[*idx])
            .collect()
    }
}

/// Classifies the module's dependencies into EMBED and PASSTHROUGH nodes.
pub fn classify(
    declarations: &[DependencyDeclaration],
    config: &FatAarConfig,
) -> Result<DependencyDag> {
    let declarations = coalesce(declarations);

    let mut graph: DiGraph<DependencyNode, ()> = DiGraph::new();
    let mut index: HashMap<Coordinate, NodeIndex> = HashMap::new();
    for decl in declarations.values() {
        let idx = graph.add_node(DependencyNode {
            coordinate: decl.coordinate.clone(),
            classification: Classification::Passthrough,
            direct: !decl.configurations.is_empty(),
            archive: decl.archive.clone(),
            scope: decl.scope,
            metadata: decl.metadata.clone(),
        });
        index.insert(decl.coordinate.clone(), idx);
    }

    for decl in declarations.values() {
        let from = index[&decl.coordinate];
        for required in &decl.requires {
            let to = index
                .get(required)
                .ok_or_else(|| FatAarError::UnknownDependency {
                    from: decl.coordinate.to_string(),
                    missing: required.to_string(),
                })?;
            if !graph.contains_edge(from, *to) {
                graph.add_edge(from, *to, ());
            }
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        return Err(FatAarError::CyclicDependency {
            cycle: describe_cycle(&graph, cycle.node_id()),
        });
    }

    let roots: Vec<NodeIndex> = declarations
        .values()
        .filter(|d| d.configurations.iter().any(|c| config.is_embed_configuration(c)))
        .map(|d| index[&d.coordinate])
        .filter(|idx| !config.is_excluded(&graph[*idx].coordinate))
        .collect();

    for idx in embed_closure(&graph, &roots, config) {
        graph[idx].classification = Classification::Embed;
    }

    check_versions(&graph)?;
    for node in graph.node_weights() {
        if node.classification == Classification::Embed && node.archive.is_none() {
            return Err(FatAarError::MissingArchive {
                coordinate: node.coordinate.to_string(),
            });
        }
    }

    let order = priority_order(&graph);
    let dag = DependencyDag {
        graph,
        index,
        order,
    };

    info!(
        "Classified {} dependencies: {} embedded, {} pass-through",
        dag.len(),
        dag.embedded().len(),
        dag.passthrough().len()
    );
    Ok(dag)
}

/// Collapses repeated declarations of one coordinate into a single entry.
fn coalesce(declarations: &[DependencyDeclaration]) -> BTreeMap<Coordinate, DependencyDeclaration> {
    let mut out: BTreeMap<Coordinate, DependencyDeclaration> = BTreeMap::new();
    for decl in declarations {
        match out.get_mut(&decl.coordinate) {
            Some(existing) => {
                for c in &decl.configurations {
                    if !existing.configurations.contains(c) {
                        existing.configurations.push(c.clone());
                    }
                }
                for r in &decl.requires {
                    if !existing.requires.contains(r) {
                        existing.requires.push(r.clone());
                    }
                }
                if existing.archive.is_none() {
                    existing.archive = decl.archive.clone();
                }
            }
            None => {
                out.insert(decl.coordinate.clone(), decl.clone());
            }
        }
    }
    out
}

fn embed_closure(
    graph: &DiGraph<DependencyNode, ()>,
    roots: &[NodeIndex],
    config: &FatAarConfig,
) -> HashSet<NodeIndex> {
    let mut marked: HashSet<NodeIndex> = roots.iter().copied().collect();
    if !config.transitive {
        return marked;
    }

    let mut queue: VecDeque<NodeIndex> = roots.iter().copied().collect();
    while let Some(idx) = queue.pop_front() {
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            if config.is_excluded(&graph[next].coordinate) {
                debug!("Not embedding excluded {}", graph[next].coordinate);
                continue;
            }
            if marked.insert(next) {
                queue.push_back(next);
            }
        }
    }
    marked
}

fn check_versions(graph: &DiGraph<DependencyNode, ()>) -> Result<()> {
    let mut by_key: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for node in graph.node_weights() {
        if node.classification == Classification::Embed {
            by_key
                .entry(node.coordinate.key())
                .or_default()
                .insert(node.coordinate.version.clone());
        }
    }
    match by_key.into_iter().find(|(_, versions)| versions.len() > 1) {
        Some((key, versions)) => Err(FatAarError::AmbiguousVersion {
            key,
            versions: versions.into_iter().collect(),
        }),
        None => Ok(()),
    }
}

/// Kahn's algorithm where ready nodes are taken in `group:name` order, so
/// dependents always precede their dependencies and ties are deterministic.
fn priority_order(graph: &DiGraph<DependencyNode, ()>) -> Vec<NodeIndex> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
        .collect();

    let sort_key = |idx: NodeIndex| {
        let c = &graph[idx].coordinate;
        (c.key(), c.version.clone(), idx)
    };
    let mut ready: BTreeSet<(String, String, NodeIndex)> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| sort_key(*idx))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(entry) = ready.pop_first() {
        let idx = entry.2;
        order.push(idx);
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(sort_key(next));
                }
            }
        }
    }
    order
}

/// Renders one cycle through `start` as `a -> b -> a`.
fn describe_cycle(graph: &DiGraph<DependencyNode, ()>, start: NodeIndex) -> Vec<String> {
    let component: HashSet<NodeIndex> = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&start))
        .map(|scc| scc.into_iter().collect())
        .unwrap_or_default();

    // Breadth-first search inside the strongly connected component back to `start`.
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut closing = None;
    'search: while let Some(idx) = queue.pop_front() {
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            if next == start {
                closing = Some(idx);
                break 'search;
            }
            if component.contains(&next) && !parent.contains_key(&next) {
                parent.insert(next, idx);
                queue.push_back(next);
            }
        }
    }

    let mut path = vec![start];
    let mut cursor = closing;
    while let Some(idx) = cursor {
        if idx == start {
            break;
        }
        path.push(idx);
        cursor = parent.get(&idx).copied();
    }
    // `path` is start, then the chain walked backwards from the closing node.
    path[1..].reverse();
    path.push(start);
    path.into_iter()
        .map(|idx| graph[idx].coordinate.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Coordinate {
        s.parse().unwrap()
    }

    fn config() -> FatAarConfig {
        FatAarConfig::new(c("com.acme:sdk:1.0"))
    }

    #[test]
    fn test_embed_closure_and_passthrough() {
        let decls = vec![
            DependencyDeclaration::new(c("com.acme:core:1.0"))
                .direct("embed")
                .archive("core.aar")
                .requires(c("com.acme:util:1.0"))
                .requires(c("com.squareup:okio:3.0")),
            DependencyDeclaration::new(c("com.acme:util:1.0")).archive("util.aar"),
            DependencyDeclaration::new(c("com.squareup:okio:3.0")).archive("okio.jar"),
            DependencyDeclaration::new(c("androidx.core:core:1.9.0")).direct("implementation"),
        ];
        let dag = classify(&decls, &config()).unwrap();

        let embedded: Vec<String> = dag.embedded().iter().map(|n| n.coordinate.to_string()).collect();
        assert_eq!(
            embedded,
            vec!["com.acme:core:1.0", "com.acme:util:1.0", "com.squareup:okio:3.0"]
        );
        let passthrough: Vec<String> =
            dag.passthrough().iter().map(|n| n.coordinate.to_string()).collect();
        assert_eq!(passthrough, vec!["androidx.core:core:1.9.0"]);
    }

    #[test]
    fn test_embedding_wins_over_passthrough_path() {
        let shared = c("com.acme:shared:1.0");
        let decls = vec![
            DependencyDeclaration::new(c("com.acme:a:1.0"))
                .direct("embed")
                .archive("a.aar")
                .requires(shared.clone()),
            DependencyDeclaration::new(c("org.other:b:1.0"))
                .direct("implementation")
                .requires(shared.clone()),
            DependencyDeclaration::new(shared.clone()).archive("shared.aar"),
        ];
        let dag = classify(&decls, &config()).unwrap();
        assert_eq!(
            dag.node(&shared).unwrap().classification,
            Classification::Embed
        );
        assert_eq!(
            dag.node(&c("org.other:b:1.0")).unwrap().classification,
            Classification::Passthrough
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let decls = vec![
            DependencyDeclaration::new(c("x:a:1"))
                .direct("embed")
                .archive("a.aar")
                .requires(c("x:b:1")),
            DependencyDeclaration::new(c("x:b:1"))
                .archive("b.aar")
                .requires(c("x:a:1")),
        ];
        let err = classify(&decls, &config()).unwrap_err();
        match err {
            FatAarError::CyclicDependency { cycle } => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"x:a:1".to_string()));
                assert!(cycle.contains(&"x:b:1".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_embedded_versions() {
        let decls = vec![
            DependencyDeclaration::new(c("x:a:1"))
                .direct("embed")
                .archive("a.aar")
                .requires(c("x:util:1.0")),
            DependencyDeclaration::new(c("x:b:1"))
                .direct("embed")
                .archive("b.aar")
                .requires(c("x:util:2.0")),
            DependencyDeclaration::new(c("x:util:1.0")).archive("u1.aar"),
            DependencyDeclaration::new(c("x:util:2.0")).archive("u2.aar"),
        ];
        let err = classify(&decls, &config()).unwrap_err();
        assert!(matches!(
            err,
            FatAarError::AmbiguousVersion { ref key, ref versions }
                if key == "x:util" && versions == &vec!["1.0".to_string(), "2.0".to_string()]
        ));
    }

    #[test]
    fn test_non_transitive_keeps_children_as_passthrough() {
        let mut config = config();
        config.transitive = false;
        let decls = vec![
            DependencyDeclaration::new(c("x:a:1"))
                .direct("embed")
                .archive("a.aar")
                .requires(c("x:child:1")),
            DependencyDeclaration::new(c("x:child:1")),
        ];
        let dag = classify(&decls, &config).unwrap();
        assert_eq!(dag.embedded().len(), 1);
        let passthrough: Vec<_> = dag.passthrough().iter().map(|n| n.coordinate.clone()).collect();
        assert_eq!(passthrough, vec![c("x:child:1")]);
    }

    #[test]
    fn test_excluded_dependency_is_not_embedded() {
        let mut config = config();
        config.excludes.push(crate::config::ExcludeRule {
            group: "androidx.annotation".to_string(),
            name: None,
        });
        let decls = vec![
            DependencyDeclaration::new(c("x:a:1"))
                .direct("embed")
                .archive("a.aar")
                .requires(c("androidx.annotation:annotation:1.5.0")),
            DependencyDeclaration::new(c("androidx.annotation:annotation:1.5.0")),
        ];
        let dag = classify(&decls, &config).unwrap();
        let node = dag.node(&c("androidx.annotation:annotation:1.5.0")).unwrap();
        assert_eq!(node.classification, Classification::Passthrough);
        assert_eq!(dag.passthrough().len(), 1);
    }

    #[test]
    fn test_unknown_and_missing_archive() {
        let decls = vec![DependencyDeclaration::new(c("x:a:1"))
            .direct("embed")
            .archive("a.aar")
            .requires(c("x:ghost:1"))];
        assert!(matches!(
            classify(&decls, &config()),
            Err(FatAarError::UnknownDependency { .. })
        ));

        let decls = vec![DependencyDeclaration::new(c("x:a:1")).direct("embed")];
        assert!(matches!(
            classify(&decls, &config()),
            Err(FatAarError::MissingArchive { .. })
        ));
    }

    #[test]
    fn test_priority_order_is_topological_with_name_ties() {
        let decls = vec![
            DependencyDeclaration::new(c("z:last:1"))
                .direct("embed")
                .archive("z.aar")
                .requires(c("a:leaf:1")),
            DependencyDeclaration::new(c("b:mid:1"))
                .direct("embed")
                .archive("b.aar")
                .requires(c("a:leaf:1")),
            DependencyDeclaration::new(c("a:leaf:1")).archive("leaf.aar"),
        ];
        let dag = classify(&decls, &config()).unwrap();
        let order: Vec<String> = dag.nodes().map(|n| n.coordinate.to_string()).collect();
        assert_eq!(order, vec!["b:mid:1", "z:last:1", "a:leaf:1"]);
        assert_eq!(dag.priority(&c("b:mid:1")), Some(0));
    }
}
