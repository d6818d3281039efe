//! Per-invocation configuration.
//!
//! A `FatAarConfig` is built once by the host and handed to every stage by
//! reference; nothing in the engine keeps state between runs.

use crate::error::{FatAarError, Result};
use crate::model::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FatAarConfig {
    /// Identity of the module that consumes the embedded artifacts.
    pub module: Coordinate,
    /// Configurations whose direct dependencies are embedded.
    #[serde(default = "default_embed_configurations")]
    pub embed_configurations: BTreeSet<String>,
    /// Whether dependencies of embedded artifacts are embedded too.
    #[serde(default = "default_true")]
    pub transitive: bool,
    #[serde(default)]
    pub excludes: Vec<ExcludeRule>,
    #[serde(default)]
    pub manifest: ManifestPolicy,
    #[serde(default)]
    pub resources: ResourcePolicy,
    /// Parent directory for the scoped extraction area.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// Keeps matching dependencies out of the embed closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeRule {
    pub group: String,
    /// Matches every artifact of the group when absent.
    #[serde(default)]
    pub name: Option<String>,
}

impl ExcludeRule {
    pub fn matches(&self, coordinate: &Coordinate) -> bool {
        self.group == coordinate.group
            && self.name.as_ref().is_none_or(|n| *n == coordinate.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestPolicy {
    /// Fail instead of resolving by priority when two libraries disagree on
    /// a `meta-data` value.
    #[serde(default)]
    pub strict_library_meta_data: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePolicy {
    /// Let the higher-priority artifact win every differing resource.
    #[serde(default)]
    pub allow_override: bool,
    /// `type/name` keys the higher-priority artifact may override.
    #[serde(default)]
    pub overridable: BTreeSet<String>,
}

impl ResourcePolicy {
    pub fn permits_override(&self, short_key: &str) -> bool {
        self.allow_override || self.overridable.contains(short_key)
    }
}

fn default_embed_configurations() -> BTreeSet<String> {
    BTreeSet::from(["embed".to_string()])
}

fn default_true() -> bool {
    true
}

impl FatAarConfig {
    pub fn new(module: Coordinate) -> Self {
        Self {
            module,
            embed_configurations: default_embed_configurations(),
            transitive: true,
            excludes: Vec::new(),
            manifest: ManifestPolicy::default(),
            resources: ResourcePolicy::default(),
            work_dir: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FatAarConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embed_configurations.is_empty() {
            return Err(FatAarError::Config(
                "embed_configurations must name at least one configuration".to_string(),
            ));
        }
        for key in &self.resources.overridable {
            if key.split_once('/').is_none_or(|(t, n)| t.is_empty() || n.is_empty()) {
                return Err(FatAarError::Config(format!(
                    "overridable resource '{key}' is not of the form type/name"
                )));
            }
        }
        Ok(())
    }

    pub fn is_embed_configuration(&self, configuration: &str) -> bool {
        self.embed_configurations.contains(configuration)
    }

    pub fn is_excluded(&self, coordinate: &Coordinate) -> bool {
        self.excludes.iter().any(|rule| rule.matches(coordinate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: FatAarConfig =
            serde_json::from_str(r#"{"module": "com.acme:sdk:2.0"}"#).unwrap();
        assert_eq!(config.module.name, "sdk");
        assert!(config.is_embed_configuration("embed"));
        assert!(config.transitive);
        assert!(!config.resources.permits_override("string/app_name"));
        config.validate().unwrap();
    }

    #[test]
    fn test_exclude_rules() {
        let config: FatAarConfig = serde_json::from_str(
            r#"{"module": "com.acme:sdk:2.0",
                "excludes": [{"group": "androidx.core"}, {"group": "com.google", "name": "gson"}]}"#,
        )
        .unwrap();
        assert!(config.is_excluded(&Coordinate::new("androidx.core", "core", "1.9.0")));
        assert!(config.is_excluded(&Coordinate::new("com.google", "gson", "2.10")));
        assert!(!config.is_excluded(&Coordinate::new("com.google", "guava", "31")));
    }

    #[test]
    fn test_overridable_keys_are_validated() {
        let mut config = FatAarConfig::new(Coordinate::new("a", "b", "1"));
        config.resources.overridable.insert("app_name".to_string());
        assert!(matches!(config.validate(), Err(FatAarError::Config(_))));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let res = serde_json::from_str::<FatAarConfig>(r#"{"module": "a:b:1", "bogus": 1}"#);
        assert!(res.is_err());
    }
}
