use crate::error::FatAarError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maven-style identity of a dependency: `group:name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// `group:name`, the key used to detect version ambiguity and to order ties.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

impl FromStr for Coordinate {
    type Err = FatAarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, name, version]
                if is_plain_part(group) && is_plain_part(name) && is_plain_part(version) =>
            {
                Ok(Coordinate::new(*group, *name, *version))
            }
            _ => Err(FatAarError::Config(format!(
                "'{s}' is not a group:name:version coordinate"
            ))),
        }
    }
}

/// Parts map to Maven repository path segments; path syntax is rejected.
fn is_plain_part(part: &str) -> bool {
    !part.is_empty() && !part.starts_with('.') && !part.contains(['/', '\\'])
}

impl TryFrom<String> for Coordinate {
    type Error = FatAarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}
