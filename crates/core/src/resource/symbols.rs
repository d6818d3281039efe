//! `R.txt` symbol tables.
//!
//! Each line declares one symbol:
//!
//! ```text
//! int string app_name 0x7f0e001b
//! int[] styleable Chip { 0x7f040001, 0x7f040002 }
//! int styleable Chip_chipIcon 1
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolValue {
    /// A resource id.
    Id(u32),
    /// Ids of the attributes of a styleable.
    Array(Vec<u32>),
    /// Position of an attribute inside its styleable array.
    Index(u32),
}

/// `(type, name)` -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub symbols: BTreeMap<(String, String), SymbolValue>,
}

impl SymbolTable {
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut table = SymbolTable::default();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (kind, name, value) =
                parse_line(line).map_err(|e| format!("R.txt line {}: {e}", lineno + 1))?;
            let key = (kind, name);
            if let Some(existing) = table.symbols.get(&key) {
                if existing != &value {
                    return Err(format!(
                        "R.txt declares {}/{} twice with different values",
                        key.0, key.1
                    ));
                }
            }
            table.symbols.insert(key, value);
        }
        Ok(table)
    }

    /// Assigned resource ids with their `(type, name)`. Styleable indices,
    /// arrays and the `0x0` placeholder of unassigned ids are skipped.
    pub fn ids(&self) -> impl Iterator<Item = (u32, &(String, String))> {
        self.symbols.iter().filter_map(|(key, value)| match value {
            SymbolValue::Id(id) if *id != 0 => Some((*id, key)),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for ((kind, name), value) in &self.symbols {
            match value {
                SymbolValue::Id(id) => {
                    let _ = writeln!(out, "int {kind} {name} {id:#010x}");
                }
                SymbolValue::Index(idx) => {
                    let _ = writeln!(out, "int {kind} {name} {idx}");
                }
                SymbolValue::Array(ids) => {
                    let list: Vec<String> = ids.iter().map(|id| format!("{id:#010x}")).collect();
                    let _ = writeln!(out, "int[] {kind} {name} {{ {} }}", list.join(", "));
                }
            }
        }
        out
    }
}

fn parse_line(line: &str) -> Result<(String, String, SymbolValue), String> {
    let mut parts = line.splitn(4, ' ');
    let java_type = parts.next().ok_or("missing type")?;
    let kind = parts.next().ok_or("missing resource type")?.to_string();
    let name = parts.next().ok_or("missing resource name")?.to_string();
    let raw = parts.next().ok_or("missing value")?.trim();

    let value = match java_type {
        "int[]" => {
            let inner = raw
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .ok_or_else(|| format!("malformed array '{raw}'"))?;
            let ids = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_number)
                .collect::<Result<Vec<_>, _>>()?;
            SymbolValue::Array(ids)
        }
        "int" if kind == "styleable" => SymbolValue::Index(parse_number(raw)?),
        "int" => SymbolValue::Id(parse_number(raw)?),
        other => return Err(format!("unknown symbol type '{other}'")),
    };
    Ok((kind, name, value))
}

fn parse_number(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("invalid number '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "int string app_name 0x7f0e001b
int[] styleable Chip { 0x7f040001, 0x7f040002 }
int styleable Chip_chipIcon 1
int[] styleable Empty {  }
";

    #[test]
    fn test_parse_all_forms() {
        let table = SymbolTable::parse(SAMPLE).unwrap();
        assert_eq!(
            table.symbols[&("string".to_string(), "app_name".to_string())],
            SymbolValue::Id(0x7f0e001b)
        );
        assert_eq!(
            table.symbols[&("styleable".to_string(), "Chip".to_string())],
            SymbolValue::Array(vec![0x7f040001, 0x7f040002])
        );
        assert_eq!(
            table.symbols[&("styleable".to_string(), "Chip_chipIcon".to_string())],
            SymbolValue::Index(1)
        );
        assert_eq!(
            table.symbols[&("styleable".to_string(), "Empty".to_string())],
            SymbolValue::Array(vec![])
        );
        assert_eq!(table.ids().count(), 1);
    }

    #[test]
    fn test_text_output_parses_back() {
        let table = SymbolTable::parse(SAMPLE).unwrap();
        assert_eq!(SymbolTable::parse(&table.to_text()).unwrap(), table);
    }

    #[test]
    fn test_malformed_line() {
        let err = SymbolTable::parse("int string broken zz").unwrap_err();
        assert!(err.contains("line 1"));
    }
}
