use crate::xml::{self, XmlElement, XmlError};
use std::collections::BTreeMap;

/// Tags under `<resources>` that declare nothing mergeable.
const IGNORED_TAGS: &[&str] = &["eat-comment", "skip", "public", "java-symbol"];

/// Resource type declared by a `<resources>` child element.
fn value_type(element: &XmlElement) -> Option<String> {
    let kind = match element.name.as_str() {
        "item" => return element.attr("type").map(str::to_string),
        "declare-styleable" => "styleable",
        "string-array" | "integer-array" | "array" => "array",
        "bool" | "color" | "dimen" | "fraction" | "id" | "integer" | "plurals" | "string"
        | "style" | "attr" | "drawable" | "macro" | "overlayable" => element.name.as_str(),
        _ => return None,
    };
    Some(kind.to_string())
}

/// Contents of one `values*/` XML file.
#[derive(Debug, Default)]
pub struct ValuesFile {
    /// `xmlns:*` declarations of the `<resources>` root, needed by prefixed
    /// markup such as `<xliff:g>` or `tools:ignore`.
    pub namespaces: Vec<(String, String)>,
    /// One `(type, name, element)` per declared resource.
    pub values: Vec<(String, String, XmlElement)>,
}

pub fn parse_values(content: &str) -> Result<ValuesFile, XmlError> {
    let root = xml::parse_document(content)?;
    if root.name != "resources" {
        return Err(XmlError::Structure(format!(
            "values root is <{}>, expected <resources>",
            root.name
        )));
    }

    let mut out = ValuesFile {
        namespaces: root
            .attributes
            .iter()
            .filter(|(k, _)| k.starts_with("xmlns:"))
            .cloned()
            .collect(),
        values: Vec::new(),
    };
    for element in root.elements() {
        if IGNORED_TAGS.contains(&element.name.as_str()) {
            continue;
        }
        let kind = value_type(element).ok_or_else(|| {
            XmlError::Structure(format!("unknown value resource <{}>", element.name))
        })?;
        let name = element
            .attr("name")
            .ok_or_else(|| XmlError::Structure(format!("<{}> without a name", element.name)))?;
        out.values.push((kind, name.to_string(), element.clone()));
    }
    Ok(out)
}

/// Builds a `<resources>` document from already sorted elements.
pub fn write_values<'a>(
    namespaces: &BTreeMap<String, String>,
    elements: impl IntoIterator<Item = &'a XmlElement>,
) -> Result<String, XmlError> {
    let mut root = XmlElement::new("resources");
    for (prefix, uri) in namespaces {
        root.set_attr(prefix, uri.as_str());
    }
    for element in elements {
        root.push_element(element.clone());
    }
    xml::write_document(&root)
}
