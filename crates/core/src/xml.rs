//! Minimal owned XML tree used for manifests and value resources.
//!
//! Both formats are small documents that have to be compared structurally
//! and rewritten, so a DOM-like tree is simpler to work with than streaming
//! events. Comments and processing instructions are dropped on parse.
//!
//! Text is kept verbatim inside elements that carry real text, so styled
//! strings (`Hello <b>brave</b> world`) survive a round trip. Whitespace
//! that only lays out child elements is dropped on parse and regenerated
//! on write.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `uses-permission` or `tools:node`.
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),
    #[error("{0}")]
    Structure(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Whether any direct child is text, i.e. whitespace is significant.
    pub fn has_text(&self) -> bool {
        self.children.iter().any(|c| matches!(c, XmlNode::Text(_)))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Serializes this element (without declaration) on a single line.
    /// Used as the canonical form when comparing content.
    pub fn to_compact_string(&self) -> Result<String, XmlError> {
        let mut output = Vec::new();
        let mut writer = Writer::new(&mut output);
        write_element(&mut writer, self, None)?;
        String::from_utf8(output).map_err(|e| XmlError::Structure(e.to_string()))
    }
}

/// Parses a document and returns its single root element.
pub fn parse_document(content: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(content);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(start_element(&e)?),
            Event::Empty(e) => {
                let element = start_element(&e)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("unbalanced end tag".to_string()))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text));
                } else if !text.trim().is_empty() {
                    return Err(XmlError::Structure("text outside root element".to_string()));
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Structure(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].name
        )));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".to_string()))
}

fn start_element(e: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    mut element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), XmlError> {
    drop_layout_whitespace(&mut element);
    if let Some(parent) = stack.last_mut() {
        parent.push_element(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::Structure(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

/// Removes text children when none of them holds anything but whitespace.
fn drop_layout_whitespace(element: &mut XmlElement) {
    let layout_only = element.children.iter().all(|c| match c {
        XmlNode::Text(t) => t.trim().is_empty(),
        XmlNode::Element(_) => true,
    });
    if layout_only {
        element
            .children
            .retain(|c| matches!(c, XmlNode::Element(_)));
    }
}

/// Serializes a document with an XML declaration and 4-space indentation.
/// Elements holding text are written exactly as stored.
pub fn write_document(root: &XmlElement) -> Result<String, XmlError> {
    let mut output = Vec::new();
    let mut writer = Writer::new(&mut output);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_indent(&mut writer, 0)?;
    write_element(&mut writer, root, Some(0))?;

    let mut xml = String::from_utf8(output).map_err(|e| XmlError::Structure(e.to_string()))?;
    xml.push('\n');
    Ok(xml)
}

fn write_indent<W: std::io::Write>(writer: &mut Writer<W>, depth: usize) -> Result<(), XmlError> {
    let layout = format!("\n{}", "    ".repeat(depth));
    writer.write_event(Event::Text(BytesText::from_escaped(layout)))?;
    Ok(())
}

/// `depth` is `None` when the element sits in mixed content and must be
/// written without added whitespace.
fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &XmlElement,
    depth: Option<usize>,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    let child_depth = match depth {
        Some(d) if !element.has_text() => Some(d + 1),
        _ => None,
    };
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => {
                if let Some(d) = child_depth {
                    write_indent(writer, d)?;
                }
                write_element(writer, e, child_depth)?;
            }
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    if let (Some(d), Some(_)) = (depth, child_depth) {
        write_indent(writer, d)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<!-- comment -->
<resources>
    <string name="app_name">Demo &amp; Co</string>
    <color name="accent">#ff0000</color>
</resources>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "resources");
        let children: Vec<_> = root.elements().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].attr("name"), Some("app_name"));
        assert_eq!(children[0].text(), "Demo & Co");
    }

    #[test]
    fn test_rejects_two_roots() {
        let err = parse_document("<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("second root"));
    }

    #[test]
    fn test_rejects_unclosed() {
        assert!(parse_document("<a><b></b>").is_err());
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let mut root = XmlElement::new("manifest");
        root.set_attr("package", "com.acme");
        let mut child = XmlElement::new("uses-permission");
        child.set_attr("android:name", "android.permission.INTERNET");
        root.push_element(child);

        let text = write_document(&root).unwrap();
        assert!(text.starts_with("<?xml"));
        assert_eq!(parse_document(&text).unwrap(), root);
    }

    #[test]
    fn test_compact_string_escapes_text() {
        let mut e = XmlElement::new("string");
        e.set_attr("name", "x");
        e.children.push(XmlNode::Text("a < b".to_string()));
        assert_eq!(
            e.to_compact_string().unwrap(),
            r#"<string name="x">a &lt; b</string>"#
        );
    }

    #[test]
    fn test_mixed_content_keeps_spacing() {
        let doc = r#"<resources>
    <string name="greet">Hello <b>brave</b> world</string>
</resources>"#;
        let root = parse_document(doc).unwrap();
        let text = write_document(&root).unwrap();
        assert!(text.contains(r#"<string name="greet">Hello <b>brave</b> world</string>"#));
        assert_eq!(parse_document(&text).unwrap(), root);
    }

    #[test]
    fn test_layout_whitespace_is_regenerated() {
        let root = parse_document("<manifest><application>  <activity a=\"1\"/></application></manifest>")
            .unwrap();
        let application = root.elements().next().unwrap();
        assert!(!application.has_text());
        assert_eq!(
            write_document(&root).unwrap(),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<manifest>\n    <application>\n        <activity a=\"1\"/>\n    </application>\n</manifest>\n"
        );
    }
}
