//! Minimal XML tree for SAML assertions.
//!
//! Assertions are parsed with `quick-xml` into an owned [`XmlElement`] tree.
//! Elements are matched by local name; namespace declarations are kept as
//! attributes so the canonical form can be rebuilt from the tree.
//!
//! # Canonical form
//!
//! [`XmlElement::canonicalize`] renders exclusive XML canonicalization
//! (without comments) of an element subtree:
//!
//! - only visibly used namespace declarations, each rendered once per scope
//! - attributes sorted by namespace URI, then local name
//! - empty elements written as start/end pairs
//! - text kept verbatim, line endings normalized to `\n`
//! - comments dropped, processing instructions kept
//!
//! The parser applies the same normalization an XML processor does before
//! canonicalization: line endings in text become `\n`, whitespace in
//! attribute values becomes a space. Values read through [`XmlElement::text`]
//! are trimmed; the tree itself is not.
//!
//! `InclusiveNamespaces` prefix lists are not honoured. Documents with a
//! DOCTYPE are rejected outright.

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use crate::AuthResult;
use crate::error::AuthError;

/// In-scope namespace declarations: prefix (`""` for the default) to URI.
pub type NamespaceMap = BTreeMap<String, String>;

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Processing instruction content, `target` followed by its data.
    Instruction(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as written, e.g. `saml:Assertion`.
    pub name: String,

    /// Attributes in document order, namespace declarations included.
    pub attributes: Vec<(String, String)>,

    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an element with no attributes or children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Adds a child element.
    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Adds a text child.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Namespace prefix of the element name, `""` when unprefixed.
    #[must_use]
    pub fn prefix(&self) -> &str {
        split_qname(&self.name).0
    }

    /// Local part of the element name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Value of an attribute by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Namespace declarations made on this element.
    #[must_use]
    pub fn namespace_declarations(&self) -> NamespaceMap {
        self.attributes
            .iter()
            .filter_map(|(key, value)| {
                namespace_prefix(key).map(|prefix| (prefix.to_string(), value.clone()))
            })
            .collect()
    }

    /// Namespace URI of this element as declared on the element itself.
    #[must_use]
    pub fn own_namespace(&self) -> Option<String> {
        self.namespace_declarations().remove(self.prefix())
    }

    /// Child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) | XmlNode::Instruction(_) => None,
        })
    }

    /// First child element with the given local name.
    #[must_use]
    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    /// Child elements with the given local name.
    pub fn children_named<'a>(
        &'a self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.local_name() == local_name)
    }

    /// Follows a path of local names through first-match children.
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// Concatenated text content of direct text children, trimmed.
    #[must_use]
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let XmlNode::Text(value) = node {
                text.push_str(value);
            }
        }
        text.trim().to_string()
    }

    /// Copy of this element without direct children of the given local name.
    #[must_use]
    pub fn without_child(&self, local_name: &str) -> XmlElement {
        XmlElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: self
                .children
                .iter()
                .filter(|node| {
                    !matches!(node, XmlNode::Element(e) if e.local_name() == local_name)
                })
                .cloned()
                .collect(),
        }
    }

    /// Canonical form with this element as the document apex.
    #[must_use]
    pub fn canonicalize(&self) -> String {
        self.canonicalize_in(&NamespaceMap::new())
    }

    /// Canonical form of this element as a subtree of a larger document.
    ///
    /// `inherited` holds the declarations in scope from its ancestors.
    #[must_use]
    pub fn canonicalize_in(&self, inherited: &NamespaceMap) -> String {
        let mut out = String::new();
        self.write_canonical(inherited, &NamespaceMap::new(), &mut out);
        out
    }

    fn write_canonical(&self, in_scope: &NamespaceMap, rendered: &NamespaceMap, out: &mut String) {
        let mut scope = in_scope.clone();
        scope.extend(self.namespace_declarations());

        let mut used = BTreeSet::new();
        used.insert(self.prefix());
        for (key, _) in &self.attributes {
            if namespace_prefix(key).is_none() {
                let (prefix, _) = split_qname(key);
                if !prefix.is_empty() {
                    used.insert(prefix);
                }
            }
        }

        let mut now_rendered = rendered.clone();
        let mut declarations = Vec::new();
        for prefix in used {
            let uri = scope.get(prefix).map(String::as_str).unwrap_or("");
            let previous = rendered.get(prefix).map(String::as_str).unwrap_or("");
            if uri != previous {
                declarations.push((prefix, uri));
                now_rendered.insert(prefix.to_string(), uri.to_string());
            }
        }

        out.push('<');
        out.push_str(&self.name);

        for (prefix, uri) in declarations {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }

        let mut attributes: Vec<_> = self
            .attributes
            .iter()
            .filter(|(key, _)| namespace_prefix(key).is_none())
            .map(|attribute| (attribute_sort_key(&attribute.0, &scope), attribute))
            .collect();
        attributes.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, (key, value)) in attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for node in &self.children {
            match node {
                XmlNode::Element(child) => child.write_canonical(&scope, &now_rendered, out),
                XmlNode::Text(text) => escape_text(text, out),
                XmlNode::Instruction(content) => write_instruction(content, out),
            }
        }

        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serializes the tree as written, declarations included.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }

        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        for node in &self.children {
            match node {
                XmlNode::Element(child) => child.write_xml(out),
                XmlNode::Text(text) => escape_text(text, out),
                XmlNode::Instruction(content) => {
                    out.push_str("<?");
                    out.push_str(content);
                    out.push_str("?>");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Parses a document into its root element.
///
/// # Errors
///
/// Returns `AuthError::InvalidGrant` for malformed XML, a DOCTYPE, or a
/// document without exactly one root element.
pub fn parse(input: &str) -> AuthResult<XmlElement> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                let raw = std::str::from_utf8(&text).map_err(malformed)?;
                let normalized = normalize_line_endings(raw);
                let text = unescape(&normalized).map_err(malformed)?;
                push_node(&mut stack, XmlNode::Text(text.into_owned()));
            }
            Ok(Event::CData(data)) => {
                let text = std::str::from_utf8(&data).map_err(malformed)?;
                push_node(&mut stack, XmlNode::Text(normalize_line_endings(text)));
            }
            Ok(Event::PI(instruction)) => {
                let content = std::str::from_utf8(&instruction).map_err(malformed)?;
                push_node(&mut stack, XmlNode::Instruction(content.to_string()));
            }
            Ok(Event::DocType(_)) => {
                return Err(AuthError::invalid_grant("DOCTYPE is not allowed in assertions"));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e)),
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unclosed element"));
    }

    root.ok_or_else(|| malformed("no root element"))
}

fn element_from(start: &BytesStart<'_>) -> AuthResult<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(malformed)?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(malformed)?
            .to_string();
        let raw = std::str::from_utf8(&attr.value).map_err(malformed)?;
        let value = unescape(&normalize_attribute_whitespace(raw))
            .map_err(malformed)?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> AuthResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        Ok(())
    } else if root.is_some() {
        Err(malformed("more than one root element"))
    } else {
        *root = Some(element);
        Ok(())
    }
}

/// Appends a node to the open element. Nodes outside the root are dropped.
fn push_node(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

/// `\r\n` and lone `\r` become `\n`.
fn normalize_line_endings(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Literal tabs and line breaks in an attribute value become spaces.
/// Character references are unescaped afterwards and survive as written.
fn normalize_attribute_whitespace(raw: &str) -> String {
    raw.replace("\r\n", " ").replace(['\t', '\n', '\r'], " ")
}

fn malformed(reason: impl std::fmt::Display) -> AuthError {
    AuthError::invalid_grant(format!("Malformed XML assertion: {reason}"))
}

/// Namespace URI of the `xml` prefix, bound without a declaration.
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonical ordering key of an attribute: namespace URI, then local name.
/// Unqualified attributes have no namespace and sort first.
fn attribute_sort_key<'a>(key: &'a str, scope: &'a NamespaceMap) -> (&'a str, &'a str) {
    match split_qname(key) {
        ("", local) => ("", local),
        ("xml", local) => (XML_NS, local),
        (prefix, local) => (scope.get(prefix).map_or("", String::as_str), local),
    }
}

/// Renders `<?target data?>` with a single space before non-empty data.
fn write_instruction(content: &str, out: &mut String) {
    let (target, data) = content
        .split_once(char::is_whitespace)
        .map_or((content, ""), |(target, data)| (target, data.trim_start()));
    out.push_str("<?");
    out.push_str(target);
    if !data.is_empty() {
        out.push(' ');
        out.push_str(data);
    }
    out.push_str("?>");
}

fn split_qname(name: &str) -> (&str, &str) {
    name.split_once(':').unwrap_or(("", name))
}

/// Declared prefix if `key` is a namespace declaration attribute.
fn namespace_prefix(key: &str) -> Option<&str> {
    if key == "xmlns" {
        Some("")
    } else {
        key.strip_prefix("xmlns:")
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_text(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
