//! Serialization of [`Document`] trees with quick-xml.

use crate::types::{NodeId, NodeKind, QName, XML_NS};
use crate::{Document, DomError, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};

/// Namespace bindings in scope while writing, innermost last.
type Scope = Vec<(String, String)>;

impl Document {
    /// Serialize the whole document, with an XML declaration.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        write(&mut writer, Event::Text(BytesText::new("\n")))?;
        write_node(self, &mut writer, self.root(), &mut Vec::new())?;
        into_string(writer)
    }

    /// Serialize the subtree rooted at `id`, without a declaration.
    ///
    /// Namespace declarations inherited from ancestors are repeated on the
    /// subtree root when needed.
    pub fn subtree_to_string(&self, id: NodeId) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_node(self, &mut writer, id, &mut Vec::new())?;
        into_string(writer)
    }
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner()).map_err(|e| DomError::Write(e.to_string()))
}

fn lookup<'s>(scope: &'s Scope, prefix: &str) -> Option<&'s str> {
    if prefix == "xml" {
        return Some(XML_NS);
    }
    scope
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

/// Prefix used for a namespaced name created without one.
fn fallback_prefix(ns: &str) -> &'static str {
    match ns {
        "http://www.xmlmind.com/ditac/schema/ditac" => "ditac",
        "http://dita.oasis-open.org/architecture/2005/" => "ditaarch",
        _ => "ns",
    }
}

/// Make sure `name` will be written with a bound prefix, recording any
/// declaration that must be added to the current start tag.
fn bind(name: &QName, scope: &mut Scope, declared: &mut Scope, is_element: bool) -> String {
    let Some(ns) = name.ns.as_deref() else {
        if is_element && lookup(scope, "").is_some_and(|uri| !uri.is_empty()) {
            scope.push((String::new(), String::new()));
            declared.push((String::new(), String::new()));
        }
        return name.local.clone();
    };
    let prefix = match (&name.prefix, is_element) {
        (Some(prefix), _) if !prefix.is_empty() => prefix.clone(),
        (_, true) => String::new(),
        (_, false) => fallback_prefix(ns).to_string(),
    };
    if lookup(scope, &prefix) != Some(ns) {
        scope.push((prefix.clone(), ns.to_string()));
        declared.push((prefix.clone(), ns.to_string()));
    }
    if prefix.is_empty() {
        name.local.clone()
    } else {
        format!("{}:{}", prefix, name.local)
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| DomError::Write(e.to_string()))
}

fn write_node(
    doc: &Document,
    writer: &mut Writer<Vec<u8>>,
    id: NodeId,
    scope: &mut Scope,
) -> Result<()> {
    match &doc.node(id).kind {
        NodeKind::Text(text) => write(writer, Event::Text(BytesText::new(text))),
        NodeKind::Comment(text) => write(writer, Event::Comment(BytesText::from_escaped(text.as_str()))),
        NodeKind::ProcessingInstruction { target, data } => {
            let content = if data.is_empty() {
                target.clone()
            } else {
                format!("{} {}", target, data)
            };
            write(writer, Event::PI(BytesPI::new(content)))
        }
        NodeKind::Element(element) => {
            let depth = scope.len();
            let mut declared: Scope = Vec::new();

            // Declarations the source carried stay where they were.
            for (prefix, uri) in &element.namespaces {
                if lookup(scope, prefix) != Some(uri.as_str()) {
                    scope.push((prefix.clone(), uri.clone()));
                    declared.push((prefix.clone(), uri.clone()));
                }
            }

            let tag = bind(&element.name, scope, &mut declared, true);
            let mut attributes = Vec::with_capacity(element.attributes.len());
            for attr in &element.attributes {
                let key = bind(&attr.name, scope, &mut declared, false);
                attributes.push((key, attr.value.as_str()));
            }

            let mut start = BytesStart::new(tag.as_str());
            for (prefix, uri) in &declared {
                let key = if prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{}", prefix)
                };
                start.push_attribute((key.as_str(), uri.as_str()));
            }
            for (key, value) in &attributes {
                start.push_attribute((key.as_str(), *value));
            }

            let children = doc.children(id);
            if children.is_empty() {
                write(writer, Event::Empty(start))?;
            } else {
                write(writer, Event::Start(start))?;
                for &child in children {
                    write_node(doc, writer, child, scope)?;
                }
                write(writer, Event::End(BytesEnd::new(tag.as_str())))?;
            }

            scope.truncate(depth);
            Ok(())
        }
    }
}
