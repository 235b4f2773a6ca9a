//! XML parser that builds [`Document`] arenas.

use crate::types::{Attribute, Element, NodeId, NodeKind, QName};
use crate::{Document, DomError, Result};
use ditac_diagnostics::SourceLocation;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use url::Url;

/// Parse XML text into a [`Document`].
///
/// `uri` becomes the document URI and the `uri` of every node location.
///
/// # Example
///
/// ```rust
/// use ditac_dom::parse;
///
/// let doc = parse(r#"<map><topicref href="a.dita"/></map>"#, None).unwrap();
/// let topicref = doc.first_child_element(doc.root()).unwrap();
/// assert_eq!(doc.attribute(topicref, "href"), Some("a.dita"));
/// ```
///
/// # Errors
///
/// Returns an error if the XML is malformed, if it has no or several root
/// elements, or if a namespace prefix is not declared.
pub fn parse(content: &str, uri: Option<&Url>) -> Result<Document> {
    let mut parser = DocumentParser::new(content, uri);
    parser.parse()?;
    let mut doc = parser.doc;
    doc.set_uri(uri.cloned());
    Ok(doc)
}

impl Document {
    /// See [`parse`].
    pub fn parse(content: &str, uri: Option<&Url>) -> Result<Self> {
        parse(content, uri)
    }
}

/// Internal parser state.
struct DocumentParser<'a> {
    source: &'a str,
    reader: Reader<&'a [u8]>,
    uri: Option<String>,
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
    doc: Document,
    /// Open elements.
    stack: Vec<NodeId>,
    root: Option<NodeId>,
}

impl<'a> DocumentParser<'a> {
    fn new(source: &'a str, uri: Option<&Url>) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            source,
            reader,
            uri: uri.map(|u| u.to_string()),
            line_starts,
            doc: Document::empty(),
            stack: Vec::new(),
            root: None,
        }
    }

    fn parse(&mut self) -> Result<()> {
        loop {
            let event_start = self.reader.buffer_position() as usize;

            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = self.handle_start(&e, event_start)?;
                    self.stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    self.handle_start(&e, event_start)?;
                }
                Ok(Event::End(e)) => {
                    let found = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let node = self.stack.pop().ok_or_else(|| DomError::XmlSyntax {
                        message: format!("Unexpected closing tag </{}>", found),
                        location: Some(self.location_at(event_start)),
                    })?;
                    let expected = self.doc.name(node).map(QName::qualified).unwrap_or_default();
                    if expected != found {
                        return Err(DomError::MismatchedEndTag {
                            expected,
                            found,
                            location: Some(self.location_at(event_start)),
                        });
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| DomError::XmlSyntax {
                        message: format!("Invalid text content: {}", err),
                        location: Some(self.location_at(event_start)),
                    })?;
                    let text = text.into_owned();
                    self.append_leaf(NodeKind::Text(text), event_start);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).to_string();
                    self.append_leaf(NodeKind::Text(text), event_start);
                }
                Ok(Event::Comment(e)) => {
                    let text = String::from_utf8_lossy(&e).to_string();
                    self.append_leaf(NodeKind::Comment(text), event_start);
                }
                Ok(Event::PI(e)) => {
                    let raw = String::from_utf8_lossy(&e).to_string();
                    let (target, data) = match raw.find(char::is_whitespace) {
                        Some(pos) => (raw[..pos].to_string(), raw[pos..].trim_start().to_string()),
                        None => (raw.clone(), String::new()),
                    };
                    self.append_leaf(NodeKind::ProcessingInstruction { target, data }, event_start);
                }
                Ok(Event::Decl(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => {
                    let position = self.reader.error_position() as usize;
                    return Err(DomError::XmlSyntax {
                        message: e.to_string(),
                        location: Some(self.location_at(position)),
                    });
                }
            }
        }

        if let Some(&open) = self.stack.last() {
            let name = self.doc.name(open).map(QName::qualified).unwrap_or_default();
            return Err(DomError::UnexpectedEof {
                expected: format!("closing tag </{}>", name),
                location: self.doc.node(open).location.clone(),
            });
        }

        let root = self.root.ok_or_else(|| DomError::EmptyDocument {
            uri: self.uri.clone(),
        })?;
        self.doc.set_root(root);
        Ok(())
    }

    /// Create the element of a start or empty tag and attach it.
    fn handle_start(&mut self, e: &BytesStart<'_>, event_start: usize) -> Result<NodeId> {
        let location = self.location_at(event_start);
        let qualified = String::from_utf8_lossy(e.name().as_ref()).to_string();

        let mut namespaces = Vec::new();
        let mut raw_attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| DomError::XmlSyntax {
                message: format!("Attribute error: {}", err),
                location: Some(location.clone()),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| DomError::XmlSyntax {
                    message: format!("Invalid attribute value: {}", err),
                    location: Some(location.clone()),
                })?
                .into_owned();

            if key == "xmlns" {
                namespaces.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                namespaces.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key, value));
            }
        }

        let mut element = Element::new(QName::local(qualified.clone()));
        element.namespaces = namespaces;
        let id = self
            .doc
            .push_node(NodeKind::Element(element), Some(location.clone()));

        match self.stack.last() {
            Some(&parent) => self.doc.append_child(parent, id),
            None => {
                if self.root.is_some() {
                    return Err(DomError::MultipleRoots {
                        location: Some(location),
                    });
                }
                self.root = Some(id);
            }
        }

        // Declarations on the element itself are in scope for its own name.
        let name = self.resolve_name(id, &qualified, true, &location)?;
        let mut attributes = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let name = self.resolve_name(id, &key, false, &location)?;
            attributes.push(Attribute { name, value });
        }

        if let Some(element) = self.doc.element_mut(id) {
            element.name = name;
            element.attributes = attributes;
            element.refresh_kind();
        }
        Ok(id)
    }

    /// Expand `prefix:local` using the declarations in scope at `id`.
    ///
    /// Unprefixed attributes are in no namespace; unprefixed elements are in
    /// the default namespace, if any.
    fn resolve_name(
        &self,
        id: NodeId,
        qualified: &str,
        is_element: bool,
        location: &SourceLocation,
    ) -> Result<QName> {
        match qualified.split_once(':') {
            Some((prefix, local)) => {
                let ns = self.doc.lookup_namespace(id, prefix).ok_or_else(|| {
                    DomError::UnboundPrefix {
                        prefix: prefix.to_string(),
                        location: Some(location.clone()),
                    }
                })?;
                Ok(QName::ns(ns, prefix, local))
            }
            None if is_element => Ok(QName {
                ns: self.doc.lookup_namespace(id, ""),
                prefix: None,
                local: qualified.to_string(),
            }),
            None => Ok(QName::local(qualified)),
        }
    }

    /// Attach a text, comment or PI node to the open element. Content
    /// outside the document element is dropped.
    fn append_leaf(&mut self, kind: NodeKind, event_start: usize) {
        if let Some(&parent) = self.stack.last() {
            let location = self.location_at(event_start);
            let id = self.doc.push_node(kind, Some(location));
            self.doc.append_child(parent, id);
        }
    }

    fn location_at(&self, offset: usize) -> SourceLocation {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let column = self
            .source
            .get(line_start..offset)
            .map_or(1, |prefix| prefix.chars().count() + 1);
        SourceLocation {
            uri: self.uri.clone(),
            line: Some(line + 1),
            column: Some(column),
        }
    }
}
