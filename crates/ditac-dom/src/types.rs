//! Core node types of the document arena.

use crate::class::ElementKind;
use ditac_diagnostics::SourceLocation;
use std::fmt;

/// The `xml:` namespace, always bound.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Index of a node inside one [`Document`](crate::Document) arena.
///
/// A `NodeId` is only meaningful for the document that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A namespace-qualified name.
///
/// `prefix` is kept for serialization only; equality of names is decided by
/// `(ns, local)`.
#[derive(Debug, Clone, Eq)]
pub struct QName {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            ns: None,
            prefix: None,
            local: local.into(),
        }
    }

    pub fn ns(ns: impl Into<String>, prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.into()),
            prefix: Some(prefix.into()),
            local: local.into(),
        }
    }

    pub fn matches(&self, ns: Option<&str>, local: &str) -> bool {
        self.local == local && self.ns.as_deref() == ns
    }

    /// `{ns}local`, or plain `local` for names in no namespace.
    pub fn clark(&self) -> String {
        match &self.ns {
            Some(ns) => format!("{{{}}}{}", ns, self.local),
            None => self.local.clone(),
        }
    }

    /// The name as written in markup, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, self.local),
            _ => self.local.clone(),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.ns == other.ns
    }
}

impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ns.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// An element node.
#[derive(Debug, Clone)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Namespace declarations written on this element: `(prefix, uri)`,
    /// with an empty prefix for the default namespace.
    pub namespaces: Vec<(String, String)>,
    pub(crate) kind: ElementKind,
}

impl Element {
    pub fn new(name: QName) -> Self {
        let kind = ElementKind::for_element(&name, None);
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
            kind,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn attribute(&self, ns: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.matches(ns, local))
            .map(|a| a.value.as_str())
    }

    pub(crate) fn refresh_kind(&mut self) {
        let class = self.attribute(None, "class").map(str::to_string);
        self.kind = ElementKind::for_element(&self.name, class.as_deref());
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    ProcessingInstruction { target: String, data: String },
    Comment(String),
}

/// One slot of the arena.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub location: Option<SourceLocation>,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind, location: Option<SourceLocation>) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            location,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }
}
