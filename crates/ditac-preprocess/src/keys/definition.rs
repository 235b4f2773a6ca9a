//! One key binding and the stand-alone topicref it is bound to.

use crate::vocab::{ABSOLUTE_HREF, DITAC_NS};
use ditac_dom::text::collapse_whitespace;
use ditac_dom::{Document, ElementKind, NodeId};
use once_cell::unsync::OnceCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use url::Url;

/// The stand-alone topicref defining one or more keys.
///
/// Its href, if any, is absolute and ends with `#topic_id` when it points
/// at a topic. Several [`KeyDefinition`]s share one node: the key as
/// defined and the `scope.key` copies made in ancestor key spaces.
pub struct KeyNode {
    document: Document,
    quick: OnceCell<QuickFields>,
}

#[derive(Debug, Default)]
struct QuickFields {
    href: Option<String>,
    is_absolute: bool,
    url: Option<Url>,
    text: Option<String>,
}

impl KeyNode {
    /// Wrap a document whose document element is the defining topicref.
    pub fn new(document: Document) -> Self {
        Self {
            document,
            quick: OnceCell::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn element(&self) -> NodeId {
        self.document.root()
    }

    /// The topicmeta of the definition, its first child element.
    pub fn meta(&self) -> Option<NodeId> {
        self.document.first_child_element(self.element())
    }

    /// Non-empty attribute of the defining topicref.
    pub fn attribute(&self, ns: Option<&str>, local: &str) -> Option<&str> {
        self.document.non_empty_attribute_ns(self.element(), ns, local)
    }

    fn quick(&self) -> &QuickFields {
        self.quick.get_or_init(|| {
            let mut fields = QuickFields::default();
            if let Some(href) = self.attribute(None, "href") {
                fields.is_absolute = self.attribute(Some(DITAC_NS), ABSOLUTE_HREF) == Some("true");
                fields.url = Url::parse(href).ok();
                fields.href = Some(href.to_string());
            }
            if let Some(meta) = self.meta() {
                let doc = &self.document;
                let container = doc
                    .child_by_kind(meta, ElementKind::KEYWORDS)
                    .and_then(|keywords| doc.child_by_kind(keywords, ElementKind::KEYWORD))
                    .or_else(|| doc.child_by_kind(meta, ElementKind::LINKTEXT))
                    .unwrap_or(meta);
                let text = collapse_whitespace(&doc.text_content(container));
                fields.text = (!text.is_empty()).then_some(text);
            }
            fields
        })
    }
}

impl fmt::Debug for KeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyNode")
            .field("href", &self.attribute(None, "href"))
            .finish()
    }
}

/// A binding of `key` to a defining topicref.
///
/// Equality and ordering only look at the key.
#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub key: String,
    node: Rc<KeyNode>,
    /// 0 when defined in its own key space, N when copied up from a key
    /// space N levels below.
    pub origin_depth: u32,
}

impl KeyDefinition {
    pub fn new(key: impl Into<String>, node: Rc<KeyNode>, origin_depth: u32) -> Self {
        Self {
            key: key.into(),
            node,
            origin_depth,
        }
    }

    /// The same definition under another name, one level further from
    /// its origin.
    pub fn derive(&self, key: impl Into<String>) -> Self {
        Self::new(key, Rc::clone(&self.node), self.origin_depth + 1)
    }

    pub fn node(&self) -> &Rc<KeyNode> {
        &self.node
    }

    pub fn document(&self) -> &Document {
        self.node.document()
    }

    pub fn element(&self) -> NodeId {
        self.node.element()
    }

    pub fn meta(&self) -> Option<NodeId> {
        self.node.meta()
    }

    pub fn attribute(&self, ns: Option<&str>, local: &str) -> Option<&str> {
        self.node.attribute(ns, local)
    }

    /// Absolute href, ready to use.
    pub fn href(&self) -> Option<&str> {
        self.node.quick().href.as_deref()
    }

    /// True if the author wrote the href as an absolute URL.
    pub fn is_absolute_href(&self) -> bool {
        self.node.quick().is_absolute
    }

    pub fn url(&self) -> Option<&Url> {
        self.node.quick().url.as_ref()
    }

    /// Text of the first keyword, else of the link text, else of the
    /// whole metadata, with whitespace collapsed.
    pub fn text(&self) -> Option<&str> {
        self.node.quick().text.as_deref()
    }

    /// True if both definitions are bound to the same topicref.
    pub fn same_node(&self, other: &KeyDefinition) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl PartialEq for KeyDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for KeyDefinition {}

impl PartialOrd for KeyDefinition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyDefinition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
