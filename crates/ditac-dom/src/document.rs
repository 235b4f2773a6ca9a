/*
 * document.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Arena document tree: navigation, attributes, mutation and user data.
 */

use crate::class::{ElementKind, class_has_token, default_class};
use crate::text::is_xml_space;
use crate::types::{Attribute, Element, NodeData, NodeId, NodeKind, QName, XML_NS};
use ditac_diagnostics::SourceLocation;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use url::Url;

/// Distinguishes generated ids of different documents.
static DOCUMENT_SERIAL: AtomicU32 = AtomicU32::new(1);

/// A parsed or synthesized document.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Removing a node
/// detaches it; the slot stays allocated but is no longer reachable from
/// [`Document::root`].
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    uri: Option<Url>,
    serial: u32,
    next_id: u32,
    user_data: HashMap<(NodeId, &'static str), Rc<dyn Any>>,
}

/// An owned copy of a subtree, used to move nodes between arenas.
struct OwnedNode {
    kind: NodeKind,
    location: Option<SourceLocation>,
    children: Vec<OwnedNode>,
}

impl Document {
    /// A document holding a single, empty document element.
    pub fn new(root: QName) -> Self {
        let mut doc = Self::empty();
        doc.root = doc.push(NodeData::new(NodeKind::Element(Element::new(root)), None));
        doc
    }

    pub(crate) fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            root: NodeId(0),
            uri: None,
            serial: DOCUMENT_SERIAL.fetch_add(1, Ordering::Relaxed),
            next_id: 0,
            user_data: HashMap::new(),
        }
    }

    /// A standalone document whose document element is a deep copy of
    /// `id` from `src`.
    pub fn from_subtree(src: &Document, id: NodeId) -> Self {
        let mut doc = Self::empty();
        doc.uri = src.uri.clone();
        doc.root = doc.import(src, id);
        doc
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        id
    }

    pub(crate) fn push_node(&mut self, kind: NodeKind, location: Option<SourceLocation>) -> NodeId {
        self.push(NodeData::new(kind, location))
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = id;
    }

    /// The document element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    pub fn set_uri(&mut self, uri: Option<Url>) {
        self.uri = uri;
    }

    // ---------------------------------------------------------------
    // Node access
    // ---------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).as_element()
    }

    pub(crate) fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    /// Local name of an element; empty for other nodes.
    pub fn local_name(&self, id: NodeId) -> &str {
        self.element(id).map_or("", |e| e.name.local.as_str())
    }

    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.name.ns.as_deref())
    }

    /// True for elements in no namespace, i.e. vocabulary elements.
    pub fn is_vocabulary_element(&self, id: NodeId) -> bool {
        self.element(id).is_some_and(|e| e.name.ns.is_none())
    }

    /// Content of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Target and data of a processing instruction.
    pub fn processing_instruction(&self, id: NodeId) -> Option<(&str, &str)> {
        match &self.node(id).kind {
            NodeKind::ProcessingInstruction { target, data } => Some((target, data)),
            _ => None,
        }
    }

    pub fn kind(&self, id: NodeId) -> ElementKind {
        self.element(id).map_or(ElementKind::empty(), Element::kind)
    }

    pub fn is(&self, id: NodeId, kind: ElementKind) -> bool {
        self.kind(id).contains(kind)
    }

    /// The explicit class attribute, else the default class for the name.
    pub fn class(&self, id: NodeId) -> Option<&str> {
        let element = self.element(id)?;
        if element.name.ns.is_some() {
            return element.attribute(None, "class");
        }
        element
            .attribute(None, "class")
            .or_else(|| default_class(&element.name.local))
    }

    /// True if the effective class lists `token`, e.g. `"map/topicref"`.
    pub fn has_class(&self, id: NodeId, token: &str) -> bool {
        self.class(id).is_some_and(|class| class_has_token(class, token))
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map_or(&[], |e| e.attributes.as_slice())
    }

    /// Attribute in no namespace.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attribute_ns(id, None, local)
    }

    pub fn attribute_ns(&self, id: NodeId, ns: Option<&str>, local: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(ns, local))
    }

    /// Trimmed attribute value; empty values count as absent.
    pub fn non_empty_attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.non_empty_attribute_ns(id, None, local)
    }

    pub fn non_empty_attribute_ns(&self, id: NodeId, ns: Option<&str>, local: &str) -> Option<&str> {
        self.attribute_ns(id, ns, local)
            .map(|v| v.trim_matches(is_xml_space))
            .filter(|v| !v.is_empty())
    }

    pub fn has_attribute(&self, id: NodeId, local: &str) -> bool {
        self.attribute(id, local).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, local: &str, value: impl Into<String>) {
        self.set_attribute_qname(id, QName::local(local), value);
    }

    /// Set an attribute, replacing any attribute with the same `(ns, local)`.
    pub fn set_attribute_qname(&mut self, id: NodeId, name: QName, value: impl Into<String>) {
        let value = value.into();
        let refresh = name.ns.is_none() && name.local == "class";
        let Some(element) = self.element_mut(id) else {
            return;
        };
        match element.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => element.attributes.push(Attribute { name, value }),
        }
        if refresh {
            element.refresh_kind();
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, local: &str) -> Option<String> {
        self.remove_attribute_ns(id, None, local)
    }

    pub fn remove_attribute_ns(&mut self, id: NodeId, ns: Option<&str>, local: &str) -> Option<String> {
        let element = self.element_mut(id)?;
        let index = element
            .attributes
            .iter()
            .position(|a| a.name.matches(ns, local))?;
        let removed = element.attributes.remove(index);
        if ns.is_none() && local == "class" {
            element.refresh_kind();
        }
        Some(removed.value)
    }

    /// Resolve a namespace prefix in scope at `id`. `""` is the default
    /// namespace; `xml` is always bound.
    pub fn lookup_namespace(&self, id: NodeId, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(element) = self.element(node)
                && let Some((_, uri)) = element.namespaces.iter().find(|(p, _)| p == prefix)
            {
                return (!uri.is_empty()).then(|| uri.clone());
            }
            current = self.parent(node);
        }
        None
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&child| self.is_element(child))
    }

    pub fn first_child_element(&self, id: NodeId) -> Option<NodeId> {
        self.child_elements(id).next()
    }

    fn sibling(&self, id: NodeId, offset: isize) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&c| c == id)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.sibling(id, -1)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.sibling(id, 1)
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// Every node below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        result
    }

    pub fn ancestor_by_kind(&self, id: NodeId, kind: ElementKind) -> Option<NodeId> {
        self.ancestors(id).find(|&a| self.is(a, kind))
    }

    pub fn ancestor_or_self_by_kind(&self, id: NodeId, kind: ElementKind) -> Option<NodeId> {
        if self.is(id, kind) {
            Some(id)
        } else {
            self.ancestor_by_kind(id, kind)
        }
    }

    pub fn child_by_kind(&self, id: NodeId, kind: ElementKind) -> Option<NodeId> {
        self.child_elements(id).find(|&c| self.is(c, kind))
    }

    pub fn children_by_kind(&self, id: NodeId, kind: ElementKind) -> Vec<NodeId> {
        self.child_elements(id).filter(|&c| self.is(c, kind)).collect()
    }

    pub fn child_by_class(&self, id: NodeId, token: &str) -> Option<NodeId> {
        self.child_elements(id).find(|&c| self.has_class(c, token))
    }

    pub fn children_by_class(&self, id: NodeId, token: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .filter(|&c| self.has_class(c, token))
            .collect()
    }

    /// True if `id` is the document element or one of its descendants.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    // ---------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------

    /// True if `id` has a child element or non-whitespace text.
    pub fn has_content(&self, id: NodeId) -> bool {
        self.children(id).iter().any(|&child| match &self.node(child).kind {
            NodeKind::Element(_) => true,
            NodeKind::Text(text) => !text.chars().all(is_xml_space),
            _ => false,
        })
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    /// Where `id` comes from; falls back to the document URI.
    pub fn location(&self, id: NodeId) -> SourceLocation {
        match &self.node(id).location {
            Some(location) => location.clone(),
            None => match &self.uri {
                Some(uri) => SourceLocation::document(uri.as_str()),
                None => SourceLocation::default(),
            },
        }
    }

    pub fn set_location(&mut self, id: NodeId, location: Option<SourceLocation>) {
        self.nodes[id.index()].location = location;
    }

    /// A fresh id, unique among generated ids of every document of this run.
    pub fn generate_id(&mut self) -> String {
        self.next_id += 1;
        format!("d{}e{}", self.serial, self.next_id)
    }

    // ---------------------------------------------------------------
    // Construction and mutation
    // ---------------------------------------------------------------

    /// A new detached element.
    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.push_node(NodeKind::Element(Element::new(name)), None)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Text(text.into()), None)
    }

    pub fn create_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> NodeId {
        self.push_node(
            NodeKind::ProcessingInstruction {
                target: target.into(),
                data: data.into(),
            },
            None,
        )
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeKind::Comment(text.into()), None)
    }

    /// Remove `id` from its parent. The node and its subtree stay usable.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != id);
        }
    }

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None` or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let siblings = &mut self.nodes[parent.index()].children;
        let index = reference
            .and_then(|r| siblings.iter().position(|&c| c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child.index()].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` right after `reference`, a child of `parent`.
    pub fn insert_after(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        let next = self.next_sibling(reference);
        self.insert_before(parent, child, next);
    }

    /// Put `replacement` where `old` is and detach `old`.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        if let Some(parent) = self.parent(old) {
            self.insert_before(parent, replacement, Some(old));
            self.detach(old);
        }
    }

    pub fn remove_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.index()].children);
        for child in children {
            self.nodes[child.index()].parent = None;
        }
    }

    fn snapshot(&self, id: NodeId) -> OwnedNode {
        let data = self.node(id);
        OwnedNode {
            kind: data.kind.clone(),
            location: data.location.clone(),
            children: data.children.iter().map(|&c| self.snapshot(c)).collect(),
        }
    }

    fn materialize(&mut self, owned: OwnedNode) -> NodeId {
        let id = self.push_node(owned.kind, owned.location);
        for child in owned.children {
            let child_id = self.materialize(child);
            self.nodes[child_id.index()].parent = Some(id);
            self.nodes[id.index()].children.push(child_id);
        }
        id
    }

    /// Deep copy of `id` inside this document, returned detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let owned = self.snapshot(id);
        self.materialize(owned)
    }

    /// Deep copy of `id` from another document, returned detached.
    ///
    /// Locations and element kinds are preserved; user data is not.
    pub fn import(&mut self, src: &Document, id: NodeId) -> NodeId {
        let owned = src.snapshot(id);
        self.materialize(owned)
    }

    // ---------------------------------------------------------------
    // User data
    // ---------------------------------------------------------------

    pub fn set_user_data(&mut self, id: NodeId, key: &'static str, value: Rc<dyn Any>) {
        self.user_data.insert((id, key), value);
    }

    pub fn user_data(&self, id: NodeId, key: &'static str) -> Option<&Rc<dyn Any>> {
        self.user_data.get(&(id, key))
    }

    /// Typed access to user data; `None` when absent or of another type.
    pub fn user_data_as<T: Any>(&self, id: NodeId, key: &'static str) -> Option<Rc<T>> {
        self.user_data(id, key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn remove_user_data(&mut self, id: NodeId, key: &'static str) -> Option<Rc<dyn Any>> {
        self.user_data.remove(&(id, key))
    }
}

impl Clone for Document {
    /// A deep copy with its own id serial, so ids generated in the copy
    /// never collide with those of the original.
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            root: self.root,
            uri: self.uri.clone(),
            serial: DOCUMENT_SERIAL.fetch_add(1, Ordering::Relaxed),
            next_id: self.next_id,
            user_data: self.user_data.clone(),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("uri", &self.uri.as_ref().map(Url::as_str))
            .field("root", &self.name(self.root).map(QName::qualified))
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
