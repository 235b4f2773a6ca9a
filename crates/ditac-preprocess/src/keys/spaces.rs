/*
 * spaces.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The key scopes of one run and the mapping from topics and map
 * locations to the scope owning them.
 */

use super::definition::KeyDefinition;
use super::space::{KeySpace, KeySpaceId};
use crate::dita;
use crate::documents::LoadedDocuments;
use crate::error::{PreprocessError, Result};
use crate::uri;
use crate::vocab::{BEGIN_GROUP_PI, DITAC_NS, END_GROUP_PI, KEY_SPACE, KEY_SPACE_START, ROOT_KEY_SPACE_ID};
use ditac_dom::{Document, ElementKind, NodeId, NodeKind};
use std::collections::HashMap;
use std::fmt;

/// Arena of key scopes. Index 0 is the root scope.
#[derive(Debug, Clone)]
pub struct KeySpaces {
    spaces: Vec<KeySpace>,
    by_id: HashMap<String, KeySpaceId>,
    /// Topic location (`url#topic_id`) to owning scope.
    topic_to_scope: HashMap<String, KeySpaceId>,
}

impl Default for KeySpaces {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySpaces {
    /// A forest holding only an empty root scope.
    pub fn new() -> Self {
        let mut by_id = HashMap::new();
        by_id.insert(ROOT_KEY_SPACE_ID.to_string(), KeySpaceId(0));
        Self {
            spaces: vec![KeySpace::new(ROOT_KEY_SPACE_ID, None)],
            by_id,
            topic_to_scope: HashMap::new(),
        }
    }

    pub fn root(&self) -> KeySpaceId {
        KeySpaceId(0)
    }

    pub fn space(&self, id: KeySpaceId) -> &KeySpace {
        &self.spaces[id.0]
    }

    pub fn space_mut(&mut self, id: KeySpaceId) -> &mut KeySpace {
        &mut self.spaces[id.0]
    }

    /// The scope stamped `ditac:keySpace="id"`.
    pub fn by_id(&self, id: &str) -> Option<KeySpaceId> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// The scope with `id`, created as a child of `parent` when it does
    /// not exist yet.
    pub fn add_key_space(&mut self, id: &str, keyscope: Option<&str>, parent: KeySpaceId) -> KeySpaceId {
        if let Some(existing) = self.by_id(id) {
            return existing;
        }
        let space_id = KeySpaceId(self.spaces.len());
        let mut space = KeySpace::new(id, keyscope);
        space.parent = Some(parent);
        self.spaces.push(space);
        self.by_id.insert(id.to_string(), space_id);
        self.spaces[parent.0].add_child(space_id);
        space_id
    }

    /// `space` followed by its ancestors, root last.
    pub fn ancestry(&self, space: KeySpaceId) -> Vec<KeySpaceId> {
        let mut chain = vec![space];
        let mut current = space;
        while let Some(parent) = self.spaces[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Definition of `key` as seen from `node`.
    pub fn get(&self, key: &str, doc: &Document, node: NodeId) -> Option<&KeyDefinition> {
        let space = self.get_key_space(doc, node)?;
        self.lookup_key_definition(space, key)
    }

    /// Resolved href of `key` as seen from `node`.
    pub fn get_href(&self, key: &str, doc: &Document, node: NodeId) -> Option<&str> {
        self.get(key, doc, node).and_then(KeyDefinition::href)
    }

    /// The scope owning `node`.
    ///
    /// Inside a topic this is the scope the map assigned to the topic,
    /// falling back to the root. Inside a map it is the nearest enclosing
    /// `ditac:keySpace` element or open begin-group marker. Returns `None`
    /// for a scope id this forest does not know.
    pub fn get_key_space(&self, doc: &Document, node: NodeId) -> Option<KeySpaceId> {
        if let Some(topic) = doc.ancestor_or_self_by_kind(node, ElementKind::TOPIC) {
            let scope = doc
                .uri()
                .zip(doc.non_empty_attribute(topic, "id"))
                .and_then(|(url, id)| self.topic_to_scope.get(&uri::topic_location(url, id)));
            return Some(scope.copied().unwrap_or(self.root()));
        }

        match enclosing_key_space_id(doc, node) {
            None => Some(self.root()),
            Some(id) => {
                let found = self.by_id(&id);
                if found.is_none() {
                    tracing::debug!(id = %id, "unknown key space id");
                }
                found
            }
        }
    }

    /// Definition of `key` in `space` or one of its ancestors.
    ///
    /// The chain is scanned from the root down, so an ancestor binding of
    /// the same name shadows the one in `space`.
    pub fn lookup_key_definition(&self, space: KeySpaceId, key: &str) -> Option<&KeyDefinition> {
        if space == self.root() {
            return self.spaces[space.0].get(key);
        }
        self.ancestry(space)
            .into_iter()
            .rev()
            .find_map(|id| self.spaces[id.0].get(key))
    }

    /// Scope assigned to the topic at `location` (`url#topic_id`).
    pub fn topic_scope(&self, location: &str) -> Option<KeySpaceId> {
        self.topic_to_scope.get(location).copied()
    }

    pub fn set_topic_scope(&mut self, location: impl Into<String>, space: KeySpaceId) {
        self.topic_to_scope.insert(location.into(), space);
    }

    /// Record which scope owns each topic referenced by `map`.
    ///
    /// The topic documents are preloaded into `docs`; the topics of a
    /// topicref are chosen the way chunking selects them.
    pub fn map_topics_to_key_spaces(&mut self, map: &Document, docs: &mut LoadedDocuments) -> Result<()> {
        self.topic_to_scope.clear();
        let mut stack = vec![self.root()];
        self.map_topics(map, map.root(), &mut stack, docs)?;
        tracing::debug!(topics = self.topic_to_scope.len(), "mapped topics to key spaces");
        Ok(())
    }

    fn map_topics(
        &mut self,
        map: &Document,
        element: NodeId,
        stack: &mut Vec<KeySpaceId>,
        docs: &mut LoadedDocuments,
    ) -> Result<()> {
        let pushed = match map.non_empty_attribute_ns(element, Some(DITAC_NS), KEY_SPACE) {
            Some(id) => {
                stack.push(self.require(id, map, element)?);
                true
            }
            None => false,
        };

        if map.is(element, ElementKind::TOPICREF) {
            self.map_topicref(map, element, stack, docs)?;
        }

        for &child in map.children(element) {
            match &map.node(child).kind {
                NodeKind::Element(_) => self.map_topics(map, child, stack, docs)?,
                NodeKind::ProcessingInstruction { target, data } if target == BEGIN_GROUP_PI => {
                    let id = dita::parse_pseudo_attribute(KEY_SPACE_START, data).ok_or_else(|| {
                        PreprocessError::InvalidKeyscopePi {
                            target: target.clone(),
                            data: data.clone(),
                            location: Some(map.location(child)),
                        }
                    })?;
                    stack.push(self.require(&id, map, child)?);
                }
                NodeKind::ProcessingInstruction { target, .. } if target == END_GROUP_PI => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                _ => {}
            }
        }

        if pushed {
            stack.pop();
        }
        Ok(())
    }

    fn map_topicref(
        &mut self,
        map: &Document,
        topicref: NodeId,
        stack: &[KeySpaceId],
        docs: &mut LoadedDocuments,
    ) -> Result<()> {
        let Some(url) = dita::local_topic_url(map, topicref) else {
            return Ok(());
        };
        let topic_id = uri::topic_id(&url);
        let doc_url = uri::without_fragment(&url);
        let original = dita::original_topic_url(map, topicref, doc_url.clone());

        let loaded = match docs.preload(&original) {
            Ok(loaded) => loaded,
            Err(err) => {
                docs.sink().push(err.to_diagnostic());
                return Ok(());
            }
        };
        if !loaded.doc_type.has_topics() {
            return Ok(());
        }

        let select = dita::chunk_select(map, topicref, topic_id.is_some());
        let ids = loaded
            .select_topics(topic_id.as_deref(), select)
            .ok_or_else(|| PreprocessError::TopicNotFound {
                id: topic_id.clone().unwrap_or_default(),
                url: original.to_string(),
                location: Some(map.location(topicref)),
            })?;
        let scope = stack.last().copied().unwrap_or(self.root());
        for id in ids {
            self.topic_to_scope.insert(uri::topic_location(&doc_url, &id), scope);
        }
        Ok(())
    }

    fn require(&self, id: &str, doc: &Document, node: NodeId) -> Result<KeySpaceId> {
        self.by_id(id).ok_or_else(|| PreprocessError::UnknownKeySpace {
            id: id.to_string(),
            location: Some(doc.location(node)),
        })
    }

    fn write_space(&self, id: KeySpaceId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let space = &self.spaces[id.0];
        f.write_str("---\n")?;
        write!(
            f,
            "KeySpace[id={}, keyscope={}, parent={}, children=",
            space.id,
            space.keyscope_names().join(" "),
            space.parent().map(|p| self.spaces[p.0].id.as_str()).unwrap_or_default()
        )?;
        let children: Vec<&str> = space.children().iter().map(|c| self.spaces[c.0].id.as_str()).collect();
        f.write_str(&children.join(" "))?;
        f.write_str(", definitions=\n")?;
        space.write_definitions(f)?;
        f.write_str("]\n---\n")?;
        for &child in space.children() {
            self.write_space(child, f)?;
        }
        Ok(())
    }
}

/// Id of the nearest scope enclosing a map node: a `ditac:keySpace`
/// attribute on the node or an ancestor, or an open begin-group marker
/// among their preceding siblings.
fn enclosing_key_space_id(doc: &Document, node: NodeId) -> Option<String> {
    let mut current = Some(node);
    while let Some(id) = current {
        if let Some(space) = doc.non_empty_attribute_ns(id, Some(DITAC_NS), KEY_SPACE) {
            return Some(space.to_string());
        }

        let mut nesting = 0usize;
        let mut sibling = doc.previous_sibling(id);
        while let Some(s) = sibling {
            if let Some((target, data)) = doc.processing_instruction(s) {
                if target == END_GROUP_PI {
                    nesting += 1;
                } else if target == BEGIN_GROUP_PI {
                    if nesting > 0 {
                        nesting -= 1;
                    } else if let Some(space) = dita::parse_pseudo_attribute(KEY_SPACE_START, data) {
                        return Some(space);
                    }
                }
            }
            sibling = doc.previous_sibling(s);
        }

        current = doc.parent(id);
    }
    None
}

impl fmt::Display for KeySpaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_space(self.root(), f)?;
        if !self.topic_to_scope.is_empty() {
            f.write_str("Topic URI to key space:")?;
            let mut entries: Vec<(&String, &KeySpaceId)> = self.topic_to_scope.iter().collect();
            entries.sort();
            for (location, space) in entries {
                write!(f, "\n{}={}", location, self.spaces[space.0].id)?;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}
