/*
 * documents.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The per-run document cache: loading, classification and topics.
 */

use crate::dita::{self, Select};
use crate::error::{PreprocessError, Result};
use crate::resolve::Resolver;
use crate::source::DocumentSource;
use crate::uri;
use crate::vocab::DITAARCH_NS;
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::{Document, ElementKind, NodeId};
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

const SUPPORTED_DITA_VERSIONS: [&str; 4] = ["1.0", "1.1", "1.2", "1.3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Map,
    Bookmap,
    /// A `<dita>` document holding several top-level topics.
    MultiTopic,
    Topic,
    Ditaval,
}

impl DocumentType {
    fn classify(doc: &Document) -> Option<Self> {
        let root = doc.root();
        if doc.namespace(root).is_some() {
            return None;
        }
        if doc.is(root, ElementKind::BOOKMAP) {
            Some(DocumentType::Bookmap)
        } else if doc.is(root, ElementKind::MAP) {
            Some(DocumentType::Map)
        } else if doc.is(root, ElementKind::TOPIC) {
            Some(DocumentType::Topic)
        } else {
            match doc.local_name(root) {
                "dita" => Some(DocumentType::MultiTopic),
                "val" => Some(DocumentType::Ditaval),
                _ => None,
            }
        }
    }

    pub fn is_map(self) -> bool {
        matches!(self, DocumentType::Map | DocumentType::Bookmap)
    }

    pub fn has_topics(self) -> bool {
        matches!(self, DocumentType::MultiTopic | DocumentType::Topic)
    }
}

/// A topic of a loaded document.
#[derive(Debug, Clone)]
pub struct LoadedTopic {
    pub element: NodeId,
    pub id: String,
    pub nested: Vec<LoadedTopic>,
    /// Set when topic filtering excludes the topic.
    pub excluded: bool,
}

impl LoadedTopic {
    fn collect(doc: &mut Document, element: NodeId) -> Self {
        let id = dita::ensure_valid_id(doc, element);
        let children = doc.children_by_kind(element, ElementKind::TOPIC);
        let nested = children
            .into_iter()
            .map(|child| LoadedTopic::collect(doc, child))
            .collect();
        LoadedTopic {
            element,
            id,
            nested,
            excluded: false,
        }
    }

    pub fn find(&self, id: &str) -> Option<&LoadedTopic> {
        if self.id == id {
            return Some(self);
        }
        self.nested.iter().find_map(|topic| topic.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut LoadedTopic> {
        if self.id == id {
            return Some(self);
        }
        self.nested.iter_mut().find_map(|topic| topic.find_mut(id))
    }
}

/// A document of the cache with its classification and topics.
#[derive(Debug)]
pub struct LoadedDocument {
    pub url: Url,
    pub doc_type: DocumentType,
    pub document: Document,
    topics: Vec<LoadedTopic>,
    processed: bool,
}

impl LoadedDocument {
    /// Classify `document` and collect its topics. Topics lacking a valid
    /// id get a generated one.
    pub fn new(url: Url, mut document: Document) -> Result<Self> {
        let doc_type = DocumentType::classify(&document).ok_or_else(|| {
            PreprocessError::UnsupportedDocument {
                url: url.to_string(),
                root: document
                    .name(document.root())
                    .map(|name| name.qualified())
                    .unwrap_or_default(),
            }
        })?;
        document.set_uri(Some(url.clone()));
        let root = document.root();
        let topics = match doc_type {
            DocumentType::Topic => vec![LoadedTopic::collect(&mut document, root)],
            DocumentType::MultiTopic => document
                .children_by_kind(root, ElementKind::TOPIC)
                .into_iter()
                .map(|topic| LoadedTopic::collect(&mut document, topic))
                .collect(),
            _ => Vec::new(),
        };
        Ok(LoadedDocument {
            url,
            doc_type,
            document,
            topics,
            processed: false,
        })
    }

    pub fn topics(&self) -> &[LoadedTopic] {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut [LoadedTopic] {
        &mut self.topics
    }

    pub fn first_topic(&self) -> Option<&LoadedTopic> {
        self.topics.first()
    }

    /// The topic of a document holding exactly one topic, nested ones
    /// included.
    pub fn single_topic(&self) -> Option<&LoadedTopic> {
        match self.topics.as_slice() {
            [topic] if topic.nested.is_empty() => Some(topic),
            _ => None,
        }
    }

    pub fn find_topic_by_id(&self, id: &str) -> Option<&LoadedTopic> {
        self.topics.iter().find_map(|topic| topic.find(id))
    }

    pub fn find_topic_by_id_mut(&mut self, id: &str) -> Option<&mut LoadedTopic> {
        self.topics.iter_mut().find_map(|topic| topic.find_mut(id))
    }

    /// Ids of the topics a topicref designates.
    ///
    /// `topic_id` addresses a topic, `None` the first one. A document
    /// holding a single topic always yields that topic. Returns `None`
    /// when `topic_id` is not found.
    pub fn select_topics(&self, topic_id: Option<&str>, select: Select) -> Option<Vec<String>> {
        let topic = match topic_id {
            Some(id) => self.find_topic_by_id(id)?,
            None => match self.first_topic() {
                Some(topic) => topic,
                None => return Some(Vec::new()),
            },
        };
        let mut ids = Vec::new();
        if self.single_topic().is_some() {
            ids.push(topic.id.clone());
            return Some(ids);
        }
        match select {
            Select::Topic => ids.push(topic.id.clone()),
            Select::Branch => collect_branch(topic, &mut ids),
            Select::Document => {
                for topic in &self.topics {
                    collect_branch(topic, &mut ids);
                }
            }
        }
        Some(ids)
    }

    /// Absolute location of `topic`: document URL plus `#id`.
    pub fn topic_href(&self, topic: &LoadedTopic) -> String {
        uri::topic_location(&self.url, &topic.id)
    }

    /// True once reference resolution has run on this document.
    pub fn is_processed(&self) -> bool {
        self.processed
    }
}

fn collect_branch(topic: &LoadedTopic, ids: &mut Vec<String>) {
    ids.push(topic.id.clone());
    for nested in &topic.nested {
        collect_branch(nested, ids);
    }
}

/// The documents of one run, keyed by URL without fragment.
///
/// A document is parsed at most once. [`LoadedDocuments::preload`] caches
/// it as is; [`LoadedDocuments::load`] with a resolver additionally runs
/// reference resolution on it, once.
pub struct LoadedDocuments {
    source: Rc<dyn DocumentSource>,
    sink: DiagnosticSink,
    documents: HashMap<Url, LoadedDocument>,
    check_dita_version: bool,
}

impl LoadedDocuments {
    pub fn new(source: Rc<dyn DocumentSource>, sink: DiagnosticSink) -> Self {
        Self {
            source,
            sink,
            documents: HashMap::new(),
            check_dita_version: true,
        }
    }

    /// An empty cache reading from the same source.
    pub fn sibling(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
            sink: self.sink.clone(),
            documents: HashMap::new(),
            check_dita_version: self.check_dita_version,
        }
    }

    pub fn set_check_dita_version(&mut self, check: bool) {
        self.check_dita_version = check;
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn source(&self) -> &Rc<dyn DocumentSource> {
        &self.source
    }

    /// Parse and cache the document at `url` without resolving anything.
    pub fn preload(&mut self, url: &Url) -> Result<&mut LoadedDocument> {
        let key = uri::without_fragment(url);
        if !self.documents.contains_key(&key) {
            let text = self.source.fetch(&key)?;
            let document = Document::parse(&text, Some(&key))?;
            let loaded = LoadedDocument::new(key.clone(), document)?;
            tracing::debug!(url = %key, doc_type = ?loaded.doc_type, "loaded document");
            self.documents.insert(key.clone(), loaded);
        }
        self.documents
            .get_mut(&key)
            .ok_or_else(|| PreprocessError::load(&key, "document vanished from cache"))
    }

    /// Load the document at `url`, running `resolver` on it unless that has
    /// already been done.
    pub fn load(&mut self, url: &Url, resolver: Option<&Resolver<'_>>) -> Result<&mut LoadedDocument> {
        let key = uri::without_fragment(url);
        self.preload(&key)?;
        if let Some(resolver) = resolver
            && let Some(mut loaded) = self.documents.remove(&key)
        {
            if !loaded.processed {
                self.promote(&mut loaded, resolver);
            }
            self.documents.insert(key.clone(), loaded);
        }
        self.documents
            .get_mut(&key)
            .ok_or_else(|| PreprocessError::load(&key, "document vanished from cache"))
    }

    /// Register an already parsed document, replacing any cached one.
    pub fn put(
        &mut self,
        url: &Url,
        document: Document,
        resolver: Option<&Resolver<'_>>,
    ) -> Result<&mut LoadedDocument> {
        let key = uri::without_fragment(url);
        let mut loaded = LoadedDocument::new(key.clone(), document)?;
        if let Some(resolver) = resolver {
            self.promote(&mut loaded, resolver);
        }
        self.documents.insert(key.clone(), loaded);
        self.documents
            .get_mut(&key)
            .ok_or_else(|| PreprocessError::load(&key, "document vanished from cache"))
    }

    /// Register a document which is already classified, e.g. one moved
    /// from another cache.
    pub fn insert(&mut self, loaded: LoadedDocument, resolver: Option<&Resolver<'_>>) {
        let mut loaded = loaded;
        if let Some(resolver) = resolver
            && !loaded.processed
        {
            self.promote(&mut loaded, resolver);
        }
        self.documents.insert(loaded.url.clone(), loaded);
    }

    fn promote(&mut self, loaded: &mut LoadedDocument, resolver: &Resolver<'_>) {
        resolver.process(loaded, self);
        loaded.processed = true;
        if self.check_dita_version {
            self.check_version(loaded);
        }
    }

    fn check_version(&self, loaded: &LoadedDocument) {
        let doc = &loaded.document;
        let checked: Vec<NodeId> = match loaded.doc_type {
            DocumentType::Ditaval => return,
            DocumentType::MultiTopic => loaded.topics.iter().map(|t| t.element).collect(),
            _ => vec![doc.root()],
        };
        for element in checked {
            match doc.non_empty_attribute_ns(element, Some(DITAARCH_NS), "DITAArchVersion") {
                None => tracing::debug!(url = %loaded.url, "no DITAArchVersion"),
                Some(version) if !SUPPORTED_DITA_VERSIONS.contains(&version) => {
                    self.sink.warning(
                        "D-4-4",
                        format!("Unsupported DITA version `{}`", version),
                        Some(doc.location(element)),
                    );
                }
                Some(_) => {}
            }
        }
    }

    pub fn get(&self, url: &Url) -> Option<&LoadedDocument> {
        self.documents.get(&uri::without_fragment(url))
    }

    pub fn get_mut(&mut self, url: &Url) -> Option<&mut LoadedDocument> {
        self.documents.get_mut(&uri::without_fragment(url))
    }

    pub fn remove(&mut self, url: &Url) -> Option<LoadedDocument> {
        self.documents.remove(&uri::without_fragment(url))
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.documents.contains_key(&uri::without_fragment(url))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedDocument> {
        self.documents.values()
    }

    /// Cached URLs in a stable order.
    pub fn urls(&self) -> Vec<Url> {
        let mut urls: Vec<Url> = self.documents.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Move every document out of the cache, in URL order.
    pub fn drain(&mut self) -> Vec<LoadedDocument> {
        let mut documents: Vec<LoadedDocument> = self.documents.drain().map(|(_, d)| d).collect();
        documents.sort_by(|a, b| a.url.cmp(&b.url));
        documents
    }
}

impl std::fmt::Debug for LoadedDocuments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocuments")
            .field("documents", &self.urls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn cache(source: MemorySource) -> LoadedDocuments {
        LoadedDocuments::new(Rc::new(source), DiagnosticSink::new())
    }

    #[test]
    fn test_classification() {
        let source = MemorySource::new()
            .with("file:///d/m.ditamap", "<map/>")
            .with("file:///d/b.ditamap", "<bookmap/>")
            .with("file:///d/t.dita", "<concept id='c'/>")
            .with("file:///d/all.dita", "<dita><topic id='a'/><task id='b'/></dita>")
            .with("file:///d/p.ditaval", "<val/>")
            .with("file:///d/x.xml", "<html/>");
        let mut docs = cache(source);
        let types: Vec<_> = ["m.ditamap", "b.ditamap", "t.dita", "all.dita", "p.ditaval"]
            .iter()
            .map(|name| {
                let url = Url::parse(&format!("file:///d/{}", name)).unwrap();
                docs.preload(&url).unwrap().doc_type
            })
            .collect();
        assert_eq!(
            types,
            vec![
                DocumentType::Map,
                DocumentType::Bookmap,
                DocumentType::Topic,
                DocumentType::MultiTopic,
                DocumentType::Ditaval
            ]
        );
        let err = docs
            .preload(&Url::parse("file:///d/x.xml").unwrap())
            .unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedDocument { .. }));
    }

    #[test]
    fn test_topics_get_ids() {
        let source = MemorySource::new().with(
            "file:///d/t.dita",
            "<topic><title>A</title><topic id='n'><title>B</title></topic></topic>",
        );
        let mut docs = cache(source);
        let loaded = docs.preload(&Url::parse("file:///d/t.dita#x").unwrap()).unwrap();
        let first = loaded.first_topic().unwrap();
        assert!(!first.id.is_empty());
        assert_eq!(first.nested.len(), 1);
        assert!(loaded.single_topic().is_none());
        assert!(loaded.find_topic_by_id("n").is_some());
        let href = loaded.topic_href(loaded.find_topic_by_id("n").unwrap());
        assert_eq!(href, "file:///d/t.dita#n");
    }

    #[test]
    fn test_select_topics() {
        let source = MemorySource::new().with(
            "file:///d/all.dita",
            "<dita><topic id='a'><topic id='a1'/></topic><topic id='b'/></dita>",
        );
        let mut docs = cache(source);
        let loaded = docs.preload(&Url::parse("file:///d/all.dita").unwrap()).unwrap();
        assert_eq!(loaded.select_topics(Some("a"), Select::Topic).unwrap(), ["a"]);
        assert_eq!(loaded.select_topics(Some("a"), Select::Branch).unwrap(), ["a", "a1"]);
        assert_eq!(
            loaded.select_topics(None, Select::Document).unwrap(),
            ["a", "a1", "b"]
        );
        assert!(loaded.select_topics(Some("zz"), Select::Topic).is_none());
    }

    #[test]
    fn test_preload_parses_once() {
        let source = MemorySource::new().with("file:///d/t.dita", "<topic/>");
        let mut docs = cache(source);
        let url = Url::parse("file:///d/t.dita").unwrap();
        let first = docs.preload(&url).unwrap().first_topic().unwrap().id.clone();
        let again = docs.preload(&url).unwrap().first_topic().unwrap().id.clone();
        assert_eq!(first, again);
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_unsupported_version_warns() {
        let source = MemorySource::new().with(
            "file:///d/t.dita",
            r#"<topic id="t" xmlns:ditaarch="http://dita.oasis-open.org/architecture/2005/" ditaarch:DITAArchVersion="2.0"/>"#,
        );
        let mut docs = cache(source);
        let sink = docs.sink().clone();
        let resolver = Resolver::new(None, sink.clone());
        docs.load(&Url::parse("file:///d/t.dita").unwrap(), Some(&resolver))
            .unwrap();
        assert_eq!(sink.count_code("D-4-4"), 1);
    }
}
