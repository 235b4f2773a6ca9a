/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Collection of the key definitions of a map into key spaces. Key
 * definitions may reference other keys, so collection is repeated until
 * nothing changes.
 */

use super::definition::{KeyDefinition, KeyNode};
use super::space::KeySpaceId;
use super::spaces::KeySpaces;
use crate::dita;
use crate::documents::LoadedDocuments;
use crate::error::{PreprocessError, Result};
use crate::filter::Filters;
use crate::resolve::add_metadata;
use crate::simplify::MapSimplifier;
use crate::uri;
use crate::vocab::{BEGIN_GROUP_PI, DITAC_NS, END_GROUP_PI, KEY_SPACE, KEY_SPACE_START, LINKING_ATTRIBUTES, linking_name};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::text::split_list;
use ditac_dom::{Document, ElementKind, NodeId, QName};
use std::rc::Rc;
use std::time::Instant;
use url::Url;

/// Upper bound on the number of collection passes.
///
/// Each pass resolves the key definitions whose `keyref` points at a key
/// collected by an earlier pass. The bound only matters for keyref cycles,
/// which never converge.
pub const MAX_PASSES: usize = 10;

const LAST_PASS: usize = MAX_PASSES - 1;

/// Attributes of a key definition which are not copied to the
/// stand-alone topicref bound to its keys.
const SKIPPED_ATTRIBUTES: [&str; 6] = ["keys", "processing-role", "id", "class", "keyref", "keyscope"];

/// Builds the [`KeySpaces`] of a map.
///
/// The loader works on a private copy of the map: collecting keys strips
/// `keys` and `keyref` from the definitions it consumes.
pub struct KeyLoader {
    sink: DiagnosticSink,
    map: Option<Document>,
    filters: Option<Filters>,
    passes: usize,
}

impl KeyLoader {
    pub fn new(sink: DiagnosticSink) -> Self {
        Self {
            sink,
            map: None,
            filters: None,
            passes: 0,
        }
    }

    /// Filters applied to the private map copy before collecting keys.
    pub fn set_filters(&mut self, filters: Option<Filters>) {
        self.filters = filters;
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    /// Number of passes made by the last [`KeyLoader::create_key_spaces`].
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Take a simplified copy of `map`.
    ///
    /// `map` must not have been resolved yet. Submaps are read through the
    /// source of `docs`.
    pub fn prepare_map(&mut self, map: &Document, url: &Url, docs: &LoadedDocuments) -> Result<()> {
        let simplified = MapSimplifier::new(docs, None).simplify(map.clone(), url)?;
        self.map = Some(simplified.document);
        Ok(())
    }

    /// Collect every key definition of the prepared map.
    ///
    /// Topics bound to keys are preloaded into `docs` to find their first
    /// topic id and title.
    pub fn create_key_spaces(&mut self, docs: &mut LoadedDocuments) -> Result<KeySpaces> {
        let map = self
            .map
            .as_mut()
            .ok_or_else(|| PreprocessError::Internal("no map prepared for key collection".to_string()))?;
        if let Some(filters) = self.filters.as_mut() {
            filters.filter_map(map);
        }

        let mut key_spaces = KeySpaces::new();
        let root = map.root();
        if let Some(keyscope) = map.non_empty_attribute(root, "keyscope") {
            let space = key_spaces.root();
            key_spaces.space_mut(space).init_keyscope_names(Some(keyscope));
        }

        let started = Instant::now();
        let mut collector = Collector {
            sink: &self.sink,
            map,
            docs,
            key_spaces: &mut key_spaces,
            stack: Vec::new(),
            keyref_count: 0,
            last_pass: false,
        };
        collector.stack.push(collector.key_spaces.root());

        let mut previous_count = None;
        let mut passes = 0;
        let mut pass = 0;
        while pass <= LAST_PASS {
            passes += 1;
            collector.keyref_count = 0;
            collector.last_pass = pass == LAST_PASS;
            collector.collect_keys(root)?;
            tracing::debug!(pass, deferred = collector.keyref_count, "key collection pass");

            if collector.keyref_count == 0 {
                break;
            }
            if previous_count == Some(collector.keyref_count) {
                // No progress: the next pass is the last one.
                pass = LAST_PASS - 1;
            }
            previous_count = Some(collector.keyref_count);
            pass += 1;
        }

        self.passes = passes;
        tracing::debug!(
            passes,
            spaces = key_spaces.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "keys collected"
        );
        Ok(key_spaces)
    }
}

/// State of one collection pass over the map.
struct Collector<'a> {
    sink: &'a DiagnosticSink,
    map: &'a mut Document,
    docs: &'a mut LoadedDocuments,
    key_spaces: &'a mut KeySpaces,
    stack: Vec<KeySpaceId>,
    /// Definitions deferred because their keyref is not resolved yet.
    keyref_count: usize,
    last_pass: bool,
}

impl Collector<'_> {
    fn current(&self) -> KeySpaceId {
        self.stack.last().copied().unwrap_or(self.key_spaces.root())
    }

    fn collect_keys(&mut self, element: NodeId) -> Result<()> {
        let children = self.map.children(element).to_vec();
        for child in children {
            if let Some((target, data)) = self.map.processing_instruction(child) {
                if target == BEGIN_GROUP_PI {
                    let space = dita::parse_pseudo_attribute(KEY_SPACE_START, data)
                        .zip(dita::parse_pseudo_attribute("keyscope=\"", data));
                    let Some((id, keyscope)) = space else {
                        return Err(PreprocessError::InvalidKeyscopePi {
                            target: target.to_string(),
                            data: data.to_string(),
                            location: Some(self.map.location(element)),
                        });
                    };
                    let parent = self.current();
                    let space = self.key_spaces.add_key_space(&id, Some(&keyscope), parent);
                    self.stack.push(space);
                } else if target == END_GROUP_PI && self.stack.len() > 1 {
                    self.stack.pop();
                }
            } else if self.map.is_element(child) {
                let pushed = self.push_key_space(child)?;
                self.collect_definition(child)?;
                self.collect_keys(child)?;
                if pushed {
                    self.stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Enter the key space opened by `element`, if any.
    fn push_key_space(&mut self, element: NodeId) -> Result<bool> {
        let Some(id) = self.map.non_empty_attribute_ns(element, Some(DITAC_NS), KEY_SPACE) else {
            return Ok(false);
        };
        let Some(keyscope) = self.map.non_empty_attribute(element, "keyscope") else {
            return Err(PreprocessError::MissingKeyscope {
                id: id.to_string(),
                location: Some(self.map.location(element)),
            });
        };
        let parent = self.current();
        let space = self.key_spaces.add_key_space(id, Some(keyscope), parent);
        self.stack.push(space);
        Ok(true)
    }

    fn ignoring(&self, element: NodeId, attr: &str, keys: &str) {
        self.sink.warning(
            "D-3-1",
            format!("Ignoring attribute `{}` in the definition of key(s) `{}`", attr, keys),
            Some(self.map.location(element)),
        );
    }

    /// True if a definition has neither an href nor content of its own.
    fn is_empty_definition(&self, element: NodeId) -> bool {
        self.map.non_empty_attribute(element, "href").is_none() && !self.map.has_content(element)
    }

    fn collect_definition(&mut self, element: NodeId) -> Result<()> {
        if !self.map.is(element, ElementKind::TOPICREF) {
            return Ok(());
        }
        let Some(keys) = self.map.non_empty_attribute(element, "keys").map(str::to_string) else {
            return Ok(());
        };

        let mut add = true;
        let mut skip = false;
        if self.map.non_empty_attribute(element, "conkeyref").is_some() {
            self.ignoring(element, "conkeyref", &keys);
            skip = true;
        }

        if let Some(keyref) = self.map.non_empty_attribute(element, "keyref").map(str::to_string) {
            if keyref.contains('/') {
                // keys="a" keyref="b/c" binds nothing: the keyref names an
                // element, not a key definition.
                self.ignoring(element, "keyref", &keys);
                skip |= self.is_empty_definition(element);
            } else if let Some(kd) = self.key_spaces.get(&keyref, &*self.map, element).cloned() {
                copy_href(&kd, self.map, element);
                add_metadata(&kd, self.map, element);
            } else if self.last_pass {
                self.ignoring(element, "keyref", &keys);
                skip |= self.is_empty_definition(element);
            } else {
                add = false;
                self.keyref_count += 1;
            }
        }

        if skip {
            self.map.remove_attribute(element, "keys");
            self.map.remove_attribute(element, "keyref");
            self.sink.warning(
                "D-3-2",
                format!("Skipping the definition of key(s) `{}`", keys),
                Some(self.map.location(element)),
            );
        } else if add {
            self.map.remove_attribute(element, "keys");
            self.map.remove_attribute(element, "keyref");
            self.add_keys(&keys, element)?;
        }
        Ok(())
    }

    /// Bind each key of `keys` to a stand-alone copy of `element` in the
    /// current key space and derive `scope.key` bindings upwards.
    fn add_keys(&mut self, keys: &str, element: NodeId) -> Result<()> {
        let space = self.current();
        let keys: Vec<&str> = split_list(keys).collect();
        if keys.iter().all(|key| self.key_spaces.space(space).contains(key)) {
            return Ok(());
        }

        let mut node = Document::new(QName::local("topicref"));
        node.set_uri(self.map.uri().cloned());
        let topicref = node.root();
        node.set_attribute(topicref, "class", "- map/topicref ");
        node.set_location(topicref, Some(self.map.location(element)));

        let mut href = None;
        let mut scope = None;
        let mut format = None;
        for attr in self.map.attributes(element) {
            let value = attr.value.trim();
            let skipped = attr.name.ns.is_none() && SKIPPED_ATTRIBUTES.contains(&attr.name.local.as_str());
            if skipped || value.is_empty() {
                continue;
            }
            node.set_attribute_qname(topicref, attr.name.clone(), value);
            if attr.name.ns.is_none() {
                match attr.name.local.as_str() {
                    "href" => href = Some(value.to_string()),
                    "scope" => scope = Some(value.to_string()),
                    "format" => format = Some(value.to_ascii_lowercase()),
                    _ => {}
                }
            }
        }
        if let Some(meta) = self.map.child_by_kind(element, ElementKind::TOPICMETA) {
            let copy = node.import(&*self.map, meta);
            node.append_child(topicref, copy);
        }

        if let Some(href) = href {
            self.bind_first_topic(&mut node, element, &href, scope.as_deref(), format.as_deref())?;
        }

        let node = Rc::new(KeyNode::new(node));
        for key in keys {
            if self.key_spaces.space(space).contains(key) {
                continue;
            }
            let kd = KeyDefinition::new(key, Rc::clone(&node), 0);
            self.key_spaces.space_mut(space).set(kd.clone());
            add_to_ancestors(self.key_spaces, &kd, space);
        }
        Ok(())
    }

    /// Point an href designating a local topic document at its first
    /// topic, and give the definition that topic's title as link text.
    fn bind_first_topic(
        &mut self,
        node: &mut Document,
        element: NodeId,
        href: &str,
        scope: Option<&str>,
        format: Option<&str>,
    ) -> Result<()> {
        // The map has been resolved: hrefs are absolute.
        let Some(url) = uri::parse_absolute(href) else {
            return Ok(());
        };
        let is_topic = match format {
            Some(format) => format == "dita",
            None => matches!(uri::extension(&url).as_deref(), Some("dita" | "xml")),
        };
        let fragment = uri::fragment(&url);
        if !matches!(fragment.as_deref(), None | Some(".")) || scope.is_some_and(|s| s != "local") || !is_topic {
            return Ok(());
        }

        let original = dita::original_topic_url(&*self.map, element, uri::without_fragment(&url));
        let loaded = self
            .docs
            .preload(&original)
            .map_err(|err| PreprocessError::load(&original, err))?;
        let Some(first) = loaded.first_topic() else {
            return Ok(());
        };
        let topicref = node.root();
        node.set_attribute(topicref, "href", uri::set_fragment(href, &first.id));

        let source = &loaded.document;
        let Some(title) = source.child_by_kind(first.element, ElementKind::TITLE) else {
            return Ok(());
        };
        let meta = match node.child_by_kind(topicref, ElementKind::TOPICMETA) {
            Some(meta) if node.child_by_kind(meta, ElementKind::LINKTEXT).is_some() => return Ok(()),
            Some(meta) => meta,
            None => {
                let meta = node.create_element(QName::local("topicmeta"));
                node.set_attribute(meta, "class", "- map/topicmeta ");
                node.append_child(topicref, meta);
                meta
            }
        };
        let linktext = node.create_element(QName::local("linktext"));
        node.set_attribute(linktext, "class", "- map/linktext ");
        for &child in source.children(title) {
            let copy = node.import(source, child);
            node.append_child(linktext, copy);
        }
        // Keep schema order: navtitle first, linktext next.
        let before = node
            .child_elements(meta)
            .find(|&c| !node.is(c, ElementKind::NAVTITLE));
        node.insert_before(meta, linktext, before);
        Ok(())
    }
}

/// Give `to` the linking attributes of the key definition it references,
/// unless it has an href of its own.
fn copy_href(kd: &KeyDefinition, doc: &mut Document, to: NodeId) {
    if doc.non_empty_attribute(to, "href").is_some() || kd.href().is_none() {
        return;
    }
    for (ns, local) in LINKING_ATTRIBUTES {
        match kd.attribute(ns, local) {
            Some(value) => doc.set_attribute_qname(to, linking_name(ns, local), value),
            None => {
                doc.remove_attribute_ns(to, ns, local);
            }
        }
    }
}

/// Bind `scope.key` in each ancestor of `space`, for each keyscope name of
/// the space below it. Existing ancestor bindings are kept.
fn add_to_ancestors(key_spaces: &mut KeySpaces, kd: &KeyDefinition, space: KeySpaceId) {
    let Some(parent) = key_spaces.space(space).parent() else {
        return;
    };
    let names = key_spaces.space(space).keyscope_names().to_vec();
    for name in names {
        let derived = kd.derive(format!("{}.{}", name, kd.key));
        if !key_spaces.space(parent).contains(&derived.key) {
            key_spaces.space_mut(parent).set(derived.clone());
        }
        add_to_ancestors(key_spaces, &derived, parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    const MAP_URL: &str = "file:///d/m.ditamap";

    fn load(map: &str, source: MemorySource) -> (KeySpaces, DiagnosticSink) {
        let (key_spaces, sink, _) = load_counting_passes(map, source);
        (key_spaces, sink)
    }

    fn load_counting_passes(map: &str, source: MemorySource) -> (KeySpaces, DiagnosticSink, usize) {
        let sink = DiagnosticSink::new();
        let mut docs = LoadedDocuments::new(Rc::new(source), sink.clone());
        let url = Url::parse(MAP_URL).unwrap();
        let map = Document::parse(map, Some(&url)).unwrap();
        let mut loader = KeyLoader::new(sink.clone());
        loader.prepare_map(&map, &url, &docs).unwrap();
        let key_spaces = loader.create_key_spaces(&mut docs).unwrap();
        (key_spaces, sink, loader.passes())
    }

    /// `a -> b -> c -> d`, with `d` bound to a topic.
    const CHAIN: [&str; 4] = [
        r#"<keydef keys="a" keyref="b"/>"#,
        r#"<keydef keys="b" keyref="c"/>"#,
        r#"<keydef keys="c" keyref="d"/>"#,
        r#"<keydef keys="d" href="b.dita"/>"#,
    ];

    fn chain_map(order: [usize; 4]) -> String {
        let defs: String = order.iter().map(|&i| CHAIN[i]).collect();
        format!("<map>{}</map>", defs)
    }

    fn href<'a>(key_spaces: &'a KeySpaces, space: KeySpaceId, key: &str) -> Option<&'a str> {
        key_spaces.space(space).get(key).and_then(KeyDefinition::href)
    }

    fn topics() -> MemorySource {
        MemorySource::new()
            .with("file:///d/topics/intro.dita", r#"<topic id="intro-topic"><title>Introduction</title></topic>"#)
            .with("file:///d/b.dita", r#"<topic id="b"><title>B</title></topic>"#)
    }

    #[test]
    fn test_href_points_at_first_topic() {
        let (key_spaces, sink) = load(
            r#"<map><keydef keys="intro" href="topics/intro.dita"/></map>"#,
            topics(),
        );
        let root = key_spaces.root();
        assert_eq!(
            href(&key_spaces, root, "intro"),
            Some("file:///d/topics/intro.dita#intro-topic")
        );
        assert_eq!(key_spaces.space(root).get("intro").and_then(KeyDefinition::text), Some("Introduction"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_authored_linktext_is_kept() {
        let (key_spaces, _) = load(
            r#"<map><keydef keys="intro" href="topics/intro.dita"><topicmeta><linktext>Start here</linktext></topicmeta></keydef></map>"#,
            topics(),
        );
        let root = key_spaces.root();
        assert_eq!(key_spaces.space(root).get("intro").and_then(KeyDefinition::text), Some("Start here"));
    }

    #[test]
    fn test_deferred_keyref_resolves_on_a_later_pass() {
        let (key_spaces, sink) = load(
            r#"<map>
  <keydef keys="a" keyref="b"/>
  <keydef keys="b" href="b.dita"/>
</map>"#,
            topics(),
        );
        let root = key_spaces.root();
        assert_eq!(href(&key_spaces, root, "a"), Some("file:///d/b.dita#b"));
        assert_eq!(href(&key_spaces, root, "b"), Some("file:///d/b.dita#b"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_chain_converges_within_its_depth_plus_one() {
        // Worst order: each pass only binds the key the previous one made
        // resolvable.
        let (key_spaces, sink, passes) = load_counting_passes(&chain_map([0, 1, 2, 3]), topics());
        assert_eq!(passes, 4);
        for key in ["a", "b", "c", "d"] {
            assert_eq!(href(&key_spaces, key_spaces.root(), key), Some("file:///d/b.dita#b"));
        }
        assert!(sink.is_empty());

        let (_, _, passes) = load_counting_passes(&chain_map([3, 2, 1, 0]), topics());
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_definition_order_does_not_change_the_bindings() {
        let orders = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
            [3, 0, 2, 1],
        ];
        for order in orders {
            let (key_spaces, sink, passes) = load_counting_passes(&chain_map(order), topics());
            assert!(passes <= 4, "{:?} took {} passes", order, passes);
            let root = key_spaces.root();
            let bindings: Vec<_> = ["a", "b", "c", "d"]
                .iter()
                .map(|key| href(&key_spaces, root, key))
                .collect();
            assert_eq!(bindings, [Some("file:///d/b.dita#b"); 4], "{:?}", order);
            assert!(sink.is_empty(), "{:?}", order);
        }
    }

    #[test]
    fn test_first_definition_wins() {
        let (key_spaces, _) = load(
            r#"<map>
  <keydef keys="k" href="b.dita"/>
  <keydef keys="k" href="topics/intro.dita"/>
</map>"#,
            topics(),
        );
        assert_eq!(href(&key_spaces, key_spaces.root(), "k"), Some("file:///d/b.dita#b"));
    }

    #[test]
    fn test_keyscope_names_propagate_upwards() {
        let (key_spaces, _) = load(
            r#"<map>
  <topicgroup keyscope="lib util">
    <keydef keys="x" href="b.dita"/>
  </topicgroup>
</map>"#,
            topics(),
        );
        let root = key_spaces.root();
        let lib = key_spaces.by_id("1").unwrap();
        let local = key_spaces.space(lib).get("x").unwrap();
        for name in ["lib.x", "util.x"] {
            let derived = key_spaces.space(root).get(name).unwrap();
            assert!(derived.same_node(local));
            assert_eq!(derived.origin_depth, 1);
        }
        assert!(!key_spaces.space(root).contains("x"));
    }

    #[test]
    fn test_keyref_cycle_gives_up_with_warnings() {
        let (key_spaces, sink) = load(
            r#"<map>
  <keydef keys="a" keyref="b"/>
  <keydef keys="b" keyref="a"/>
</map>"#,
            topics(),
        );
        assert!(key_spaces.space(key_spaces.root()).is_empty());
        assert_eq!(sink.count_code("D-3-1"), 2);
        assert_eq!(sink.count_code("D-3-2"), 2);
    }

    #[test]
    fn test_conkeyref_in_definition_is_skipped() {
        let (key_spaces, sink) = load(
            r#"<map><keydef keys="a" href="b.dita" conkeyref="x/y"/></map>"#,
            topics(),
        );
        assert!(!key_spaces.space(key_spaces.root()).contains("a"));
        assert_eq!(sink.count_code("D-3-1"), 1);
        assert_eq!(sink.count_code("D-3-2"), 1);
    }

    #[test]
    fn test_keyref_to_element_is_ignored() {
        let (key_spaces, sink) = load(
            r#"<map><keydef keys="a" keyref="other/id" href="b.dita"/></map>"#,
            topics(),
        );
        assert_eq!(href(&key_spaces, key_spaces.root(), "a"), Some("file:///d/b.dita#b"));
        assert_eq!(sink.count_code("D-3-1"), 1);
        assert_eq!(sink.count_code("D-3-2"), 0);
    }

    #[test]
    fn test_unprepared_loader_is_an_error() {
        let sink = DiagnosticSink::new();
        let mut docs = LoadedDocuments::new(Rc::new(MemorySource::new()), sink.clone());
        let err = KeyLoader::new(sink).create_key_spaces(&mut docs).unwrap_err();
        assert!(matches!(err, PreprocessError::Internal(_)));
    }
}
