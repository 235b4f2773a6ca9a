//! Inclusion of submaps in place of the topicrefs referencing them.

use crate::dita;
use crate::documents::LoadedDocuments;
use crate::error::{PreprocessError, Result};
use crate::uri;
use crate::vocab::{BEGIN_GROUP_PI, DITAC_NS, END_GROUP_PI, KEY_SPACE, KEY_SPACE_START};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::text::merge_tokens;
use ditac_dom::{Document, ElementKind, NodeId};
use url::Url;

/// A topicref standing for a local map or a branch of one.
struct Mapref {
    element: NodeId,
    url: Url,
    target_id: Option<String>,
}

impl Mapref {
    fn href(&self) -> String {
        match &self.target_id {
            Some(id) => format!("{}#{}", self.url, uri::quote_fragment(id)),
            None => self.url.to_string(),
        }
    }
}

/// Nodes taking the place of a mapref, and nodes appended to the root of
/// the including map.
#[derive(Default)]
struct Copies {
    replacement: Vec<NodeId>,
    appended: Vec<NodeId>,
}

pub(crate) struct MaprefIncluder<'a> {
    sink: &'a DiagnosticSink,
}

impl<'a> MaprefIncluder<'a> {
    pub(crate) fn new(sink: &'a DiagnosticSink) -> Self {
        Self { sink }
    }

    /// Replace every mapref of `doc`, recursively. `stack` holds the maps
    /// being included, the including map last.
    pub(crate) fn include(&self, doc: &mut Document, docs: &mut LoadedDocuments, stack: &mut Vec<Url>) -> Result<()> {
        let maprefs: Vec<Mapref> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|element| detect_mapref(doc, element))
            .collect();

        for mapref in maprefs {
            // Gone with the replacement of an enclosing mapref.
            if !doc.is_attached(mapref.element) {
                continue;
            }
            if stack.contains(&mapref.url) {
                return Err(PreprocessError::CyclicMapref {
                    url: mapref.url.to_string(),
                    location: Some(doc.location(mapref.element)),
                });
            }

            let mut target_doc = docs.preload(&mapref.url)?.document.clone();
            let root = target_doc.root();
            if !target_doc.is(root, ElementKind::MAP) {
                return Err(PreprocessError::NotAMap {
                    url: mapref.url.to_string(),
                });
            }
            if target_doc.is(root, ElementKind::SUBJECT_SCHEME) {
                self.sink.warning(
                    "D-5-4",
                    format!("Ignoring subject scheme map `{}`", mapref.url),
                    Some(doc.location(mapref.element)),
                );
                doc.detach(mapref.element);
                continue;
            }

            stack.push(mapref.url.clone());
            self.include(&mut target_doc, docs, stack)?;
            stack.pop();

            let target = match &mapref.target_id {
                Some(id) => find_by_id(&target_doc, id),
                None => Some(root),
            }
            .ok_or_else(|| PreprocessError::MaprefTargetNotFound {
                href: mapref.href(),
                location: Some(doc.location(mapref.element)),
            })?;

            let mut copies = copy_target(doc, mapref.element, &target_doc, target);
            let ditavalrefs = dita::ditavalrefs(doc, mapref.element);
            if !ditavalrefs.is_empty() {
                copies.replacement = insert_ditavalrefs(doc, &ditavalrefs, &copies.replacement);
            }
            add_keyscope_group(doc, mapref.element, &target_doc, target, &mut copies);

            tracing::debug!(
                href = %mapref.href(),
                replacement = copies.replacement.len(),
                appended = copies.appended.len(),
                "included map"
            );
            if let Some(parent) = doc.parent(mapref.element) {
                for node in copies.replacement {
                    doc.insert_before(parent, node, Some(mapref.element));
                }
            }
            doc.detach(mapref.element);
            let map_root = doc.root();
            for node in copies.appended {
                doc.append_child(map_root, node);
            }
        }
        Ok(())
    }
}

/// The mapref `element` stands for, if it is one.
///
/// Missing formats are reported when submaps are loaded, not here.
fn detect_mapref(doc: &Document, element: NodeId) -> Option<Mapref> {
    if !doc.is(element, ElementKind::TOPICREF) {
        return None;
    }
    let href = doc.non_empty_attribute(element, "href")?;
    if dita::scope(doc, element, href) != "local"
        || dita::format(doc, element, href).as_deref() != Some("ditamap")
        || doc.non_empty_attribute(element, "type") == Some("subjectScheme")
    {
        return None;
    }
    let url = uri::parse_absolute(href)?;
    Some(Mapref {
        element,
        target_id: uri::fragment(&url),
        url: uri::without_fragment(&url),
    })
}

fn find_by_id(doc: &Document, id: &str) -> Option<NodeId> {
    let root = doc.root();
    std::iter::once(root)
        .chain(doc.descendants(root))
        .find(|&element| doc.attribute(element, "id") == Some(id))
}

fn is_group_marker(doc: &Document, node: NodeId) -> Option<bool> {
    match doc.processing_instruction(node) {
        Some((target, _)) if target == BEGIN_GROUP_PI => Some(true),
        Some((target, _)) if target == END_GROUP_PI => Some(false),
        _ => None,
    }
}

fn next_element(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut sibling = doc.next_sibling(node);
    while let Some(s) = sibling {
        if doc.is_element(s) {
            return Some(s);
        }
        sibling = doc.next_sibling(s);
    }
    None
}

fn previous_element(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut sibling = doc.previous_sibling(node);
    while let Some(s) = sibling {
        if doc.is_element(s) {
            return Some(s);
        }
        sibling = doc.previous_sibling(s);
    }
    None
}

/// Copy the content of the target map, or the target branch, into `doc`.
fn copy_target(doc: &mut Document, mapref: NodeId, src: &Document, target: NodeId) -> Copies {
    let mut copies = Copies::default();
    if !src.is(target, ElementKind::MAP) {
        copies.replacement.push(copy_topicref_as(doc, mapref, src, target));
        return copies;
    }

    for &child in src.children(target) {
        if let Some(begin) = is_group_marker(src, child) {
            let neighbour = if begin {
                next_element(src, child)
            } else {
                previous_element(src, child)
            };
            let copy = doc.import(src, child);
            if neighbour.is_some_and(|e| src.is(e, ElementKind::RELTABLE)) {
                copies.appended.push(copy);
            } else {
                copies.replacement.push(copy);
            }
        } else if src.is(child, ElementKind::TOPICREF)
            && !src.kind(child).intersects(ElementKind::DITAVALREF | ElementKind::FRONTMATTER | ElementKind::BACKMATTER)
        {
            copies.replacement.push(copy_topicref_as(doc, mapref, src, child));
        } else if src.is(child, ElementKind::RELTABLE) {
            copies.appended.push(doc.import(src, child));
        }
    }
    copies
}

/// Copy `source` into `doc`, renamed after `mapref` unless the mapref is
/// a plain map group element.
///
/// `<chapter href="m.ditamap#b"/>` turns the topicref `b` into a chapter.
fn copy_topicref_as(doc: &mut Document, mapref: NodeId, src: &Document, source: NodeId) -> NodeId {
    let class = doc.class(mapref).map(str::to_string);
    let name = doc.name(mapref).cloned();
    let (Some(class), Some(name)) = (class, name) else {
        return doc.import(src, source);
    };
    if class.trim().is_empty() || class.contains("mapgroup-d/") {
        return doc.import(src, source);
    }

    let copy = doc.create_element(name);
    doc.set_location(copy, Some(src.location(source)));
    for attr in src.attributes(source) {
        doc.set_attribute_qname(copy, attr.name.clone(), attr.value.clone());
    }
    doc.set_attribute(copy, "class", class);
    for &child in src.children(source) {
        let imported = doc.import(src, child);
        doc.append_child(copy, imported);
    }
    copy
}

/// One copy of the replacement per ditavalref. Each topicref copy gets its
/// ditavalref before its first nested topicref.
fn insert_ditavalrefs(doc: &mut Document, ditavalrefs: &[NodeId], replacement: &[NodeId]) -> Vec<NodeId> {
    let mut nodes = Vec::with_capacity(ditavalrefs.len() * replacement.len());
    for &ditavalref in ditavalrefs {
        for &node in replacement {
            let copy = doc.clone_subtree(node);
            if doc.is(copy, ElementKind::TOPICREF) {
                let dv = doc.clone_subtree(ditavalref);
                let before = doc
                    .child_elements(copy)
                    .find(|&child| doc.is(child, ElementKind::TOPICREF));
                doc.insert_before(copy, dv, before);
            }
            nodes.push(copy);
        }
    }
    nodes
}

/// Wrap the copies in begin/end group markers when the mapref or the
/// target map opens a key space.
fn add_keyscope_group(doc: &mut Document, mapref: NodeId, src: &Document, target: NodeId, copies: &mut Copies) {
    let mapref_space = doc
        .non_empty_attribute_ns(mapref, Some(DITAC_NS), KEY_SPACE)
        .map(str::to_string);
    let target_space = src
        .is(target, ElementKind::MAP)
        .then(|| src.non_empty_attribute_ns(target, Some(DITAC_NS), KEY_SPACE))
        .flatten()
        .map(str::to_string);
    let Some(key_space) = target_space.or(mapref_space) else {
        return;
    };

    let keyscope = merge_tokens(
        doc.non_empty_attribute(mapref, "keyscope").unwrap_or_default(),
        src.non_empty_attribute(target, "keyscope").unwrap_or_default(),
    );
    let data = format!("keyscope=\"{}\" {}{}\"", keyscope, KEY_SPACE_START, key_space);
    for nodes in [&mut copies.replacement, &mut copies.appended] {
        if nodes.is_empty() {
            continue;
        }
        let begin = doc.create_processing_instruction(BEGIN_GROUP_PI, data.clone());
        let end = doc.create_processing_instruction(END_GROUP_PI, "");
        nodes.insert(0, begin);
        nodes.push(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use ditac_dom::parse;
    use std::rc::Rc;

    fn xml(doc: &Document) -> String {
        doc.subtree_to_string(doc.root()).unwrap()
    }

    fn include(map: &str, source: MemorySource) -> (Result<Document>, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let mut docs = LoadedDocuments::new(Rc::new(source), sink.clone());
        let url = Url::parse("file:///d/m.ditamap").unwrap();
        let mut doc = parse(map, Some(&url)).unwrap();
        let mut stack = vec![url];
        let result = MaprefIncluder::new(&sink)
            .include(&mut doc, &mut docs, &mut stack)
            .map(|()| doc);
        (result, sink)
    }

    #[test]
    fn test_map_content_replaces_mapref() {
        let source = MemorySource::new().with(
            "file:///d/sub.ditamap",
            r#"<map><title>Sub</title><topicref href="file:///d/a.dita"/><reltable><relrow/></reltable></map>"#,
        );
        let (doc, _) = include(
            r#"<map><mapref href="file:///d/sub.ditamap" format="ditamap"/><topicref href="file:///d/b.dita"/></map>"#,
            source,
        );
        insta::assert_snapshot!(
            xml(&doc.unwrap()),
            @r#"<map><topicref href="file:///d/a.dita"/><topicref href="file:///d/b.dita"/><reltable><relrow/></reltable></map>"#
        );
    }

    #[test]
    fn test_branch_is_copied_as_the_referencing_element() {
        let source = MemorySource::new().with(
            "file:///d/sub.ditamap",
            r#"<map><topicref id="b" href="file:///d/b.dita"><topicref href="file:///d/c.dita"/></topicref></map>"#,
        );
        let (doc, _) = include(
            r#"<bookmap><chapter href="file:///d/sub.ditamap#b" format="ditamap"/></bookmap>"#,
            source,
        );
        let doc = doc.unwrap();
        let chapter = doc.first_child_element(doc.root()).unwrap();
        assert_eq!(doc.local_name(chapter), "chapter");
        assert!(doc.has_class(chapter, "bookmap/chapter"));
        assert_eq!(doc.attribute(chapter, "href"), Some("file:///d/b.dita"));
        assert_eq!(doc.child_elements(chapter).count(), 1);
    }

    #[test]
    fn test_key_space_group_and_ditavalrefs() {
        let source = MemorySource::new().with(
            "file:///d/sub.ditamap",
            r#"<map xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac" ditac:keySpace="1"><topicref href="file:///d/a.dita"/></map>"#,
        );
        let (doc, _) = include(
            r#"<map xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac"><mapref href="file:///d/sub.ditamap" format="ditamap" keyscope="lib" ditac:keySpace="1"><ditavalref href="file:///d/a.ditaval"/><ditavalref href="file:///d/b.ditaval"/></mapref></map>"#,
            source,
        );
        insta::assert_snapshot!(
            xml(&doc.unwrap()),
            @r#"<map xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac"><?ditac-begin-group keyscope="lib" ditac:keySpace="1"?><topicref href="file:///d/a.dita"><ditavalref href="file:///d/a.ditaval"/></topicref><topicref href="file:///d/a.dita"><ditavalref href="file:///d/b.ditaval"/></topicref><?ditac-end-group?></map>"#
        );
    }

    #[test]
    fn test_nested_submaps_are_included() {
        let source = MemorySource::new()
            .with(
                "file:///d/sub.ditamap",
                r#"<map><mapref href="file:///d/leaf.ditamap" format="ditamap"/></map>"#,
            )
            .with("file:///d/leaf.ditamap", r#"<map><topicref href="file:///d/leaf.dita"/></map>"#);
        let (doc, _) = include(
            r#"<map><mapref href="file:///d/sub.ditamap" format="ditamap"/></map>"#,
            source,
        );
        assert_eq!(
            xml(&doc.unwrap()),
            r#"<map><topicref href="file:///d/leaf.dita"/></map>"#
        );
    }

    #[test]
    fn test_cycle_is_an_error() {
        let source = MemorySource::new().with(
            "file:///d/sub.ditamap",
            r#"<map><mapref href="file:///d/m.ditamap" format="ditamap"/></map>"#,
        );
        let (result, _) = include(
            r#"<map><mapref href="file:///d/sub.ditamap" format="ditamap"/></map>"#,
            source,
        );
        assert!(matches!(result, Err(PreprocessError::CyclicMapref { ref url, .. }) if url == "file:///d/m.ditamap"));
    }

    #[test]
    fn test_missing_target_and_non_map() {
        let source = MemorySource::new()
            .with("file:///d/sub.ditamap", "<map/>")
            .with("file:///d/t.ditamap", "<topic id='t'/>");
        let (result, _) = include(
            r#"<map><mapref href="file:///d/sub.ditamap#nope" format="ditamap"/></map>"#,
            source.clone(),
        );
        assert!(matches!(result, Err(PreprocessError::MaprefTargetNotFound { ref href, .. }) if href == "file:///d/sub.ditamap#nope"));

        let (result, _) = include(
            r#"<map><mapref href="file:///d/t.ditamap" format="ditamap"/></map>"#,
            source,
        );
        assert!(matches!(result, Err(PreprocessError::NotAMap { .. })));
    }

    #[test]
    fn test_subject_scheme_is_dropped() {
        let source = MemorySource::new().with("file:///d/s.ditamap", "<subjectScheme/>");
        let (doc, sink) = include(
            r#"<map><mapref href="file:///d/s.ditamap" format="ditamap"/></map>"#,
            source,
        );
        assert_eq!(xml(&doc.unwrap()), "<map/>");
        assert_eq!(sink.count_code("D-5-4"), 1);
    }
}
