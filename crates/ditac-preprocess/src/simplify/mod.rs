/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Map simplification: key space stamping, submap loading and inclusion,
 * and normalization of ditavalrefs.
 */

mod mapref;

use crate::dita;
use crate::documents::{LoadedDocument, LoadedDocuments};
use crate::error::{PreprocessError, Result};
use crate::keys::KeySpaces;
use crate::resolve::Resolver;
use crate::uri;
use crate::vocab::{DITAC_NS, KEY_SPACE, ROOT_KEY_SPACE_ID, ditac_name};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::{Document, ElementKind, NodeId};
use mapref::MaprefIncluder;
use url::Url;

/// A topicref of a map pointing at a local submap.
struct SubmapRef {
    url: Url,
    /// `ditac:keySpace` of the topicref itself.
    key_space: Option<String>,
}

/// Turns a root map and its submaps into a single map.
///
/// Every element opening a key scope is stamped with a `ditac:keySpace`
/// id. Ids are numbered per call, so simplifying two copies of the same
/// map yields the same ids.
pub struct MapSimplifier<'k> {
    docs: LoadedDocuments,
    key_spaces: Option<&'k KeySpaces>,
    counter: u32,
}

impl<'k> MapSimplifier<'k> {
    /// Submaps are read through the source of `docs` into a private cache.
    pub fn new(docs: &LoadedDocuments, key_spaces: Option<&'k KeySpaces>) -> Self {
        let mut docs = docs.sibling();
        docs.set_check_dita_version(false);
        Self {
            docs,
            key_spaces,
            counter: 0,
        }
    }

    /// Simplify `map`, which must not have been resolved yet.
    ///
    /// The returned document has absolute references, resolved against
    /// `key_spaces` when given.
    pub fn simplify(&mut self, mut map: Document, url: &Url) -> Result<LoadedDocument> {
        tracing::info!(url = %url, "simplifying map");
        let url = uri::without_fragment(url);
        let root = map.root();
        if !map.is(root, ElementKind::MAP) {
            return Err(PreprocessError::NotAMap { url: url.to_string() });
        }

        self.counter = 0;
        // A root map always opens the root key scope.
        map.set_attribute_qname(root, ditac_name(KEY_SPACE), ROOT_KEY_SPACE_ID);
        for child in map.child_elements(root).collect::<Vec<_>>() {
            self.add_key_spaces(&mut map, child);
        }

        let sink = self.docs.sink().clone();
        let resolver = Resolver::new(self.key_spaces, sink.clone());
        self.docs.put(&url, map, Some(&resolver))?;
        self.load_all_maps(&url, &resolver)?;

        let mut loaded = self
            .docs
            .remove(&url)
            .ok_or_else(|| PreprocessError::load(&url, "map vanished from cache"))?;
        let mut stack = vec![url.clone()];
        MaprefIncluder::new(&sink).include(&mut loaded.document, &mut self.docs, &mut stack)?;
        simplify_ditavalrefs(&mut loaded.document, &sink);
        Ok(loaded)
    }

    fn next_key_space_id(&mut self) -> String {
        self.counter += 1;
        to_base36(self.counter)
    }

    /// Stamp `element` and its descendants having a `@keyscope`.
    fn add_key_spaces(&mut self, doc: &mut Document, element: NodeId) {
        if doc.non_empty_attribute(element, "keyscope").is_some() {
            let id = self.next_key_space_id();
            doc.set_attribute_qname(element, ditac_name(KEY_SPACE), id);
        }
        for child in doc.child_elements(element).collect::<Vec<_>>() {
            self.add_key_spaces(doc, child);
        }
    }

    /// Load, stamp and resolve every submap reachable from the map at `url`.
    fn load_all_maps(&mut self, url: &Url, resolver: &Resolver<'_>) -> Result<()> {
        let refs = match self.docs.get(url) {
            Some(loaded) => submap_refs(&loaded.document, self.docs.sink()),
            None => return Ok(()),
        };

        for submap in refs {
            if self.docs.get(&submap.url).is_some_and(LoadedDocument::is_processed) {
                continue;
            }
            if !self.docs.preload(&submap.url)?.doc_type.is_map() {
                // Reported as "not a map" on inclusion.
                continue;
            }
            let Some(mut loaded) = self.docs.remove(&submap.url) else {
                continue;
            };

            let doc = &mut loaded.document;
            let root = doc.root();
            if doc.is(root, ElementKind::SUBJECT_SCHEME) {
                // Dropped, with a warning, on inclusion.
                self.docs.insert(loaded, None);
                continue;
            }

            self.add_key_spaces(doc, root);
            if doc.non_empty_attribute_ns(root, Some(DITAC_NS), KEY_SPACE).is_none()
                && let Some(key_space) = &submap.key_space
            {
                doc.set_attribute_qname(root, ditac_name(KEY_SPACE), key_space.clone());
            }
            tracing::debug!(url = %submap.url, "loaded submap");
            self.docs.insert(loaded, Some(resolver));
            self.load_all_maps(&submap.url, resolver)?;
        }
        Ok(())
    }
}

/// The local submaps referenced by `doc`, in document order.
fn submap_refs(doc: &Document, sink: &DiagnosticSink) -> Vec<SubmapRef> {
    let mut refs = Vec::new();
    for element in doc.descendants(doc.root()) {
        if !doc.is(element, ElementKind::TOPICREF) {
            continue;
        }
        let Some(href) = doc.non_empty_attribute(element, "href") else {
            continue;
        };
        if dita::inherit_attribute(doc, element, "scope").is_some_and(|scope| scope != "local") {
            continue;
        }
        match dita::format(doc, element, href).as_deref() {
            None => {
                sink.warning(
                    "D-5-5",
                    format!("Missing attribute `format` for href `{}`", href),
                    Some(doc.location(element)),
                );
                continue;
            }
            Some("ditamap") => {}
            // e.g. a ditavalref, whose format defaults to ditaval.
            Some(_) => continue,
        }
        let Some(url) = uri::parse_absolute(href) else {
            sink.warning(
                "D-4-6",
                format!("Invalid value `{}` for attribute `href`", href),
                Some(doc.location(element)),
            );
            continue;
        };
        refs.push(SubmapRef {
            url: uri::without_fragment(&url),
            key_space: doc
                .non_empty_attribute_ns(element, Some(DITAC_NS), KEY_SPACE)
                .map(str::to_string),
        });
    }
    refs
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

/// Leave at most one ditavalref per map element or topicref.
///
/// Extra ditavalrefs of the map element are dropped. A topicref with N
/// ditavalrefs becomes N copies, one per ditavalref; the key spaces of
/// copy `i` get the suffix `.i`. Keyscopes are then renamed after the
/// `ditavalmeta` of the ditavalrefs in effect.
fn simplify_ditavalrefs(doc: &mut Document, sink: &DiagnosticSink) {
    let map = doc.root();
    let ditavalrefs = dita::ditavalrefs(doc, map);
    if let Some((&first, rest)) = ditavalrefs.split_first() {
        if !rest.is_empty() {
            sink.warning(
                "D-5-6",
                "Several ditavalrefs in map element, keeping the first one",
                Some(doc.location(map)),
            );
            for &extra in rest {
                doc.detach(extra);
            }
        }
        if let Some(first_topicref) = doc.child_by_kind(map, ElementKind::TOPICREF)
            && first_topicref != first
        {
            doc.detach(first);
            doc.insert_before(map, first, Some(first_topicref));
        }
    }
    split_ditavalref_branches(doc, map);

    let mut stack: Vec<DitavalMeta> = ditavalrefs
        .first()
        .and_then(|&first| DitavalMeta::of(doc, first))
        .into_iter()
        .collect();
    rename_keyscopes(doc, map, &mut stack);
}

fn split_ditavalref_branches(doc: &mut Document, element: NodeId) {
    if doc.is(element, ElementKind::TOPICREF) {
        let ditavalrefs = dita::ditavalrefs(doc, element);
        if ditavalrefs.len() > 1
            && let Some(parent) = doc.parent(element)
        {
            let mut after = element;
            for i in 1..ditavalrefs.len() {
                let copy = doc.clone_subtree(element);
                for (j, dv) in dita::ditavalrefs(doc, copy).into_iter().enumerate() {
                    if j != i {
                        doc.detach(dv);
                    }
                }
                suffix_key_spaces(doc, copy, &format!(".{}", i + 1));
                doc.insert_after(parent, copy, after);
                after = copy;
            }
            for &extra in &ditavalrefs[1..] {
                doc.detach(extra);
            }
        }
    }
    // Copies land after the topicref they were made from, so they are
    // reached by walking the siblings as they are now.
    let mut next = doc.children(element).first().copied();
    while let Some(child) = next {
        if doc.is_element(child) {
            split_ditavalref_branches(doc, child);
        }
        next = doc.next_sibling(child);
    }
}

/// Keyscope renaming requested by the `ditavalmeta` of a ditavalref.
#[derive(Debug)]
struct DitavalMeta {
    keyscope_prefix: Option<String>,
    keyscope_suffix: Option<String>,
}

impl DitavalMeta {
    fn of(doc: &Document, ditavalref: NodeId) -> Option<Self> {
        let container = doc.child_by_class(ditavalref, "ditavalref-d/ditavalmeta")?;
        let text = |token: &str| {
            doc.child_by_class(container, token)
                .map(|e| doc.text_content(e).trim().to_string())
                .filter(|text| !text.is_empty())
        };
        let meta = Self {
            keyscope_prefix: text("ditavalref-d/dvrKeyscopePrefix"),
            keyscope_suffix: text("ditavalref-d/dvrKeyscopeSuffix"),
        };
        (meta.keyscope_prefix.is_some() || meta.keyscope_suffix.is_some()).then_some(meta)
    }
}

/// Apply the prefixes and suffixes of `stack` to every `@keyscope` below
/// `element`. The outermost ditavalref contributes the outermost affixes.
fn rename_keyscopes(doc: &mut Document, element: NodeId, stack: &mut Vec<DitavalMeta>) {
    let mut pushed = false;
    if doc.is(element, ElementKind::TOPICREF) {
        if let Some(meta) = dita::ditavalrefs(doc, element)
            .first()
            .and_then(|&dv| DitavalMeta::of(doc, dv))
        {
            stack.push(meta);
            pushed = true;
        }
        if !stack.is_empty()
            && let Some(keyscope) = doc.non_empty_attribute(element, "keyscope").map(str::to_string)
        {
            let mut renamed = keyscope.clone();
            for meta in stack.iter().rev() {
                if let Some(prefix) = &meta.keyscope_prefix {
                    renamed.insert_str(0, prefix);
                }
                if let Some(suffix) = &meta.keyscope_suffix {
                    renamed.push_str(suffix);
                }
            }
            if renamed != keyscope {
                doc.set_attribute(element, "keyscope", renamed);
            }
        }
    }
    for child in doc.child_elements(element).collect::<Vec<_>>() {
        rename_keyscopes(doc, child, stack);
    }
    if pushed {
        stack.pop();
    }
}

fn suffix_key_spaces(doc: &mut Document, element: NodeId, suffix: &str) {
    if let Some(id) = doc.non_empty_attribute_ns(element, Some(DITAC_NS), KEY_SPACE) {
        let id = format!("{}{}", id, suffix);
        doc.set_attribute_qname(element, ditac_name(KEY_SPACE), id);
    }
    for child in doc.child_elements(element).collect::<Vec<_>>() {
        suffix_key_spaces(doc, child, suffix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::rc::Rc;

    fn simplify(map: &str, source: MemorySource) -> (Result<LoadedDocument>, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let docs = LoadedDocuments::new(Rc::new(source), sink.clone());
        let url = Url::parse("file:///d/m.ditamap").unwrap();
        let map = Document::parse(map, Some(&url)).unwrap();
        let result = MapSimplifier::new(&docs, None).simplify(map, &url);
        (result, sink)
    }

    fn xml(loaded: &LoadedDocument) -> String {
        let doc = &loaded.document;
        doc.subtree_to_string(doc.root()).unwrap()
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(1), "1");
        assert_eq!(to_base36(10), "a");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_key_spaces_are_stamped_in_document_order() {
        let (loaded, _) = simplify(
            r#"<map><topicgroup keyscope="a"><topicgroup keyscope="b"/></topicgroup><topicgroup keyscope="c"/></map>"#,
            MemorySource::new(),
        );
        insta::assert_snapshot!(
            xml(&loaded.unwrap()),
            @r#"<map xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac" ditac:keySpace="0"><topicgroup keyscope="a" ditac:keySpace="1"><topicgroup keyscope="b" ditac:keySpace="2"/></topicgroup><topicgroup keyscope="c" ditac:keySpace="3"/></map>"#
        );
    }

    #[test]
    fn test_submap_with_keyscope_is_grouped() {
        let source = MemorySource::new()
            .with("file:///d/sub.ditamap", r#"<map><topicref href="a.dita"/></map>"#);
        let (loaded, sink) = simplify(
            r#"<map><mapref href="sub.ditamap" keyscope="lib"/></map>"#,
            source,
        );
        insta::assert_snapshot!(
            xml(&loaded.unwrap()),
            @r#"<map xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac" ditac:keySpace="0"><?ditac-begin-group keyscope="lib" ditac:keySpace="1"?><topicref href="file:///d/a.dita"/><?ditac-end-group?></map>"#
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_submap_keyscope_merges_with_mapref() {
        let source = MemorySource::new().with(
            "file:///d/sub.ditamap",
            r#"<map keyscope="sub"><topicref href="a.dita"/></map>"#,
        );
        let (loaded, _) = simplify(
            r#"<map><mapref href="sub.ditamap" keyscope="lib"/></map>"#,
            source,
        );
        let loaded = loaded.unwrap();
        let doc = &loaded.document;
        let pi = doc.children(doc.root())[0];
        assert_eq!(
            doc.processing_instruction(pi),
            Some(("ditac-begin-group", r#"keyscope="lib sub" ditac:keySpace="2""#))
        );
    }

    #[test]
    fn test_missing_format_is_reported() {
        let (_, sink) = simplify(
            r#"<map><topicref href="http-less-name"/></map>"#,
            MemorySource::new(),
        );
        assert_eq!(sink.count_code("D-5-5"), 1);
    }

    #[test]
    fn test_unreadable_submap_aborts() {
        let (result, _) = simplify(r#"<map><mapref href="gone.ditamap"/></map>"#, MemorySource::new());
        assert!(matches!(result, Err(PreprocessError::Load { .. })));
    }

    #[test]
    fn test_topicref_ditavalrefs_split_the_branch() {
        let (loaded, _) = simplify(
            r#"<map>
<topicref href="a.dita" keyscope="k"><ditavalref href="x.ditaval"/><ditavalref href="y.ditaval"/></topicref>
</map>"#,
            MemorySource::new(),
        );
        let loaded = loaded.unwrap();
        let doc = &loaded.document;
        let branches: Vec<NodeId> = doc.children_by_kind(doc.root(), ElementKind::TOPICREF);
        assert_eq!(branches.len(), 2);
        let spaces: Vec<Option<&str>> = branches
            .iter()
            .map(|&b| doc.attribute_ns(b, Some(DITAC_NS), KEY_SPACE))
            .collect();
        assert_eq!(spaces, [Some("1"), Some("1.2")]);
        for (branch, expected) in branches.iter().zip(["file:///d/x.ditaval", "file:///d/y.ditaval"]) {
            let dvs = dita::ditavalrefs(doc, *branch);
            assert_eq!(dvs.len(), 1);
            assert_eq!(doc.attribute(dvs[0], "href"), Some(expected));
        }
    }

    #[test]
    fn test_map_ditavalref_moves_first() {
        let (loaded, sink) = simplify(
            r#"<map><topicref href="a.dita"/><ditavalref href="x.ditaval"/><ditavalref href="y.ditaval"/></map>"#,
            MemorySource::new(),
        );
        let loaded = loaded.unwrap();
        let doc = &loaded.document;
        let first = doc.first_child_element(doc.root()).unwrap();
        assert!(dita::is_ditavalref(doc, first));
        assert_eq!(dita::ditavalrefs(doc, doc.root()).len(), 1);
        assert_eq!(sink.count_code("D-5-6"), 1);
    }

    #[test]
    fn test_nested_ditavalrefs_are_split_in_every_copy() {
        let (loaded, _) = simplify(
            r#"<map>
<topicref href="a.dita"><ditavalref href="x.ditaval"/><ditavalref href="y.ditaval"/>
  <topicref href="b.dita"><ditavalref href="p.ditaval"/><ditavalref href="q.ditaval"/></topicref>
</topicref>
</map>"#,
            MemorySource::new(),
        );
        let loaded = loaded.unwrap();
        let doc = &loaded.document;
        let outer = doc.children_by_kind(doc.root(), ElementKind::TOPICREF);
        assert_eq!(outer.len(), 2);
        for branch in outer {
            let nested: Vec<NodeId> = doc
                .children_by_kind(branch, ElementKind::TOPICREF)
                .into_iter()
                .filter(|&n| !dita::is_ditavalref(doc, n))
                .collect();
            assert_eq!(nested.len(), 2);
            let counts: Vec<usize> = nested.iter().map(|&n| dita::ditavalrefs(doc, n).len()).collect();
            assert_eq!(counts, [1, 1]);
        }
    }

    #[test]
    fn test_ditavalmeta_renames_keyscopes() {
        let (loaded, _) = simplify(
            r#"<map>
<ditavalref href="m.ditaval"><ditavalmeta><dvrKeyscopePrefix>m-</dvrKeyscopePrefix></ditavalmeta></ditavalref>
<topicref href="a.dita" keyscope="lib">
  <ditavalref href="x.ditaval"><ditavalmeta><dvrKeyscopePrefix> x- </dvrKeyscopePrefix></ditavalmeta></ditavalref>
  <ditavalref href="y.ditaval"><ditavalmeta><dvrKeyscopeSuffix>-y</dvrKeyscopeSuffix></ditavalmeta></ditavalref>
  <topicref href="b.dita" keyscope="inner"/>
</topicref>
</map>"#,
            MemorySource::new(),
        );
        let loaded = loaded.unwrap();
        let doc = &loaded.document;
        let keyscopes: Vec<&str> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|n| doc.attribute(n, "keyscope"))
            .collect();
        assert_eq!(keyscopes, ["m-x-lib", "m-x-inner", "m-lib-y", "m-inner-y"]);
    }
}
