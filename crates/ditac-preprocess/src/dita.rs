/*
 * dita.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Vocabulary helpers: inherited attributes, scope and format of a
 * reference, filter attributes and ids.
 */

use crate::uri;
use crate::vocab::{BASE_FILTER_ATTRIBUTES, COPY_OF, DITAC_NS};
use ditac_dom::text::is_name;
use ditac_dom::{Document, ElementKind, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// `a(props name)` declarations of `@domains`.
static PROPS_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"a\(\s*props\s+([^)]*)\)").expect("valid regex"));

/// True if `key` can name a key: non-empty, without whitespace and
/// without `{ } [ ] / # ?`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '/' | '#' | '?'))
}

/// Non-empty value of `local` on `id` or its nearest ancestor having it.
pub fn inherit_attribute<'d>(doc: &'d Document, id: NodeId, local: &str) -> Option<&'d str> {
    std::iter::once(id)
        .chain(doc.ancestors(id))
        .find_map(|node| doc.non_empty_attribute(node, local))
}

/// `local`, `peer` or `external`, inherited or inferred from `href`.
pub fn scope(doc: &Document, id: NodeId, href: &str) -> String {
    if let Some(scope) = inherit_attribute(doc, id, "scope") {
        return scope.to_string();
    }
    match uri::parse_absolute(href) {
        Some(url) if url.scheme() != "file" => "external".to_string(),
        _ => "local".to_string(),
    }
}

/// Lower-cased format, inherited or inferred from the extension of `href`.
pub fn format(doc: &Document, id: NodeId, href: &str) -> Option<String> {
    if let Some(format) = inherit_attribute(doc, id, "format") {
        return Some(format.to_ascii_lowercase());
    }
    format_from_href(href)
}

pub fn format_from_href(href: &str) -> Option<String> {
    let path = href.split(['#', '?']).next().unwrap_or(href);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let ext = segment.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
    match ext.as_str() {
        "" => None,
        "dita" | "xml" => Some("dita".to_string()),
        _ => Some(ext),
    }
}

/// Filter attributes of a map or topic, including `@props`
/// specializations declared in its `@domains`.
pub fn filter_attributes(doc: &Document, id: NodeId) -> Vec<String> {
    let mut names: Vec<String> = BASE_FILTER_ATTRIBUTES.iter().map(|s| s.to_string()).collect();
    if let Some(domains) = doc.attribute(id, "domains") {
        for capture in PROPS_DOMAIN.captures_iter(domains) {
            if let Some(name) = capture[1].split_whitespace().last()
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// `ditavalref` children of a map or topicref.
pub fn ditavalrefs(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.children_by_kind(id, ElementKind::DITAVALREF)
}

pub fn is_ditavalref(doc: &Document, id: NodeId) -> bool {
    doc.is(id, ElementKind::DITAVALREF)
}

/// True if `id` can be used as an element id.
pub fn is_valid_id(id: &str) -> bool {
    is_name(id) && !id.contains(':')
}

/// The id of `element`, giving it a generated one when missing or invalid.
pub fn ensure_valid_id(doc: &mut Document, element: NodeId) -> String {
    if let Some(id) = doc.non_empty_attribute(element, "id")
        && is_valid_id(id)
    {
        return id.to_string();
    }
    let id = doc.generate_id();
    doc.set_attribute(element, "id", id.clone());
    id
}

/// The topic a topicref points to before topic copies are created.
pub fn original_topic_url(doc: &Document, topicref: NodeId, fallback: Url) -> Url {
    doc.non_empty_attribute_ns(topicref, Some(DITAC_NS), COPY_OF)
        .and_then(uri::parse_absolute)
        .unwrap_or(fallback)
}

/// Value of a `name="value"` pseudo-attribute found after `start` in a
/// processing-instruction body. `start` includes the opening quote.
pub fn parse_pseudo_attribute(start: &str, data: &str) -> Option<String> {
    let pos = data.find(start)? + start.len();
    let end = data[pos..].find('"')? + pos;
    Some(data[pos..end].to_string())
}

/// Which topics of a document a topicref designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Select {
    /// The addressed topic only.
    Topic,
    /// The addressed topic and its nested topics.
    Branch,
    /// Every topic of the document.
    Document,
}

/// Selection of a topicref: `Topic` when its href has a topic id, else
/// `Document`, overridden by a `select-*` token of `@chunk`.
pub fn chunk_select(doc: &Document, topicref: NodeId, has_topic_id: bool) -> Select {
    let chunk = doc.attribute(topicref, "chunk").unwrap_or_default();
    if chunk.contains("select-document") {
        Select::Document
    } else if chunk.contains("select-branch") {
        Select::Branch
    } else if chunk.contains("select-topic") {
        Select::Topic
    } else if has_topic_id {
        Select::Topic
    } else {
        Select::Document
    }
}

/// Absolute URL of the local DITA topic `topicref` points to, if any.
pub fn local_topic_url(doc: &Document, topicref: NodeId) -> Option<Url> {
    let href = doc.non_empty_attribute(topicref, "href")?;
    if scope(doc, topicref, href) != "local" || format(doc, topicref, href).as_deref() != Some("dita") {
        return None;
    }
    match doc.uri() {
        Some(base) => uri::resolve(base, href),
        None => uri::parse_absolute(href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ditac_dom::parse;

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("intro"));
        assert!(is_valid_key("scope.intro"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a b"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key("a{b}"));
    }

    #[test]
    fn test_scope_and_format_inference() {
        let doc = parse(
            r#"<map><topicgroup format="DITAMAP"><topicref href="a"/></topicgroup><topicref href="http://x.org/b.html"/></map>"#,
            None,
        )
        .unwrap();
        let group = doc.first_child_element(doc.root()).unwrap();
        let inner = doc.first_child_element(group).unwrap();
        assert_eq!(format(&doc, inner, "a").as_deref(), Some("ditamap"));
        assert_eq!(scope(&doc, inner, "a"), "local");
        let remote = doc.next_sibling(group).unwrap();
        assert_eq!(scope(&doc, remote, "http://x.org/b.html"), "external");
        assert_eq!(format(&doc, remote, "http://x.org/b.html").as_deref(), Some("html"));
        assert_eq!(format_from_href("t.xml#x").as_deref(), Some("dita"));
        assert_eq!(format_from_href("README"), None);
    }

    #[test]
    fn test_filter_attributes_from_domains() {
        let doc = parse(
            r#"<topic id="t" domains="(topic hi-d) a(props deliveryTarget) a(props myprop sub)"/>"#,
            None,
        )
        .unwrap();
        let names = filter_attributes(&doc, doc.root());
        assert!(names.contains(&"deliveryTarget".to_string()));
        assert!(names.contains(&"sub".to_string()));
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn test_ensure_valid_id() {
        let mut doc = parse(r#"<topic id="1bad"/>"#, None).unwrap();
        let root = doc.root();
        let id = ensure_valid_id(&mut doc, root);
        assert_ne!(id, "1bad");
        assert_eq!(doc.attribute(root, "id"), Some(id.as_str()));
        assert_eq!(ensure_valid_id(&mut doc, root), id);
    }

    #[test]
    fn test_chunk_select() {
        let doc = parse(
            r#"<map><topicref href="a.dita"/><topicref href="a.dita#t" chunk="to-content select-branch"/></map>"#,
            None,
        )
        .unwrap();
        let first = doc.first_child_element(doc.root()).unwrap();
        let second = doc.next_sibling(first).unwrap();
        assert_eq!(chunk_select(&doc, first, false), Select::Document);
        assert_eq!(chunk_select(&doc, first, true), Select::Topic);
        assert_eq!(chunk_select(&doc, second, true), Select::Branch);
    }

    #[test]
    fn test_local_topic_url() {
        let base = Url::parse("file:///d/m.ditamap").unwrap();
        let doc = parse(
            r#"<map><topicref href="t.dita#x"/><topicref href="sub.ditamap"/><topicref href="t.dita" scope="peer"/></map>"#,
            Some(&base),
        )
        .unwrap();
        let refs: Vec<_> = doc.child_elements(doc.root()).collect();
        assert_eq!(
            local_topic_url(&doc, refs[0]).map(String::from),
            Some("file:///d/t.dita#x".to_string())
        );
        assert_eq!(local_topic_url(&doc, refs[1]), None);
        assert_eq!(local_topic_url(&doc, refs[2]), None);
    }

    #[test]
    fn test_parse_pseudo_attribute() {
        let data = r#"keyscope="a b" ditac:keySpace="3""#;
        assert_eq!(parse_pseudo_attribute("keyscope=\"", data).as_deref(), Some("a b"));
        assert_eq!(parse_pseudo_attribute("ditac:keySpace=\"", data).as_deref(), Some("3"));
        assert_eq!(parse_pseudo_attribute("missing=\"", data), None);
    }
}
