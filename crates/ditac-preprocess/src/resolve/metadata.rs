/*
 * metadata.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Cascading of attributes and topicmeta children from a key definition
 * to the topicref referencing it.
 */

use crate::dita;
use crate::keys::KeyDefinition;
use ditac_dom::text::merge_tokens;
use ditac_dom::{Document, ElementKind, NodeId, QName};

/// Attributes cascading from a key definition. Entries from
/// [`FIRST_ADDITIVE`] on are token sets which merge with the local value.
const CASCADING_ATTRIBUTES: [&str; 15] = [
    "linking",
    "toc",
    "print",
    "search",
    "type",
    "translate",
    "processing-role",
    "cascade",
    "rev",
    "audience",
    "platform",
    "product",
    "otherprops",
    "props",
    "deliveryTarget",
];

const FIRST_ADDITIVE: usize = 9;

/// The children of a topicmeta in schema order. The flag marks elements
/// allowed at most once.
const TOPICMETA_ELEMENTS: [(&str, bool); 21] = [
    ("topic/navtitle", true),
    ("map/linktext", true),
    ("map/searchtitle", true),
    ("topic/shortdesc", true),
    ("topic/author", false),
    ("topic/source", true),
    ("topic/publisher", true),
    ("topic/copyright", false),
    ("topic/critdates", true),
    ("topic/permissions", true),
    ("topic/metadata", false),
    ("topic/audience", false),
    ("topic/category", false),
    ("topic/keywords", false),
    ("topic/prodinfo", false),
    ("topic/othermeta", false),
    ("topic/resourceid", false),
    ("topic/data-about", false),
    ("topic/data", false),
    ("topic/foreign", false),
    ("topic/unknown", false),
];

/// Position of `element` in [`TOPICMETA_ELEMENTS`].
fn topicmeta_rank(doc: &Document, element: NodeId) -> Option<usize> {
    TOPICMETA_ELEMENTS
        .iter()
        .position(|(class, _)| doc.has_class(element, class))
}

/// Names of the cascading attributes, completed by the filter attributes
/// declared by the map holding `topicref`.
fn cascading_attributes(doc: &Document, topicref: NodeId) -> Vec<String> {
    let mut names: Vec<String> = CASCADING_ATTRIBUTES.iter().map(|s| s.to_string()).collect();
    if let Some(map) = doc.ancestor_or_self_by_kind(topicref, ElementKind::MAP) {
        for name in dita::filter_attributes(doc, map) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Cascade the attributes and topicmeta of `kd` onto `topicref`.
///
/// Nothing cascades when the key definition's topicmeta says
/// `lockmeta="no"`. Local scalar attributes win. Token-set attributes are
/// merged unless `cascade="nomerge"`. Topicmeta children are copied in
/// schema order; an element allowed once is skipped when `topicref`
/// already has one.
pub fn add_metadata(kd: &KeyDefinition, doc: &mut Document, topicref: NodeId) {
    let src = kd.document();
    let src_meta = kd.meta().filter(|&meta| src.is(meta, ElementKind::TOPICMETA));
    if let Some(meta) = src_meta
        && src.non_empty_attribute(meta, "lockmeta") == Some("no")
    {
        return;
    }

    let cascade = doc
        .non_empty_attribute(topicref, "cascade")
        .or_else(|| kd.attribute(None, "cascade"))
        .map(str::to_string);
    let nomerge = cascade.as_deref() == Some("nomerge");

    for (index, name) in cascading_attributes(doc, topicref).iter().enumerate() {
        let Some(cascaded) = kd.attribute(None, name) else {
            continue;
        };
        let local = doc.non_empty_attribute(topicref, name).map(str::to_string);
        let value = match local.as_deref() {
            None => cascaded.to_string(),
            Some(local) if index >= FIRST_ADDITIVE && !nomerge => merge_tokens(local, cascaded),
            Some(local) => local.to_string(),
        };
        if local.as_deref() != Some(value.as_str()) {
            doc.set_attribute(topicref, name, value);
        }
    }

    let Some(src_meta) = src_meta else {
        return;
    };

    let dst_meta = match doc.child_by_kind(topicref, ElementKind::TOPICMETA) {
        Some(meta) => meta,
        None => {
            let meta = doc.create_element(QName::local("topicmeta"));
            doc.set_attribute(meta, "class", "- map/topicmeta ");
            let first = doc.children(topicref).first().copied();
            doc.insert_before(topicref, meta, first);
            meta
        }
    };

    for child in src.child_elements(src_meta).collect::<Vec<_>>() {
        let Some(rank) = topicmeta_rank(src, child) else {
            continue;
        };
        let (class, single) = TOPICMETA_ELEMENTS[rank];
        if single && doc.child_by_class(dst_meta, class).is_some() {
            continue;
        }
        let before = doc
            .child_elements(dst_meta)
            .find(|&existing| topicmeta_rank(doc, existing).is_some_and(|r| r > rank));
        let copy = doc.import(src, child);
        doc.insert_before(dst_meta, copy, before);
    }
}
