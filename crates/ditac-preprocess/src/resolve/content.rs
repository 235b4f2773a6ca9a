//! Content injected into an empty key-referencing element.

use crate::keys::KeyDefinition;
use ditac_dom::{Document, ElementKind, NodeId, QName};

/// Phrase-like elements which take the text of a key definition.
const VARIABLE_ELEMENTS: [&str; 5] = ["topic/dt", "topic/cite", "topic/term", "topic/keyword", "topic/ph"];

fn is_linktext(doc: &Document, element: NodeId) -> bool {
    doc.has_class(element, "topic/linktext") || doc.is(element, ElementKind::LINKTEXT)
}

/// Give `element` content taken from the topicmeta of `kd`, unless it
/// already has some.
///
/// A link gets `linktext` and `desc` children, an xref the children of the
/// definition's linktext, an image without `@alt` an `alt` child and a
/// phrase the keyword (or linktext) text. Empty `linktext` and `desc`
/// children of a link do not count as content and are dropped first.
pub fn add_content(kd: &KeyDefinition, doc: &mut Document, element: NodeId) {
    let is_link = doc.is(element, ElementKind::LINK);
    if is_link {
        let linktext = doc.child_elements(element).find(|&c| is_linktext(doc, c));
        let desc = doc.child_by_kind(element, ElementKind::DESC);
        for child in [linktext, desc].into_iter().flatten() {
            if !doc.has_content(child) {
                doc.detach(child);
            }
        }
    }

    if doc.has_content(element) {
        return;
    }
    let Some(meta) = kd.meta() else {
        return;
    };
    let src = kd.document();
    let linktext = src.child_by_kind(meta, ElementKind::LINKTEXT);

    if is_link {
        if let Some(linktext) = linktext {
            let copy = copy_element(doc, src, linktext, "linktext", "topic/linktext");
            doc.append_child(element, copy);
        }
        if let Some(shortdesc) = src.child_by_kind(meta, ElementKind::SHORTDESC) {
            let copy = copy_element(doc, src, shortdesc, "desc", "topic/desc");
            doc.append_child(element, copy);
        }
    } else if doc.is(element, ElementKind::XREF) {
        if let Some(linktext) = linktext {
            copy_children(doc, src, linktext, element);
        }
    } else if doc.is(element, ElementKind::IMAGE) {
        if doc.non_empty_attribute(element, "alt").is_none()
            && let Some(linktext) = linktext
        {
            let copy = copy_element(doc, src, linktext, "alt", "topic/alt");
            doc.append_child(element, copy);
        }
    } else if VARIABLE_ELEMENTS.iter().any(|class| doc.has_class(element, class)) {
        let container = src
            .child_by_kind(meta, ElementKind::KEYWORDS)
            .and_then(|keywords| src.child_by_kind(keywords, ElementKind::KEYWORD))
            .or(linktext);
        if let Some(container) = container {
            copy_children(doc, src, container, element);
        }
    }
}

/// Copy `from` as a new `name` element of class `- class `.
fn copy_element(doc: &mut Document, src: &Document, from: NodeId, name: &str, class: &str) -> NodeId {
    let to = doc.create_element(QName::local(name));
    for attr in src.attributes(from) {
        doc.set_attribute_qname(to, attr.name.clone(), attr.value.clone());
    }
    doc.set_attribute(to, "class", format!("- {} ", class));
    copy_children(doc, src, from, to);
    to
}

fn copy_children(doc: &mut Document, src: &Document, from: NodeId, to: NodeId) {
    for &child in src.children(from) {
        let copy = doc.import(src, child);
        doc.append_child(to, copy);
    }
}
