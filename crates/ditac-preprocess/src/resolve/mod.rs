/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Reference resolution: absolute hrefs, conkeyref and keyref
 * substitution, and content injected from key definitions.
 */

mod content;
mod metadata;
mod object;

pub use content::add_content;
pub use metadata::add_metadata;

use crate::dita;
use crate::documents::{LoadedDocument, LoadedDocuments};
use crate::keys::{KeyDefinition, KeySpaces};
use crate::uri;
use crate::vocab::{ABSOLUTE_HREF, LINKING_ATTRIBUTES, ditac_name, linking_name};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::text::is_nmtoken;
use ditac_dom::{Document, ElementKind, NodeId};
use url::Url;

/// Elements which always get an id, so that lists of tables, figures and
/// the like can point to them.
const ANCHOR_KINDS: ElementKind = ElementKind::TOPIC
    .union(ElementKind::SECTION)
    .union(ElementKind::TABLE)
    .union(ElementKind::FIG)
    .union(ElementKind::EXAMPLE)
    .union(ElementKind::INDEXTERM);

/// Rewrites the references of a loaded document.
///
/// Without key spaces only `href`, `conref` and `conrefend` are made
/// absolute. With key spaces `conkeyref` becomes `conref` and `keyref`
/// becomes `href` plus whatever the key definition carries.
pub struct Resolver<'k> {
    key_spaces: Option<&'k KeySpaces>,
    sink: DiagnosticSink,
}

/// The document being resolved and what is needed to look at others.
pub(crate) struct Context<'a> {
    doc: &'a mut Document,
    base: Url,
    /// First topic of the document being resolved, which is out of the
    /// cache while it is processed.
    first_topic: Option<String>,
    docs: &'a mut LoadedDocuments,
}

impl<'k> Resolver<'k> {
    pub fn new(key_spaces: Option<&'k KeySpaces>, sink: DiagnosticSink) -> Self {
        Self { key_spaces, sink }
    }

    pub fn key_spaces(&self) -> Option<&'k KeySpaces> {
        self.key_spaces
    }

    /// Resolve every reference of `loaded`. Other documents needed to
    /// rewrite `.` fragments are preloaded into `docs`.
    pub fn process(&self, loaded: &mut LoadedDocument, docs: &mut LoadedDocuments) {
        let first_topic = loaded.first_topic().map(|topic| topic.id.clone());
        let mut cx = Context {
            doc: &mut loaded.document,
            base: loaded.url.clone(),
            first_topic,
            docs,
        };
        let root = cx.doc.root();
        if cx.doc.is_vocabulary_element(root) {
            self.process_element(&mut cx, root);
        }
        tracing::debug!(url = %loaded.url, keys = self.key_spaces.is_some(), "resolved references");
    }

    fn process_children(&self, cx: &mut Context<'_>, parent: NodeId) {
        let children = cx.doc.children(parent).to_vec();
        for child in children {
            // SVG and MathML islands are left alone.
            if cx.doc.is_vocabulary_element(child) {
                self.process_element(cx, child);
            } else if matches!(cx.doc.processing_instruction(child), Some(("onclick", _)))
                && cx.doc.is_element(parent)
            {
                dita::ensure_valid_id(cx.doc, parent);
            }
        }
    }

    fn process_element(&self, cx: &mut Context<'_>, element: NodeId) {
        if cx.doc.kind(element).intersects(ANCHOR_KINDS) {
            dita::ensure_valid_id(cx.doc, element);
        }

        for attr in ["conref", "conrefend", "href"] {
            if let Some(value) = cx.doc.non_empty_attribute(element, attr).map(str::to_string) {
                self.resolve_href(cx, element, attr, &value);
            }
        }

        if self.key_spaces.is_some() {
            if let Some(value) = cx.doc.non_empty_attribute(element, "conkeyref").map(str::to_string) {
                self.resolve_conkeyref(cx.doc, element, &value);
            }
            if let Some(value) = cx.doc.non_empty_attribute(element, "keyref").map(str::to_string)
                && self.process_keyref(cx.doc, element, &value)
            {
                return;
            }
        }

        if cx.doc.is(element, ElementKind::OBJECT) {
            self.resolve_object(cx, element);
        }

        self.process_children(cx, element);
    }

    // ---------------------------------------------------------------
    // href, conref, conrefend
    // ---------------------------------------------------------------

    fn resolve_href(&self, cx: &mut Context<'_>, element: NodeId, attr: &str, value: &str) {
        let href = if value.starts_with('#') {
            format!("{}{}", cx.base, resolve_fragment(cx.doc, element, value))
        } else {
            let absolute = uri::parse_absolute(value);
            let mut href = value.to_string();
            if let Some(url) = &absolute {
                href = url.to_string();
                if attr == "href" {
                    cx.doc.set_attribute_qname(element, ditac_name(ABSOLUTE_HREF), "true");
                }
            }

            let external = attr == "href"
                && dita::inherit_attribute(cx.doc, element, "scope").is_some_and(|scope| scope != "local");
            let image = cx.doc.is(element, ElementKind::IMAGE);

            // Peer and external references are kept as written, images
            // excepted.
            if absolute.is_none()
                && !(external && !image)
                && let Ok(url) = cx.base.join(value)
            {
                href = url.to_string();
            }

            if !external && !image {
                href = self.resolve_href_fragment(cx, href);
            }
            href
        };
        cx.doc.set_attribute(element, attr, href);
    }

    /// Replace a trailing `#.` or `#./rest` of an absolute href by the id of
    /// the first topic of the target document.
    fn resolve_href_fragment(&self, cx: &mut Context<'_>, href: String) -> String {
        let Some(pos) = href.rfind('#').filter(|&pos| pos > 0) else {
            return href;
        };
        let reference = &href[pos + 1..];
        if reference != "." && !reference.starts_with("./") {
            return href;
        }
        let location = &href[..pos];
        let Ok(url) = Url::parse(location) else {
            return href;
        };
        let topic_id = if url == cx.base {
            cx.first_topic.clone()
        } else {
            match cx.docs.preload(&url) {
                Ok(loaded) => loaded.first_topic().map(|topic| topic.id.clone()),
                Err(err) => {
                    tracing::debug!(url = %url, error = %err, "cannot resolve `.` fragment");
                    None
                }
            }
        };
        match topic_id {
            Some(id) => format!("{}#{}{}", location, uri::quote_fragment(&id), &reference[1..]),
            None => href,
        }
    }

    // ---------------------------------------------------------------
    // conkeyref, keyref
    // ---------------------------------------------------------------

    fn resolve_conkeyref(&self, doc: &mut Document, element: NodeId, value: &str) {
        doc.remove_attribute(element, "conkeyref");
        let Some(key_spaces) = self.key_spaces else {
            return;
        };
        let Some((key, id)) = self.split_keyref(doc, element, "conkeyref", value) else {
            return;
        };
        match key_spaces.get_href(key, doc, element) {
            Some(href) => {
                let href = add_id_to_href(href, id);
                doc.set_attribute(element, "conref", href);
            }
            None => self.keyref_warning(doc, element, "conkeyref", value, "conref"),
        }
    }

    /// Substitute the `keyref` of `element`. Returns true when the element
    /// was removed because it ended up with neither target nor content.
    fn process_keyref(&self, doc: &mut Document, element: NodeId, value: &str) -> bool {
        doc.remove_attribute(element, "keyref");
        let Some(key_spaces) = self.key_spaces else {
            return false;
        };
        let Some((key, id)) = self.split_keyref(doc, element, "keyref", value) else {
            return false;
        };
        let Some(kd) = key_spaces.get(key, doc, element) else {
            self.keyref_warning(doc, element, "keyref", value, "href");
            return false;
        };

        let href = apply_key_definition(kd, id, doc, element);
        if href.is_none() && !doc.has_content(element) {
            tracing::debug!(key, "removing empty key reference");
            doc.detach(element);
            return true;
        }
        false
    }

    /// Split `key/id`. Invalid values are reported and yield `None`.
    fn split_keyref<'v>(
        &self,
        doc: &Document,
        element: NodeId,
        attr: &str,
        value: &'v str,
    ) -> Option<(&'v str, Option<&'v str>)> {
        let (key, id) = match value.split_once('/') {
            Some((key, id)) => (key, Some(id)),
            None => (value, None),
        };
        if !dita::is_valid_key(key) || id.is_some_and(|id| !is_nmtoken(id)) {
            self.sink.error(
                "D-3-4",
                format!("Invalid value `{}` for attribute `{}`", value, attr),
                Some(doc.location(element)),
            );
            return None;
        }
        Some((key, id))
    }

    fn keyref_warning(&self, doc: &Document, element: NodeId, attr: &str, value: &str, fallback: &str) {
        let message = if doc.non_empty_attribute(element, fallback).is_some() {
            format!("Cannot resolve keyref {}=\"{}\", using @{}", attr, value, fallback)
        } else {
            format!("Cannot resolve keyref {}=\"{}\", no @{} fallback", attr, value, fallback)
        };
        self.sink.warning("D-3-3", message, Some(doc.location(element)));
    }
}

/// Rewrite `#.` and `#./rest` relative to the topic containing `element`.
fn resolve_fragment(doc: &mut Document, element: NodeId, fragment: &str) -> String {
    if (fragment == "#." || fragment.starts_with("#./"))
        && let Some(topic) = doc.ancestor_by_kind(element, ElementKind::TOPIC)
    {
        let id = dita::ensure_valid_id(doc, topic);
        return format!("#{}{}", uri::quote_fragment(&id), &fragment[2..]);
    }
    fragment.to_string()
}

fn add_id_to_href(href: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => uri::add_id(href, id),
        None => href.to_string(),
    }
}

/// Give `element` the linking attributes and content of `kd`.
///
/// Returns the href set on `element`, if any. A definition with
/// `linking="none"` provides content only, except for abbreviated forms
/// which need the target glossentry.
pub fn apply_key_definition(kd: &KeyDefinition, id: Option<&str>, doc: &mut Document, element: NodeId) -> Option<String> {
    let href = kd
        .href()
        .filter(|_| kd.attribute(None, "linking") != Some("none") || doc.is(element, ElementKind::ABBREVIATED_FORM))
        .map(|href| add_id_to_href(href, id));

    for (index, (ns, local)) in LINKING_ATTRIBUTES.iter().enumerate() {
        let value = match &href {
            None => None,
            Some(href) if index == 0 => Some(href.clone()),
            Some(_) => kd.attribute(*ns, local).map(str::to_string),
        };
        match value {
            Some(value) => doc.set_attribute_qname(element, linking_name(*ns, local), value),
            None => {
                doc.remove_attribute_ns(element, *ns, local);
            }
        }
    }

    if doc.is(element, ElementKind::TOPICREF) {
        add_metadata(kd, doc, element);
    } else {
        add_content(kd, doc, element);
    }
    href
}
