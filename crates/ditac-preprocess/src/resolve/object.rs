/*
 * object.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * URL attributes of object elements and of their params.
 */

use super::{Context, Resolver};
use crate::uri;
use crate::vocab::ditac_name;
use ditac_dom::text::split_list;
use ditac_dom::{Document, ElementKind, NodeId};
use url::Url;

const FLASH_TYPE: &str = "application/x-shockwave-flash";

/// `ditac:absoluteClassid` and friends.
fn absolute_marker(attr: &str) -> String {
    let mut chars = attr.chars();
    match chars.next() {
        Some(first) => format!("absolute{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "absolute".to_string(),
    }
}

/// `path` resolved against `codebase` when there is one.
fn join_codebase(codebase: Option<&Url>, path: &str) -> String {
    codebase
        .and_then(|base| base.join(path).ok())
        .map_or_else(|| path.to_string(), String::from)
}

/// Resolve one location. Returns the new value and whether it was absolute.
fn resolve_location(value: &str, codebase: Option<&Url>, base: &Url) -> (String, bool) {
    let value = join_codebase(codebase, value);
    if value.starts_with('#') {
        return (format!("{}{}", base, value), false);
    }
    if let Some(url) = uri::parse_absolute(&value) {
        return (url.to_string(), true);
    }
    match base.join(&value) {
        Ok(url) => (url.to_string(), false),
        Err(_) => (value, false),
    }
}

fn resolve_object_url(doc: &mut Document, element: NodeId, attr: &str, value: &str, codebase: Option<&Url>, base: &Url) {
    let (href, absolute) = resolve_location(value, codebase, base);
    if absolute {
        doc.set_attribute_qname(element, ditac_name(&absolute_marker(attr)), "true");
    }
    doc.set_attribute(element, attr, href);
}

/// A space separated list of locations, with a matching list of
/// `true`/`false` absolute markers.
fn resolve_object_urls(doc: &mut Document, element: NodeId, attr: &str, value: &str, codebase: Option<&Url>, base: &Url) {
    let (hrefs, flags): (Vec<String>, Vec<&str>) = split_list(value)
        .map(|href| {
            let (href, absolute) = resolve_location(href, codebase, base);
            (href, if absolute { "true" } else { "false" })
        })
        .unzip();
    doc.set_attribute(element, attr, hrefs.join(" "));
    doc.set_attribute_qname(element, ditac_name(&absolute_marker(attr)), flags.join(" "));
}

impl Resolver<'_> {
    /// Resolve `codebase`, `classid`, `data`, `archive`, their key
    /// reference variants and the locations of the `param` children.
    pub(super) fn resolve_object(&self, cx: &mut Context<'_>, object: NodeId) {
        let base = cx.base.clone();

        let mut codebase = None;
        if let Some(location) = cx.doc.non_empty_attribute(object, "codebase").map(str::to_string) {
            cx.doc.remove_attribute(object, "codebase");
            codebase = uri::resolve(&base, &location);
        }
        if self.key_spaces.is_some()
            && let Some(keyref) = cx.doc.non_empty_attribute(object, "codebasekeyref").map(str::to_string)
        {
            cx.doc.remove_attribute(object, "codebasekeyref");
            if let Some((url, _)) = self.object_keyref(cx.doc, object, "codebasekeyref", &keyref, "codebase", true)
            {
                codebase = Url::parse(&url).ok();
            }
        }
        let codebase = codebase.as_ref();

        if let Some(classid) = cx.doc.non_empty_attribute(object, "classid").map(str::to_string) {
            if classid.starts_with("clsid:") {
                cx.doc.set_attribute_qname(object, ditac_name("absoluteClassid"), "true");
            } else {
                resolve_object_url(cx.doc, object, "classid", &classid, codebase, &base);
            }
        }
        if self.key_spaces.is_some() {
            self.replace_keyref(cx.doc, object, "classidkeyref", "classid");
        }

        if let Some(data) = cx.doc.non_empty_attribute(object, "data").map(str::to_string) {
            resolve_object_url(cx.doc, object, "data", &data, codebase, &base);
        }
        if self.key_spaces.is_some() {
            self.copy_key_type(cx.doc, object, "datakeyref");
            self.replace_keyref(cx.doc, object, "datakeyref", "data");
        }

        if let Some(archive) = cx.doc.non_empty_attribute(object, "archive").map(str::to_string) {
            resolve_object_urls(cx.doc, object, "archive", &archive, codebase, &base);
        }
        if self.key_spaces.is_some() {
            self.replace_keyrefs(cx.doc, object, "archivekeyrefs", "archive");
        }

        for param in cx.doc.children_by_kind(object, ElementKind::PARAM) {
            self.resolve_param(cx.doc, object, param, &base);
        }
    }

    fn resolve_param(&self, doc: &mut Document, object: NodeId, param: NodeId, base: &Url) {
        let mut valuetype = doc.non_empty_attribute(param, "valuetype").map(str::to_string);
        if doc.non_empty_attribute(param, "keyref").is_some() {
            match valuetype.as_deref() {
                None => valuetype = Some("ref".to_string()),
                Some("ref") => {}
                Some(_) => {
                    self.sink.warning(
                        "D-4-8",
                        "Ignoring attribute `keyref` of a param which is not a reference",
                        Some(doc.location(param)),
                    );
                    doc.remove_attribute(param, "keyref");
                }
            }
        }

        let name = doc.non_empty_attribute(param, "name").map(str::to_string);
        let implicit_ref = valuetype.is_none() && matches!(name.as_deref(), Some("source" | "poster"));
        if valuetype.as_deref() == Some("ref") || implicit_ref {
            doc.set_attribute(param, "valuetype", "ref");
            if let Some(value) = doc.non_empty_attribute(param, "value").map(str::to_string) {
                resolve_object_url(doc, param, "value", &value, None, base);
            }
            if self.key_spaces.is_some() {
                self.copy_key_type(doc, param, "keyref");
                self.replace_keyref(doc, param, "keyref", "value");
            }
        } else if valuetype.is_none() && name.as_deref() == Some("movie") {
            let value = doc.non_empty_attribute(param, "value").map(str::to_string);
            let is_flash = doc
                .non_empty_attribute(object, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case(FLASH_TYPE))
                || value
                    .as_deref()
                    .is_some_and(|v| v.to_ascii_lowercase().ends_with(".swf"));
            if is_flash {
                doc.set_attribute(param, "valuetype", "ref");
                doc.set_attribute(param, "type", FLASH_TYPE);
                if let Some(value) = value {
                    resolve_object_url(doc, param, "value", &value, None, base);
                }
                if self.key_spaces.is_some() {
                    self.replace_keyref(doc, param, "keyref", "value");
                }
            }
        }
    }

    /// Copy `@type` from the key definition when the element has none.
    fn copy_key_type(&self, doc: &mut Document, element: NodeId, attr: &str) {
        if doc.non_empty_attribute(element, "type").is_some() {
            return;
        }
        let (Some(key_spaces), Some(keyref)) = (self.key_spaces, doc.non_empty_attribute(element, attr)) else {
            return;
        };
        let found = key_spaces
            .get(keyref, doc, element)
            .and_then(|kd| kd.attribute(None, "type"))
            .map(str::to_string);
        if let Some(ty) = found {
            doc.set_attribute(element, "type", ty);
        }
    }

    /// Replace the key reference `attr` by the location `fallback`.
    fn replace_keyref(&self, doc: &mut Document, element: NodeId, attr: &str, fallback: &str) {
        let Some(keyref) = doc.non_empty_attribute(element, attr).map(str::to_string) else {
            return;
        };
        doc.remove_attribute(element, attr);
        let Some((url, absolute)) = self.object_keyref(doc, element, attr, &keyref, fallback, true) else {
            return;
        };
        doc.set_attribute(element, fallback, url);
        let marker = absolute_marker(fallback);
        if absolute {
            doc.set_attribute_qname(element, ditac_name(&marker), "true");
        } else {
            doc.remove_attribute_ns(element, Some(crate::vocab::DITAC_NS), &marker);
        }
    }

    /// Replace a list of key references by a list of locations. Keys that
    /// do not resolve are dropped; a warning is issued only when none does.
    fn replace_keyrefs(&self, doc: &mut Document, element: NodeId, attr: &str, fallback: &str) {
        let Some(value) = doc.non_empty_attribute(element, attr).map(str::to_string) else {
            return;
        };
        doc.remove_attribute(element, attr);
        let resolved: Vec<(String, bool)> = split_list(&value)
            .filter_map(|keyref| self.object_keyref(doc, element, attr, keyref, fallback, false))
            .collect();
        if resolved.is_empty() {
            self.keyref_warning(doc, element, attr, &value, fallback);
            return;
        }
        let hrefs: Vec<&str> = resolved.iter().map(|(href, _)| href.as_str()).collect();
        let flags: Vec<&str> = resolved
            .iter()
            .map(|(_, absolute)| if *absolute { "true" } else { "false" })
            .collect();
        doc.set_attribute(element, fallback, hrefs.join(" "));
        doc.set_attribute_qname(element, ditac_name(&absolute_marker(fallback)), flags.join(" "));
    }

    /// The absolute href of `keyref` and whether the author wrote it as an
    /// absolute URL.
    fn object_keyref(
        &self,
        doc: &Document,
        element: NodeId,
        attr: &str,
        keyref: &str,
        fallback: &str,
        warn: bool,
    ) -> Option<(String, bool)> {
        let resolved = self
            .key_spaces
            .and_then(|key_spaces| key_spaces.get(keyref, doc, element))
            .and_then(|kd| {
                let url = uri::parse_absolute(kd.href()?)?;
                Some((url.to_string(), kd.is_absolute_href()))
            });
        if resolved.is_none() && warn {
            self.keyref_warning(doc, element, attr, keyref, fallback);
        }
        resolved
    }
}
