/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Evaluation of a stack of ditaval profiles against maps and topics.
 */

use super::flags::Flags;
use super::profile::{Action, Filter, Prop, PropValue};
use crate::dita;
use crate::documents::{LoadedDocument, LoadedDocuments};
use crate::source::DocumentSource;
use crate::uri;
use crate::vocab::{GROUPED_FILTER_ATTRIBUTES, ditac_name};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::text::split_list;
use ditac_dom::{Document, ElementKind, NodeId, QName};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use url::Url;

/// User-data token under which the flags of a flagged topic are stored.
pub const DITAC_FLAGS: &str = "ditac:flags";

/// What the active profiles decide for an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    Exclude,
    Flag(Flags),
}

/// The filtering engine of one run.
///
/// Holds the external profile, the profiles loaded from ditavalrefs and
/// the stack of profiles active at the current point of a tree walk.
#[derive(Clone)]
pub struct Filters {
    source: Rc<dyn DocumentSource>,
    sink: DiagnosticSink,
    external: Option<Rc<Filter>>,
    loaded: HashMap<Url, Rc<Filter>>,
    stack: Vec<Rc<Filter>>,
    referenced_attributes: HashSet<String>,
    filter_attributes: Vec<String>,
}

impl Filters {
    pub fn new(source: Rc<dyn DocumentSource>, sink: DiagnosticSink) -> Self {
        Self {
            source,
            sink,
            external: None,
            loaded: HashMap::new(),
            stack: Vec::new(),
            referenced_attributes: HashSet::new(),
            filter_attributes: Vec::new(),
        }
    }

    pub fn set_external_filter(&mut self, filter: Option<Filter>) {
        self.external = filter.map(Rc::new);
    }

    pub fn external_filter(&self) -> Option<&Filter> {
        self.external.as_deref()
    }

    /// Number of profiles currently active.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push(&mut self, filter: Rc<Filter>) {
        self.stack.push(filter);
        self.update_stack_state();
    }

    fn pop(&mut self) {
        self.stack.pop();
        self.update_stack_state();
    }

    fn update_stack_state(&mut self) {
        self.referenced_attributes = self
            .stack
            .iter()
            .flat_map(|filter| filter.props())
            .filter_map(|prop| prop.attribute.clone())
            .collect();
    }

    fn push_external(&mut self) -> bool {
        match self.external.clone() {
            Some(filter) => {
                self.push(filter);
                true
            }
            None => false,
        }
    }

    /// Push the profile of the first ditavalref child of `element`.
    /// Returns true if something was pushed.
    fn push_ditavalref(&mut self, doc: &Document, element: NodeId) -> bool {
        let Some(&ditavalref) = dita::ditavalrefs(doc, element).first() else {
            return false;
        };
        let Some(href) = doc.non_empty_attribute(ditavalref, "href") else {
            return false;
        };
        let url = match doc.uri() {
            Some(base) => uri::resolve(base, href),
            None => uri::parse_absolute(href),
        };
        let Some(url) = url.map(|u| uri::without_fragment(&u)) else {
            return false;
        };

        let filter = match self.loaded.get(&url) {
            Some(filter) => Rc::clone(filter),
            None => match Filter::load(&url, self.source.as_ref()) {
                Ok(filter) => {
                    tracing::debug!(url = %url, "loaded ditaval profile");
                    let filter = Rc::new(filter);
                    self.loaded.insert(url, Rc::clone(&filter));
                    filter
                }
                Err(err) => {
                    self.sink.error(
                        "D-6-1",
                        format!("Cannot load `{}`: {}", url, err),
                        Some(doc.location(ditavalref)),
                    );
                    return false;
                }
            },
        };
        self.push(filter);
        true
    }

    // ---------------------------------------------------------------
    // Decision
    // ---------------------------------------------------------------

    /// Decide what happens to `element` under the active profiles.
    pub fn compute_action(&self, doc: &Document, element: NodeId) -> Option<FilterAction> {
        let mut flags = Flags::default();
        let mut has_flags = false;
        for attribute in doc.attributes(element) {
            let name = attribute.name.clark();
            let is_filter_attribute = self.filter_attributes.contains(&name);
            if !is_filter_attribute && !self.referenced_attributes.contains(&name) {
                continue;
            }
            let value = attribute.value.trim();
            if value.is_empty() {
                continue;
            }
            if self.attribute_excludes(&name, value, is_filter_attribute, &mut flags, &mut has_flags) {
                return Some(FilterAction::Exclude);
            }
        }
        has_flags.then_some(FilterAction::Flag(flags))
    }

    /// True if every value of some group of the attribute is excluded.
    fn attribute_excludes(
        &self,
        name: &str,
        value: &str,
        is_filter_attribute: bool,
        flags: &mut Flags,
        has_flags: &mut bool,
    ) -> bool {
        for (key, values) in parse_attribute_value(value, name) {
            let mut exclude_count = 0;
            for value in &values {
                let mut excluded = false;
                for filter in &self.stack {
                    let Some(rule) = find_prop_value(filter.props(), &key, value, name, is_filter_attribute)
                    else {
                        continue;
                    };
                    match rule.action {
                        Action::Exclude => excluded = true,
                        Action::Flag => {
                            if let Some(rule_flags) = &rule.flags {
                                flags.set(rule_flags);
                                *has_flags = true;
                            }
                        }
                        Action::Include | Action::Passthrough => {}
                    }
                }
                if excluded {
                    exclude_count += 1;
                }
            }
            if exclude_count == values.len() {
                return true;
            }
        }
        false
    }

    // ---------------------------------------------------------------
    // Maps
    // ---------------------------------------------------------------

    /// Filter a map in place.
    ///
    /// The first pass filters the content of topicmetas and titles and
    /// strips the href of excluded topicrefs. The second pass removes
    /// excluded topicrefs once they have no nested topicref left.
    pub fn filter_map(&mut self, doc: &mut Document) {
        let map = doc.root();
        self.filter_attributes = dita::filter_attributes(doc, map);
        let external = self.push_external();
        let pushed = self.push_ditavalref(doc, map);

        self.filter_map1(doc, map);
        self.filter_map2(doc, map);

        if pushed {
            self.pop();
        }
        if external {
            self.pop();
        }
    }

    fn filter_map1(&mut self, doc: &mut Document, element: NodeId) {
        let children: Vec<NodeId> = doc.child_elements(element).collect();
        for child in children {
            if dita::is_ditavalref(doc, child) {
                continue;
            }
            let is_topicref = doc.is(child, ElementKind::TOPICREF);
            let pushed = is_topicref && self.push_ditavalref(doc, child);

            if doc.is(child, ElementKind::TOPICMETA) || doc.is(child, ElementKind::TITLE) {
                self.filter_topic_content(doc, child, false);
            } else {
                if is_topicref
                    && doc.attribute(child, "href").is_some_and(|href| !href.is_empty())
                    && self.compute_action(doc, child) == Some(FilterAction::Exclude)
                {
                    doc.remove_attribute(child, "href");
                }
                self.filter_map1(doc, child);
            }

            if pushed {
                self.pop();
            }
        }
    }

    fn filter_map2(&mut self, doc: &mut Document, element: NodeId) {
        let children: Vec<NodeId> = doc.child_elements(element).collect();
        for child in children {
            if dita::is_ditavalref(doc, child) {
                continue;
            }
            let is_topicref = doc.is(child, ElementKind::TOPICREF);
            let pushed = is_topicref && self.push_ditavalref(doc, child);

            self.filter_map2(doc, child);
            if is_topicref
                && self.compute_action(doc, child) == Some(FilterAction::Exclude)
                && doc.child_by_kind(child, ElementKind::TOPICREF).is_none()
            {
                doc.detach(child);
            }

            if pushed {
                self.pop();
            }
        }
    }

    // ---------------------------------------------------------------
    // Topics
    // ---------------------------------------------------------------

    /// Remove or flag the descendants of `element`, stopping at nested
    /// topics.
    pub fn filter_topic_content(&self, doc: &mut Document, element: NodeId, allow_flagging: bool) {
        let children: Vec<NodeId> = doc.child_elements(element).collect();
        for child in children {
            if doc.is(child, ElementKind::TOPIC) {
                return;
            }
            match self.compute_action(doc, child) {
                None => self.filter_topic_content(doc, child, allow_flagging),
                Some(FilterAction::Exclude) => {
                    // Emptied rather than removed, so that the cell count
                    // of the row does not change.
                    if doc.is(child, ElementKind::RELCELL) {
                        doc.remove_children(child);
                    } else {
                        doc.detach(child);
                    }
                }
                Some(FilterAction::Flag(flags)) => {
                    if allow_flagging {
                        let wrapper = Filters::create_flags_element(doc, &flags);
                        doc.insert_before(element, wrapper, Some(child));
                        doc.append_child(wrapper, child);
                    }
                    self.filter_topic_content(doc, child, allow_flagging);
                }
            }
        }
    }

    /// Filter the topics referenced by `map`, honoring the ditavalrefs
    /// found along the way.
    pub fn filter_topics(&mut self, map: &Document, docs: &mut LoadedDocuments) {
        let external = self.push_external();
        let pushed = self.push_ditavalref(map, map.root());

        self.do_filter_topics(map, map.root(), docs);

        if pushed {
            self.pop();
        }
        if external {
            self.pop();
        }
    }

    fn do_filter_topics(&mut self, map: &Document, element: NodeId, docs: &mut LoadedDocuments) {
        for child in map.child_elements(element).collect::<Vec<_>>() {
            if dita::is_ditavalref(map, child) {
                continue;
            }
            let is_topicref = map.is(child, ElementKind::TOPICREF);
            let pushed = is_topicref && self.push_ditavalref(map, child);

            if is_topicref {
                self.filter_referenced_topics(map, child, docs);
            }
            self.do_filter_topics(map, child, docs);

            if pushed {
                self.pop();
            }
        }
    }

    fn filter_referenced_topics(&mut self, map: &Document, topicref: NodeId, docs: &mut LoadedDocuments) {
        let Some(href) = map.non_empty_attribute(topicref, "href") else {
            return;
        };
        let url = match map.uri() {
            Some(base) => uri::resolve(base, href),
            None => uri::parse_absolute(href),
        };
        let Some(url) = url else {
            return;
        };
        let topic_id = uri::topic_id(&url);

        // Not cached when e.g. scope="external".
        let Some(loaded) = docs.get_mut(&url) else {
            return;
        };
        if !loaded.doc_type.has_topics() {
            return;
        }

        let select = dita::chunk_select(map, topicref, topic_id.is_some());
        match loaded.select_topics(topic_id.as_deref(), select) {
            Some(ids) => {
                for id in ids {
                    self.filter_topic(loaded, &id);
                }
            }
            None => self.sink.error(
                "D-4-5",
                format!(
                    "Topic `{}` not found in `{}`",
                    topic_id.unwrap_or_default(),
                    loaded.url
                ),
                Some(map.location(topicref)),
            ),
        }
    }

    fn filter_topic(&mut self, loaded: &mut LoadedDocument, id: &str) {
        let Some(element) = loaded.find_topic_by_id(id).map(|t| t.element) else {
            return;
        };
        self.filter_attributes = dita::filter_attributes(&loaded.document, element);

        match self.compute_action(&loaded.document, element) {
            Some(FilterAction::Exclude) => {
                if let Some(topic) = loaded.find_topic_by_id_mut(id) {
                    topic.excluded = true;
                }
            }
            Some(FilterAction::Flag(flags)) => {
                loaded
                    .document
                    .set_user_data(element, DITAC_FLAGS, Rc::new(flags.styles()));
            }
            None => {}
        }

        // Excluded topics may still be rendered, e.g. when referenced
        // from elsewhere, so their content is filtered too.
        self.filter_topic_content(&mut loaded.document, element, true);
    }

    /// A `ditac:flags` element carrying `flags` as attributes.
    pub fn create_flags_element(doc: &mut Document, flags: &Flags) -> NodeId {
        let element = doc.create_element(ditac_name("flags"));
        let styles = [
            ("color", &flags.color),
            ("background-color", &flags.background_color),
            ("font-weight", &flags.font_weight),
            ("font-style", &flags.font_style),
            ("text-decoration", &flags.text_decoration),
        ];
        for (name, value) in styles {
            if let Some(value) = value {
                doc.set_attribute(element, name, value.clone());
            }
        }
        for (name, value) in &flags.change_bar {
            doc.set_attribute_qname(element, QName::local(name.as_str()), value.clone());
        }
        if let Some(url) = &flags.start_image {
            doc.set_attribute(element, "startImage", url.to_string());
        }
        if let Some(text) = &flags.start_text {
            doc.set_attribute(element, "startText", text.clone());
        }
        if let Some(url) = &flags.end_image {
            doc.set_attribute(element, "endImage", url.to_string());
        }
        if let Some(text) = &flags.end_text {
            doc.set_attribute(element, "endText", text.clone());
        }
        element
    }
}

impl std::fmt::Debug for Filters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filters")
            .field("external", &self.external)
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .field("depth", &self.stack.len())
            .finish()
    }
}

/// Split an attribute value into `(group, values)` entries.
///
/// Grouped attributes accept `group(v1 v2) v3`, where `v3` belongs to the
/// attribute itself. Values are deduplicated per group.
fn parse_attribute_value(value: &str, name: &str) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    if value.contains('(') && GROUPED_FILTER_ATTRIBUTES.contains(&name) {
        let spaced = value.replace('(', " ( ").replace(')', " ) ");
        let tokens: Vec<&str> = split_list(&spaced).collect();
        let mut group = name;
        for (i, &token) in tokens.iter().enumerate() {
            match token {
                "(" => {}
                ")" => group = name,
                _ if tokens.get(i + 1) == Some(&"(") => group = token,
                _ => match groups.iter_mut().find(|(key, _)| key == group) {
                    Some((_, values)) => {
                        if !values.iter().any(|v| v == token) {
                            values.push(token.to_string());
                        }
                    }
                    None => groups.push((group.to_string(), vec![token.to_string()])),
                },
            }
        }
        return groups;
    }

    let tokens: Vec<String> = split_list(value).map(str::to_string).collect();
    if !tokens.is_empty() {
        groups.push((name.to_string(), tokens));
    }
    groups
}

/// The rule of one profile applying to `value` of group `key` found in
/// attribute `attr_name`.
fn find_prop_value<'f>(
    props: &'f [Prop],
    key: &str,
    value: &str,
    attr_name: &str,
    is_filter_attribute: bool,
) -> Option<&'f PropValue> {
    let for_attribute = |name: &str, searched: &str| {
        props
            .iter()
            .filter(|p| p.attribute.as_deref() == Some(name))
            .find_map(|p| p.find_value(searched))
    };

    let specific = if key != attr_name {
        // database="myDB", then product="myDB", then product="database".
        for_attribute(key, value)
            .or_else(|| for_attribute(attr_name, value))
            .or_else(|| for_attribute(attr_name, key))
    } else {
        for_attribute(attr_name, value)
    };

    specific
        .or_else(|| {
            props
                .iter()
                .filter(|p| p.attribute.as_deref() == Some(attr_name))
                .find_map(Prop::wildcard_value)
        })
        .or_else(|| {
            if !is_filter_attribute {
                return None;
            }
            props
                .iter()
                .filter(|p| p.attribute.is_none())
                .find_map(|p| p.find_value(value))
                .or_else(|| {
                    props
                        .iter()
                        .filter(|p| p.attribute.is_none())
                        .find_map(Prop::wildcard_value)
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use ditac_dom::parse;

    fn filters_with(profile: &str) -> Filters {
        let url = Url::parse("file:///p/external.ditaval").unwrap();
        let filter = Filter::parse(&parse(profile, Some(&url)).unwrap()).unwrap();
        let mut filters = Filters::new(Rc::new(MemorySource::new()), DiagnosticSink::new());
        filters.set_external_filter(Some(filter));
        filters
    }

    #[test]
    fn test_parse_grouped_values() {
        let groups = parse_attribute_value("database(mysql  db2 mysql) linux", "product");
        assert_eq!(
            groups,
            vec![
                ("database".to_string(), vec!["mysql".to_string(), "db2".to_string()]),
                ("product".to_string(), vec!["linux".to_string()]),
            ]
        );
        // Only some attributes support groups.
        let plain = parse_attribute_value("a(b)", "props");
        assert_eq!(plain, vec![("props".to_string(), vec!["a(b)".to_string()])]);
    }

    #[test]
    fn test_find_prop_value_precedence() {
        let doc = parse(
            r#"<val>
  <prop att="product" val="database" action="include"/>
  <prop att="product" action="exclude"/>
  <prop val="mysql" action="flag" color="red"/>
  <prop action="exclude"/>
</val>"#,
            None,
        )
        .unwrap();
        let filter = Filter::parse(&doc).unwrap();
        let props = filter.props();
        // Group name as value of the attribute.
        let rule = find_prop_value(props, "database", "mysql", "product", true).unwrap();
        assert_eq!(rule.action, Action::Include);
        // Attribute wildcard.
        let rule = find_prop_value(props, "product", "x", "product", true).unwrap();
        assert_eq!(rule.action, Action::Exclude);
        // Any-attribute rules only apply to filter attributes.
        let rule = find_prop_value(props, "audience", "mysql", "audience", true).unwrap();
        assert_eq!(rule.action, Action::Flag);
        assert!(find_prop_value(props, "rev", "mysql", "rev", false).is_none());
    }

    #[test]
    fn test_all_values_must_be_excluded() {
        let mut filters =
            filters_with(r#"<val><prop att="audience" val="internal" action="exclude"/></val>"#);
        let mut doc = parse(
            r#"<map><topicref href="a.dita" audience="internal external"/><topicref href="b.dita" audience="internal"/></map>"#,
            None,
        )
        .unwrap();
        filters.filter_map(&mut doc);
        let kept: Vec<_> = doc
            .child_elements(doc.root())
            .map(|t| doc.attribute(t, "href").unwrap().to_string())
            .collect();
        assert_eq!(kept, vec!["a.dita"]);
        assert_eq!(filters.depth(), 0);
    }

    #[test]
    fn test_excluded_branch_keeps_included_children() {
        let mut filters = filters_with(r#"<val><prop att="product" val="old" action="exclude"/></val>"#);
        let mut doc = parse(
            r#"<map><topicref href="a.dita" product="old"><topicref href="b.dita"/></topicref></map>"#,
            None,
        )
        .unwrap();
        filters.filter_map(&mut doc);
        let parent = doc.first_child_element(doc.root()).unwrap();
        assert_eq!(doc.attribute(parent, "href"), None);
        assert!(doc.first_child_element(parent).is_some());
    }

    #[test]
    fn test_flagging_wraps_content() {
        let mut doc = parse(
            r#"<topic id="t"><body><p platform="mac">Mac</p><p platform="win">Win</p><table><row><entry/></row></table></body></topic>"#,
            None,
        )
        .unwrap();
        let body = doc.first_child_element(doc.root()).unwrap();
        let root = doc.root();
        let mut filters = filters_with(
            r#"<val><prop att="platform" val="mac" action="flag" style="bold"/><prop att="platform" val="win" action="exclude"/></val>"#,
        );
        filters.push_external();
        filters.filter_attributes = dita::filter_attributes(&doc, root);
        filters.filter_topic_content(&mut doc, root, true);
        insta::assert_snapshot!(doc.subtree_to_string(body).unwrap(), @r#"<body><ditac:flags xmlns:ditac="http://www.xmlmind.com/ditac/schema/ditac" font-weight="bold"><p platform="mac">Mac</p></ditac:flags><table><row><entry/></row></table></body>"#);
    }

    #[test]
    fn test_relcell_is_emptied() {
        let mut filters = filters_with(r#"<val><prop att="audience" val="x" action="exclude"/></val>"#);
        let mut doc = parse(
            r#"<map><reltable><relrow><relcell audience="x"><topicref href="a.dita"/></relcell><relcell/></relrow></reltable></map>"#,
            None,
        )
        .unwrap();
        filters.filter_map(&mut doc);
        // Reltables are map content, not topicrefs: nothing is removed by
        // filter_map itself.
        let row = doc
            .descendants(doc.root())
            .into_iter()
            .find(|&n| doc.is(n, ElementKind::RELROW))
            .unwrap();
        assert_eq!(doc.child_elements(row).count(), 2);

        filters.push_external();
        let root = doc.root();
        filters.filter_topic_content(&mut doc, root, false);
        let cells: Vec<_> = doc.child_elements(row).collect();
        assert_eq!(cells.len(), 2);
        assert!(doc.first_child_element(cells[0]).is_none());
    }

    #[test]
    fn test_ditavalref_pushes_branch_profile() {
        let source = MemorySource::new().with(
            "file:///d/branch.ditaval",
            r#"<val><prop att="audience" val="novice" action="exclude"/></val>"#,
        );
        let mut filters = Filters::new(Rc::new(source), DiagnosticSink::new());
        let url = Url::parse("file:///d/m.ditamap").unwrap();
        let mut doc = parse(
            r#"<map><topicref href="a.dita"><ditavalref href="branch.ditaval"/><topicref href="b.dita" audience="novice"/></topicref><topicref href="c.dita" audience="novice"/></map>"#,
            Some(&url),
        )
        .unwrap();
        filters.filter_map(&mut doc);
        let hrefs: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .filter_map(|n| doc.attribute(n, "href").map(str::to_string))
            .collect();
        assert_eq!(hrefs, vec!["a.dita", "branch.ditaval", "c.dita"]);
    }

    #[test]
    fn test_unloadable_ditavalref_is_reported() {
        let sink = DiagnosticSink::new();
        let mut filters = Filters::new(Rc::new(MemorySource::new()), sink.clone());
        let url = Url::parse("file:///d/m.ditamap").unwrap();
        let mut doc = parse(r#"<map><ditavalref href="missing.ditaval"/></map>"#, Some(&url)).unwrap();
        filters.filter_map(&mut doc);
        assert_eq!(sink.count_code("D-6-1"), 1);
        assert_eq!(filters.depth(), 0);
    }

    #[test]
    fn test_flags_element() {
        let mut doc = parse("<p/>", None).unwrap();
        let flags = Flags {
            color: Some("red".into()),
            change_bar: vec![("change-bar-style".into(), "solid".into())],
            start_text: Some("BEGIN".into()),
            ..Flags::default()
        };
        let element = Filters::create_flags_element(&mut doc, &flags);
        assert_eq!(doc.namespace(element), Some(crate::vocab::DITAC_NS));
        assert_eq!(doc.attribute(element, "color"), Some("red"));
        assert_eq!(doc.attribute(element, "change-bar-style"), Some("solid"));
        assert_eq!(doc.attribute(element, "startText"), Some("BEGIN"));
        assert_eq!(doc.attribute(element, "endText"), None);
    }
}
